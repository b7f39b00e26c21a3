//! NNTP authentication (AUTHINFO USER/PASS)

use super::NntpClient;
use super::state::ConnectionState;
use crate::commands;
use crate::error::{IndexError, Result};
use crate::response::codes;
use tracing::debug;

impl NntpClient {
    /// Authenticate with AUTHINFO USER/PASS.
    ///
    /// Credentials come from the server config, falling back to `~/.netrc`
    /// when none are configured.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`IndexError::AuthFailed`] - No credentials available, or rejected
    /// - [`IndexError::ConnectionClosed`] - Server closed the connection
    /// - [`IndexError::Timeout`] - Server did not respond in time
    pub async fn authenticate(&mut self) -> Result<()> {
        let (username, password) = self.config.credentials().ok_or_else(|| {
            IndexError::AuthFailed(format!("no credentials for {}", self.config.host))
        })?;

        debug!("Authenticating as {}", username);

        let cmd = commands::authinfo_user(&username);
        self.send_command(&cmd).await?;

        self.state = ConnectionState::AuthInProgress;

        let response = self.read_response().await?;

        // Expect 381 (continue) or 281 (accepted without password)
        if response.code == codes::AUTH_CONTINUE {
            let cmd = commands::authinfo_pass(&password);
            self.send_command(&cmd).await?;
            let response = self.read_response().await?;

            if response.code != codes::AUTH_ACCEPTED {
                self.state = ConnectionState::Greeted;
                return Err(IndexError::AuthFailed(response.message));
            }
        } else if response.code != codes::AUTH_ACCEPTED {
            self.state = ConnectionState::Greeted;
            return Err(IndexError::AuthFailed(response.message));
        }

        self.state = ConnectionState::Ready;
        debug!("Authentication successful");
        Ok(())
    }
}
