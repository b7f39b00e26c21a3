//! Newsgroup listing commands

use super::NntpClient;
use crate::commands;
use crate::error::{IndexError, Result};
use crate::response::codes;
use tracing::debug;

impl NntpClient {
    /// List active newsgroups (RFC 3977 Section 7.6.3)
    ///
    /// Returns active newsgroups matching the wildmat pattern, `*` for all.
    /// Format per line: group high low status.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`IndexError::Protocol`] - Server returned an unexpected error
    /// - [`IndexError::Timeout`] - Server did not respond in time
    pub async fn list_active(&mut self, wildmat: &str) -> Result<Vec<commands::ActiveGroup>> {
        debug!("Listing active groups matching: {}", wildmat);

        let cmd = commands::list_active(wildmat);
        self.send_command(&cmd).await?;
        let response = self.read_multiline_text().await?;

        if response.code != codes::LIST_INFORMATION_FOLLOWS {
            return Err(IndexError::Protocol {
                code: response.code,
                message: response.message,
            });
        }

        let groups = commands::parse_list_active_response(response)?;
        debug!("Retrieved {} active groups", groups.len());
        Ok(groups)
    }
}
