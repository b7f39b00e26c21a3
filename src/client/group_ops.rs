use crate::response::codes;
use crate::{NntpClient, commands, error::IndexError, error::Result};
use tracing::debug;

impl NntpClient {
    /// Select a newsgroup
    ///
    /// Returns [`GroupInfo`](crate::commands::GroupInfo) with article count and range.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`IndexError::NoSuchGroup`] - The newsgroup does not exist (411)
    /// - [`IndexError::Protocol`] - Server returned an unexpected error
    /// - [`IndexError::InvalidResponse`] - Could not parse the server response
    pub async fn select_group(&mut self, newsgroup: &str) -> Result<commands::GroupInfo> {
        debug!("Selecting newsgroup: {}", newsgroup);

        let cmd = commands::group(newsgroup);
        self.send_command(&cmd).await?;
        let response = self.read_response().await?;

        if response.code == codes::NO_SUCH_GROUP {
            return Err(IndexError::NoSuchGroup(newsgroup.to_string()));
        }

        let info = commands::parse_group_response(response)?;
        self.current_group = Some(newsgroup.to_string());

        debug!(
            "Group {} selected: {} articles ({}-{})",
            newsgroup, info.count, info.first, info.last
        );
        Ok(info)
    }
}
