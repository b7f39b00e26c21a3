//! NNTP session implementation with TLS support

mod auth;
mod connection;
mod group_ops;
mod io;
mod listing;
mod metadata;
mod state;
mod stream;

use crate::config::ServerConfig;
use state::ConnectionState;
use std::sync::Arc;
use stream::NntpStream;
use tokio::io::BufReader;
use tracing::debug;

/// Async NNTP session
///
/// One session is owned by one worker at a time: it carries the protocol
/// state (greeting, reader mode, authentication, selected group) and is
/// poisoned on any socket error, timeout, or 5xx so the pool discards it
/// instead of handing it out again.
///
/// # Example
///
/// ```no_run
/// use usedex::{NntpClient, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
/// let mut client = NntpClient::connect(Arc::new(config)).await?;
/// client.handshake().await?;
///
/// let info = client.select_group("alt.binaries.tv").await?;
/// println!("Group has {} articles ({}-{})", info.count, info.first, info.last);
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct NntpClient {
    /// Buffered stream (plain TCP or TLS)
    stream: BufReader<NntpStream>,
    /// Session state
    state: ConnectionState,
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Currently selected newsgroup
    current_group: Option<String>,
    /// Whether this session must be discarded rather than reused
    poisoned: bool,
}

impl NntpClient {
    /// Check if this session is poisoned and should be discarded
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Mark this session as poisoned
    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    /// Get the currently selected newsgroup, if any
    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_deref()
    }
}

impl Drop for NntpClient {
    fn drop(&mut self) {
        debug!(host = %self.config.host, "NNTP session dropped");
    }
}
