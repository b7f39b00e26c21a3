//! Connection pooling for NNTP sessions using bb8

use crate::client::NntpClient;
use crate::config::ServerConfig;
use crate::error::{IndexError, Result};
use bb8::{Pool, PooledConnection};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
///
/// One policy object covers both pool acquisition and task re-enqueueing:
/// exponential backoff with optional ±50% jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier (exponential factor)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1500,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a retry config with no retries (fail fast)
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Backoff duration before retry number `attempt` (0-based), jittered.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32))
            as u64;
        let base = base.min(self.max_backoff_ms);
        let ms = if self.jitter {
            // ±50% jitter around the base delay
            let spread = base / 2;
            rand::thread_rng().gen_range(base.saturating_sub(spread)..=base + spread)
        } else {
            base
        };
        Duration::from_millis(ms)
    }
}

/// Connection manager for bb8 pool
pub struct NntpConnectionManager {
    config: Arc<ServerConfig>,
}

impl NntpConnectionManager {
    /// Create a new connection manager
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl bb8::ManageConnection for NntpConnectionManager {
    type Connection = NntpClient;
    type Error = IndexError;

    async fn connect(&self) -> Result<Self::Connection> {
        let mut client = NntpClient::connect(self.config.clone()).await?;
        client.handshake().await?;
        Ok(client)
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<()> {
        if conn.is_poisoned() {
            return Err(IndexError::ConnectionClosed);
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_poisoned()
    }
}

/// NNTP connection pool with retry support
///
/// Caps concurrent sessions per server, authenticates new sessions, and
/// discards poisoned ones instead of re-pooling them.
///
/// # Example
///
/// ```no_run
/// use usedex::{NntpPool, ServerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
///
/// // One pool per server, capacity from config.connections
/// let pool = NntpPool::new(config).await?;
///
/// let mut session = pool.get().await?;
/// session.select_group("alt.binaries.tv").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct NntpPool {
    pool: Pool<NntpConnectionManager>,
    retry_config: RetryConfig,
}

impl NntpPool {
    /// Create a connection pool for one server with default retry configuration
    ///
    /// Pool capacity is `config.connections` (the per-server session cap).
    pub async fn new(config: ServerConfig) -> Result<Self> {
        Self::with_retry_config(config, RetryConfig::default()).await
    }

    /// Create a connection pool with custom retry configuration
    pub async fn with_retry_config(
        config: ServerConfig,
        retry_config: RetryConfig,
    ) -> Result<Self> {
        debug!(
            "Creating NNTP connection pool for {}:{} (max size: {}, max retries: {})",
            config.host, config.port, config.connections, retry_config.max_retries
        );

        let max_size = config.connections.max(1);
        let manager = NntpConnectionManager::new(config);
        let pool = Pool::builder()
            .max_size(max_size)
            // Allow for slow NNTP servers
            .connection_timeout(Duration::from_secs(120))
            .idle_timeout(Some(Duration::from_secs(300)))
            .build(manager)
            .await?;

        Ok(Self { pool, retry_config })
    }

    /// Get a session from the pool, retrying with backoff on failure.
    ///
    /// # Errors
    ///
    /// Returns the last underlying error (connection, authentication, or
    /// pool exhaustion) once all retry attempts are spent.
    pub async fn get(&self) -> Result<PooledConnection<'_, NntpConnectionManager>> {
        let mut last_error = None;

        for attempt in 0..=self.retry_config.max_retries {
            match self.pool.get().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    let e = match e {
                        bb8::RunError::User(e) => e,
                        bb8::RunError::TimedOut => IndexError::Timeout,
                    };

                    if let IndexError::AuthFailed(_) = e {
                        // Retrying rejected credentials only burns attempts
                        return Err(e);
                    }
                    last_error = Some(e);

                    if attempt < self.retry_config.max_retries {
                        let delay = self.retry_config.backoff_for(attempt);
                        warn!(
                            "Failed to get session from pool (attempt {}/{}), retrying in {:?}: {}",
                            attempt + 1,
                            self.retry_config.max_retries + 1,
                            delay,
                            last_error.as_ref().unwrap()
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(IndexError::Timeout))
    }

    /// Get current pool state (for monitoring)
    pub fn state(&self) -> bb8::State {
        self.pool.state()
    }

    /// QUIT every idle session so sockets close cleanly.
    ///
    /// Quitted sessions are poisoned and discarded on release. Call only
    /// once workers are done; the pool is quiet then and the sampled idle
    /// count is stable.
    pub async fn quit_idle(&self) {
        let idle = self.pool.state().idle_connections;
        for _ in 0..idle {
            match tokio::time::timeout(Duration::from_secs(5), self.pool.get()).await {
                Ok(Ok(mut session)) => {
                    if let Err(e) = session.quit().await {
                        debug!("QUIT failed during shutdown: {}", e);
                    }
                }
                _ => break,
            }
        }
    }

    /// Get the number of sessions currently in use
    pub fn connections_in_use(&self) -> u32 {
        let state = self.pool.state();
        state.connections - state.idle_connections
    }
}

/// One pool per configured server, keyed by host
pub struct PoolSet {
    pools: HashMap<String, NntpPool>,
}

impl PoolSet {
    /// Build a pool for every server in the config
    pub async fn build(servers: &[ServerConfig]) -> Result<Self> {
        let mut pools = HashMap::with_capacity(servers.len());
        for server in servers {
            let pool = NntpPool::new(server.clone()).await?;
            pools.insert(server.host.clone(), pool);
        }
        Ok(Self { pools })
    }

    /// Pool for a server host
    pub fn get(&self, host: &str) -> Result<&NntpPool> {
        self.pools
            .get(host)
            .ok_or_else(|| IndexError::Config(format!("unknown server: {}", host)))
    }

    /// Configured server hosts
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// QUIT idle sessions on every pool
    pub async fn quit_idle_all(&self) {
        for pool in self.pools.values() {
            pool.quit_idle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_manager_creation() {
        let config = ServerConfig::tls("news.example.com", "testuser", "testpass");
        let manager = NntpConnectionManager::new(config);
        assert_eq!(manager.config.host, "news.example.com");
        assert_eq!(manager.config.port, 563);
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 1500);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert!(config.jitter);
    }

    #[test]
    fn test_retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.backoff_for(0), Duration::from_millis(1500));
        assert_eq!(config.backoff_for(1), Duration::from_millis(3000));
        assert_eq!(config.backoff_for(2), Duration::from_millis(6000));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_backoff_ms: 4000,
            ..Default::default()
        };
        assert_eq!(config.backoff_for(5), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_jitter_within_half_spread() {
        let config = RetryConfig::default();
        for _ in 0..32 {
            let d = config.backoff_for(0).as_millis() as u64;
            assert!((750..=2250).contains(&d), "jittered delay {} out of range", d);
        }
    }
}
