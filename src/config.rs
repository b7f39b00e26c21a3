//! Server and indexer configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    119
}

fn default_connections() -> u32 {
    1
}

fn default_xover_span() -> u64 {
    100
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_worker_count() -> usize {
    5
}

fn default_backfill() -> u64 {
    1000
}

fn default_database() -> PathBuf {
    PathBuf::from("usedex.db")
}

fn default_queue_capacity() -> usize {
    256
}

/// NNTP server configuration
///
/// Contains all the information needed to connect to one news server.
///
/// # Example
///
/// ```
/// use usedex::ServerConfig;
///
/// // Recommended: use the constructor methods
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
///
/// // Unauthenticated plain connection on port 119
/// let config = ServerConfig::plain("news.example.com");
/// ```
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname (e.g., "news.example.com")
    pub host: String,

    /// Server port (typically 119 for plain, 563 for TLS)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use TLS/SSL encryption
    #[serde(default)]
    pub tls: bool,

    /// Username for authentication; when absent, `~/.netrc` is consulted
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Maximum concurrent sessions for this server
    #[serde(default = "default_connections")]
    pub connections: u32,

    /// XOVER chunk width (articles per request), must be ≥ 1
    #[serde(default = "default_xover_span")]
    pub xover_span: u64,

    /// Per-command timeout in seconds (GROUP, XOVER, LIST)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            username: None,
            password: None,
            connections: default_connections(),
            xover_span: default_xover_span(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }

    /// Create a configuration for a TLS connection on the standard secure port (563)
    pub fn tls(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut config = Self::new(host, 563, true);
        config.username = Some(username.into());
        config.password = Some(password.into());
        config
    }

    /// Create a configuration for an unauthenticated plain connection on the
    /// standard port (119)
    ///
    /// **Warning:** plain connections transmit credentials in clear text.
    /// Use TLS connections whenever possible.
    pub fn plain(host: impl Into<String>) -> Self {
        Self::new(host, 119, false)
    }

    /// Per-command timeout as a [`std::time::Duration`]
    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.command_timeout_secs)
    }

    /// Resolve credentials for this server.
    ///
    /// Configured credentials win; `~/.netrc` is consulted only when the
    /// config carries none.
    pub fn credentials(&self) -> Option<(String, String)> {
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            return Some((user.clone(), pass.clone()));
        }
        let path = std::env::var_os("HOME").map(|h| Path::new(&h).join(".netrc"))?;
        netrc_lookup(&path, &self.host)
    }
}

/// Indexer configuration: servers, watch set, and scheduling knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Configured news servers
    pub servers: Vec<ServerConfig>,

    /// Groups to watch at startup
    #[serde(default)]
    pub groups: Vec<String>,

    /// Path to the matcher template file; built-in matchers when absent
    #[serde(default)]
    pub regexp_file: Option<PathBuf>,

    /// Number of worker tasks
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Articles to fetch for a newly watched group
    #[serde(default = "default_backfill")]
    pub backfill: u64,

    /// SQLite database path
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Task queue bound (enqueue blocks when full)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl IndexerConfig {
    /// Create a configuration for a single server with defaults
    pub fn single_server(server: ServerConfig) -> Self {
        Self {
            servers: vec![server],
            groups: Vec::new(),
            regexp_file: None,
            worker_count: default_worker_count(),
            backfill: default_backfill(),
            database: default_database(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Look up credentials for `host` in a `.netrc`-style file.
///
/// Recognizes `machine <name> login <user> password <pass>` entries plus the
/// `default` fallback; `macdef` entries are not supported.
pub fn netrc_lookup(path: &Path, host: &str) -> Option<(String, String)> {
    let contents = std::fs::read_to_string(path).ok()?;
    let mut tokens = contents.split_whitespace();

    let mut matched = false;
    let mut fallback: Option<(Option<String>, Option<String>)> = None;
    let mut login: Option<String> = None;
    let mut password: Option<String> = None;

    while let Some(token) = tokens.next() {
        match token {
            "machine" => {
                if matched {
                    break; // Entry for our host is complete
                }
                if let Some((Some(u), Some(p))) = fallback.take() {
                    return Some((u, p));
                }
                let name = tokens.next()?;
                matched = name == host;
                login = None;
                password = None;
            }
            "default" => {
                if matched {
                    break;
                }
                fallback = Some((None, None));
                login = None;
                password = None;
            }
            "login" => {
                let value = tokens.next()?.to_string();
                if matched {
                    login = Some(value);
                } else if let Some(f) = fallback.as_mut() {
                    f.0 = Some(value);
                }
            }
            "password" => {
                let value = tokens.next()?.to_string();
                if matched {
                    password = Some(value);
                } else if let Some(f) = fallback.as_mut() {
                    f.1 = Some(value);
                }
            }
            _ => {}
        }
        if matched {
            if let (Some(u), Some(p)) = (&login, &password) {
                return Some((u.clone(), p.clone()));
            }
        }
    }

    if matched {
        if let (Some(u), Some(p)) = (login, password) {
            return Some((u, p));
        }
    }
    if let Some((Some(u), Some(p))) = fallback {
        return Some((u, p));
    }
    None
}
