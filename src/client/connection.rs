//! Connection management for NNTP sessions
//!
//! TCP/TLS establishment, socket tuning, greeting validation, and the
//! reader-mode handshake.

use crate::commands;
use crate::config::ServerConfig;
use crate::error::{IndexError, Result};
use crate::response::codes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::NntpClient;
use super::state::ConnectionState;
use super::stream::NntpStream;

/// TCP connection timeout in seconds
const TCP_CONNECT_TIMEOUT_SECS: u64 = 120;

/// TLS handshake timeout in seconds
const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 60;

/// BufReader capacity for XOVER responses (64KB)
const BUFREADER_CAPACITY: usize = 64 * 1024;

/// TCP receive buffer for overview downloads (1MB)
const RECV_BUFFER_SIZE: usize = 1024 * 1024;

impl NntpClient {
    /// Connect to an NNTP server
    ///
    /// Establishes the TCP (and, when configured, TLS) connection and reads
    /// the server greeting. Does not negotiate reader mode or authenticate;
    /// call [`handshake`](Self::handshake) next.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`IndexError::Io`] - TCP connection fails (DNS, network unreachable)
    /// - [`IndexError::Tls`] - TLS handshake fails
    /// - [`IndexError::Timeout`] - Connection or handshake times out
    /// - [`IndexError::Protocol`] - Server rejects the connection
    pub async fn connect(config: Arc<ServerConfig>) -> Result<Self> {
        debug!("Connecting to NNTP server {}:{}", config.host, config.port);

        let addr = format!("{}:{}", config.host, config.port);

        use std::net::ToSocketAddrs;
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| {
                IndexError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Failed to resolve address: {}", e),
                ))
            })?
            .next()
            .ok_or_else(|| {
                IndexError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "No address resolved",
                ))
            })?;

        // Create socket via socket2 for buffer configuration
        use socket2::{Domain, Protocol, Socket, Type};
        let domain = if socket_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket =
            Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(IndexError::Io)?;

        // NNTP is request/response; TCP_NODELAY keeps command latency low
        socket.set_nodelay(true).map_err(IndexError::Io)?;

        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
            warn!(
                "Failed to set receive buffer size to {} bytes: {}",
                RECV_BUFFER_SIZE, e
            );
        }

        // socket2 connect is blocking; run it on the blocking pool and only
        // switch to non-blocking mode after the connect succeeds
        let socket_addr_for_connect = socket_addr;
        let tcp_stream = timeout(
            Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS),
            tokio::task::spawn_blocking(move || -> std::io::Result<std::net::TcpStream> {
                socket.connect(&socket_addr_for_connect.into())?;
                socket.set_nonblocking(true)?;
                Ok(socket.into())
            }),
        )
        .await
        .map_err(|_| IndexError::Timeout)?
        .map_err(|e| IndexError::Io(std::io::Error::other(format!("Task join error: {}", e))))?
        .map_err(IndexError::Io)?;

        let tcp_stream = TcpStream::from_std(tcp_stream).map_err(IndexError::Io)?;

        let stream = if config.tls {
            timeout(
                Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS),
                NntpStream::upgrade_tls(tcp_stream, &config.host),
            )
            .await
            .map_err(|_| IndexError::Timeout)??
        } else {
            NntpStream::Plain(tcp_stream)
        };

        let mut client = Self {
            stream: BufReader::with_capacity(BUFREADER_CAPACITY, stream),
            state: ConnectionState::Greeted,
            config,
            current_group: None,
            poisoned: false,
        };

        // Read server greeting (200 posting allowed / 201 read-only)
        let greeting = client.read_response().await?;
        debug!("Server greeting: {} {}", greeting.code, greeting.message);

        if !greeting.is_success() {
            return Err(IndexError::Protocol {
                code: greeting.code,
                message: greeting.message,
            });
        }

        Ok(client)
    }

    /// Negotiate reader mode and authenticate as needed.
    ///
    /// MODE READER is attempted once after the greeting; when the server
    /// answers 480 (authentication required), [`authenticate`](Self::authenticate)
    /// runs first and MODE READER is retried. Servers that do not recognize
    /// MODE READER (500/502) are accepted as-is.
    pub async fn handshake(&mut self) -> Result<()> {
        match self.try_mode_reader().await? {
            ModeReaderOutcome::Ok => {}
            ModeReaderOutcome::AuthRequired => {
                self.authenticate().await?;
                if matches!(self.try_mode_reader().await?, ModeReaderOutcome::AuthRequired) {
                    return Err(IndexError::AuthFailed(
                        "server still requires authentication after AUTHINFO".to_string(),
                    ));
                }
            }
        }

        // Authenticate eagerly when credentials are available and the server
        // did not already demand them
        if !matches!(self.state, ConnectionState::Ready | ConnectionState::Closed) {
            if self.config.credentials().is_some() {
                self.authenticate().await?;
            } else {
                self.state = ConnectionState::Ready;
            }
        }

        Ok(())
    }

    async fn try_mode_reader(&mut self) -> Result<ModeReaderOutcome> {
        debug!("Switching to reader mode");

        self.send_command(commands::mode_reader()).await?;
        let response = self.read_response().await?;

        match response.code {
            codes::READY_POSTING_ALLOWED | codes::READY_NO_POSTING => Ok(ModeReaderOutcome::Ok),
            codes::AUTH_REQUIRED => Ok(ModeReaderOutcome::AuthRequired),
            // Transit-only servers reject MODE READER; reading still works
            codes::COMMAND_NOT_RECOGNIZED | codes::ACCESS_DENIED => {
                debug!("MODE READER not recognized ({}), continuing", response.code);
                Ok(ModeReaderOutcome::Ok)
            }
            _ => Err(IndexError::Protocol {
                code: response.code,
                message: response.message,
            }),
        }
    }

    /// Send QUIT and close the session cleanly
    pub async fn quit(&mut self) -> Result<()> {
        debug!("Quitting session");

        self.send_command(commands::quit()).await?;
        let response = self.read_response().await?;
        self.state = ConnectionState::Closed;
        // A quitted session must never go back into rotation
        self.poison();

        if response.code != codes::CLOSING_CONNECTION {
            return Err(IndexError::Protocol {
                code: response.code,
                message: response.message,
            });
        }
        Ok(())
    }
}

enum ModeReaderOutcome {
    Ok,
    AuthRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_constants() {
        assert_eq!(TCP_CONNECT_TIMEOUT_SECS, 120);
        assert_eq!(TLS_HANDSHAKE_TIMEOUT_SECS, 60);
    }

    #[test]
    fn test_bufreader_capacity() {
        // Default 8KB is too small for XOVER spans; 64KB keeps syscalls down
        assert_eq!(BUFREADER_CAPACITY, 64 * 1024);
    }
}
