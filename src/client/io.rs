//! Low-level I/O operations for NNTP protocol communication
//!
//! Command transmission, single-line response parsing, and multi-line
//! response handling with per-command timeouts. Any timeout or garbage
//! response poisons the session.

use super::NntpClient;
use crate::commands;
use crate::error::{IndexError, Result};
use crate::response::NntpResponse;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::trace;

/// Strip NNTP byte-stuffing from a line (leading ".." becomes ".").
fn strip_byte_stuffing(line: &[u8]) -> &[u8] {
    if line.starts_with(b"..") { &line[1..] } else { line }
}

impl NntpClient {
    /// Send a command to the server
    pub(super) async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!("Sending command: {}", command.trim());
        let result: Result<()> = async {
            self.stream.get_mut().write_all(command.as_bytes()).await?;
            self.stream.get_mut().flush().await?;
            Ok(())
        }
        .await;
        if result.is_err() {
            self.poison();
        }
        result
    }

    /// Read a single-line response within the per-command timeout
    pub(super) async fn read_response(&mut self) -> Result<NntpResponse> {
        let command_timeout = self.config.command_timeout();
        let read_future = async {
            use tokio::io::AsyncBufReadExt;

            let mut line_bytes = Vec::with_capacity(512);
            self.stream.read_until(b'\n', &mut line_bytes).await?;

            if line_bytes.is_empty() {
                return Err(IndexError::ConnectionClosed);
            }

            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end();
            trace!("Received: {}", line);

            commands::parse_single_response(line)
        };

        let result = timeout(command_timeout, read_future)
            .await
            .map_err(|_| IndexError::Timeout)
            .and_then(|r| r);

        if matches!(
            result,
            Err(IndexError::Timeout
                | IndexError::InvalidResponse(_)
                | IndexError::ConnectionClosed
                | IndexError::Io(_))
        ) {
            self.poison();
        }
        result
    }

    /// Read a multi-line response (ending with ".\r\n"), keeping the data
    /// lines as raw bytes.
    ///
    /// XOVER subjects and posters are not guaranteed to be valid UTF-8;
    /// decoding happens later through the encoding fallback chain, so the
    /// wire bytes are preserved here.
    pub(super) async fn read_multiline_response(&mut self) -> Result<(NntpResponse, Vec<Vec<u8>>)> {
        let command_timeout = self.config.command_timeout();
        let read_future = async {
            use tokio::io::AsyncBufReadExt;

            // Read first line (status)
            let mut first_line_bytes = Vec::with_capacity(512);
            self.stream.read_until(b'\n', &mut first_line_bytes).await?;

            if first_line_bytes.is_empty() {
                return Err(IndexError::ConnectionClosed);
            }

            let first_line = String::from_utf8_lossy(&first_line_bytes);
            let first_line = first_line.trim_end();
            trace!("Received: {}", first_line);

            let (code, message) = commands::parse_response_line(first_line)?;

            // If error response, no multi-line data follows
            if code >= 400 {
                return Ok((
                    NntpResponse {
                        code,
                        message,
                        lines: vec![],
                    },
                    vec![],
                ));
            }

            // Pre-allocate with conservative estimate (XOVER spans are ≤ a few hundred lines)
            let mut raw_lines: Vec<Vec<u8>> = Vec::with_capacity(64);
            loop {
                let mut line_bytes = Vec::with_capacity(512);
                self.stream.read_until(b'\n', &mut line_bytes).await?;

                if line_bytes.is_empty() {
                    return Err(IndexError::ConnectionClosed);
                }

                // Check for terminator: line containing only "." (plus CRLF/LF)
                if line_bytes == b".\r\n" || line_bytes == b".\n" {
                    break;
                }

                // Strip trailing \r\n (NNTP line terminator, not part of payload)
                let content_end = if line_bytes.ends_with(b"\r\n") {
                    line_bytes.len() - 2
                } else if line_bytes.ends_with(b"\n") {
                    line_bytes.len() - 1
                } else {
                    line_bytes.len()
                };

                raw_lines.push(strip_byte_stuffing(&line_bytes[..content_end]).to_vec());
            }

            Ok((
                NntpResponse {
                    code,
                    message,
                    lines: vec![],
                },
                raw_lines,
            ))
        };

        let result = timeout(command_timeout, read_future)
            .await
            .map_err(|_| IndexError::Timeout)
            .and_then(|r| r);

        if matches!(
            result,
            Err(IndexError::Timeout
                | IndexError::InvalidResponse(_)
                | IndexError::ConnectionClosed
                | IndexError::Io(_))
        ) {
            self.poison();
        }
        result
    }

    /// Multi-line response with data lines decoded lossily to strings
    ///
    /// Used for LIST output, where the payload is ASCII group names.
    pub(super) async fn read_multiline_text(&mut self) -> Result<NntpResponse> {
        let (mut response, raw_lines) = self.read_multiline_response().await?;
        response.lines = raw_lines
            .iter()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .collect();
        Ok(response)
    }
}
