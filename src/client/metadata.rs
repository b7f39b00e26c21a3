//! Overview retrieval (XOVER)
//!
//! XOVER retrieves article metadata (subject, poster, date, message-id,
//! size) for a range of article numbers without downloading bodies. This is
//! the only per-article data the indexer ever fetches.

use crate::commands::{self, OverviewRecord};
use crate::error::{IndexError, Result};
use crate::response::codes;
use tracing::{trace, warn};

use super::NntpClient;

impl NntpClient {
    /// Fetch article overview data for an inclusive range.
    ///
    /// A group must be selected first. Lines that fail to parse are logged
    /// and skipped; an empty response is a valid no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`IndexError::Protocol`] - No group selected (412) or other server error
    /// - [`IndexError::Timeout`] - Server did not respond in time
    pub async fn fetch_xover(&mut self, lo: u64, hi: u64) -> Result<Vec<OverviewRecord>> {
        trace!("Fetching XOVER: {}-{}", lo, hi);

        let cmd = commands::xover(lo, hi);
        self.send_command(&cmd).await?;
        let (response, raw_lines) = self.read_multiline_response().await?;

        if response.code != codes::OVERVIEW_INFO_FOLLOWS {
            return Err(IndexError::Protocol {
                code: response.code,
                message: response.message,
            });
        }

        // Pre-allocate: one record per response line (minus failed parses)
        let mut records = Vec::with_capacity(raw_lines.len());
        for line in &raw_lines {
            match commands::parse_overview_line(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "Failed to parse XOVER line: {} - {}",
                        String::from_utf8_lossy(line),
                        e
                    );
                    continue;
                }
            }
        }

        Ok(records)
    }
}
