//! Group selection commands and parsing

use crate::error::{IndexError, Result};
use crate::response::NntpResponse;

/// Build GROUP command
pub fn group(newsgroup: &str) -> String {
    format!("GROUP {}\r\n", newsgroup)
}

/// Group information returned by the GROUP command
///
/// Contains article count and range information for a newsgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupInfo {
    /// Number of articles in the group
    pub count: u64,
    /// Number of the first article
    pub first: u64,
    /// Number of the last article
    pub last: u64,
}

impl GroupInfo {
    /// Whether the server reports the group as empty (`first > last` or no articles)
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.first > self.last
    }
}

/// Parse GROUP response to extract article count and range
///
/// Response format: "211 count first last group-name"
pub fn parse_group_response(response: NntpResponse) -> Result<GroupInfo> {
    if !response.is_success() {
        return Err(IndexError::Protocol {
            code: response.code,
            message: response.message,
        });
    }

    let parts: Vec<&str> = response.message.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(IndexError::InvalidResponse(response.message));
    }

    let count = parts[0]
        .parse()
        .map_err(|_| IndexError::InvalidResponse(response.message.clone()))?;
    let first = parts[1]
        .parse()
        .map_err(|_| IndexError::InvalidResponse(response.message.clone()))?;
    let last = parts[2]
        .parse()
        .map_err(|_| IndexError::InvalidResponse(response.message.clone()))?;

    Ok(GroupInfo { count, first, last })
}
