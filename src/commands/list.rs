//! LIST ACTIVE command and parsing

use crate::error::{IndexError, Result};
use crate::response::NntpResponse;

/// Build LIST ACTIVE command (RFC 3977 §7.6.3)
///
/// Lists active newsgroups matching the wildmat pattern.
pub fn list_active(wildmat: &str) -> String {
    format!("LIST ACTIVE {}\r\n", wildmat)
}

/// Active newsgroup entry from LIST ACTIVE (RFC 3977 Section 7.6.3)
#[derive(Debug, Clone)]
pub struct ActiveGroup {
    /// Newsgroup name
    pub name: String,
    /// Highest article number
    pub high: u64,
    /// Lowest article number
    pub low: u64,
    /// Posting status:
    /// - "y" = posting allowed
    /// - "n" = posting not allowed
    /// - "m" = moderated
    /// - "=group.name" = alias to another group
    pub status: String,
}

/// Parse LIST ACTIVE response into ActiveGroup entries
///
/// Format: "group high low status"
/// Example: "alt.binaries.tv 12345 1000 y"
pub fn parse_list_active_response(response: NntpResponse) -> Result<Vec<ActiveGroup>> {
    if !response.is_success() {
        return Err(IndexError::Protocol {
            code: response.code,
            message: response.message,
        });
    }

    let mut groups = Vec::with_capacity(response.lines.len());
    for line in &response.lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue; // Skip malformed lines
        }

        let high = parts[1].parse().unwrap_or(0);
        let low = parts[2].parse().unwrap_or(0);
        // Status can be multi-character (e.g., "=group.name" alias)
        let status = parts[3].to_string();

        groups.push(ActiveGroup {
            name: parts[0].to_string(),
            high,
            low,
            status,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::codes;

    #[test]
    fn test_parse_list_active_response() {
        let response = NntpResponse {
            code: codes::LIST_INFORMATION_FOLLOWS,
            message: "Newsgroups follow".to_string(),
            lines: vec![
                "alt.binaries.tv 12345 1000 y".to_string(),
                "alt.binaries.hdtv 500 1 m".to_string(),
                "malformed".to_string(),
            ],
        };

        let groups = parse_list_active_response(response).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "alt.binaries.tv");
        assert_eq!(groups[0].high, 12345);
        assert_eq!(groups[0].low, 1000);
        assert_eq!(groups[1].status, "m");
    }

    #[test]
    fn test_parse_list_active_error() {
        let response = NntpResponse {
            code: 502,
            message: "Access denied".to_string(),
            lines: vec![],
        };
        assert!(parse_list_active_response(response).is_err());
    }
}
