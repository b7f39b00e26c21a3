//! XOVER command and overview data parsing

use crate::error::{IndexError, Result};

/// Build XOVER command for fetching article overview data
pub fn xover(lo: u64, hi: u64) -> String {
    format!("XOVER {}-{}\r\n", lo, hi)
}

/// One raw XOVER record: the 8-field tab-separated overview tuple.
///
/// Subject and poster are kept as raw bytes so the encoding fallback chain
/// can run on them later; the remaining fields are plain ASCII on the wire.
#[derive(Debug, Clone)]
pub struct OverviewRecord {
    /// Article number within the newsgroup
    pub number: u64,
    /// Article subject line, undecoded
    pub subject: Vec<u8>,
    /// Article poster (From header), undecoded
    pub poster: Vec<u8>,
    /// Article date string as sent by the server
    pub date: String,
    /// Unique message ID
    pub message_id: String,
    /// References to parent articles
    pub references: String,
    /// Article size in bytes
    pub bytes: u64,
    /// Number of lines in the article
    pub lines: u64,
}

/// Parse a raw XOVER line into its components.
///
/// Format: `number \t subject \t from \t date \t message-id \t references
/// \t bytes \t lines`; fields after `lines` (e.g. Xref) are ignored.
pub fn parse_overview_line(line: &[u8]) -> Result<OverviewRecord> {
    let parts: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
    if parts.len() < 8 {
        return Err(IndexError::InvalidResponse(
            String::from_utf8_lossy(line).chars().take(100).collect(),
        ));
    }

    let number = std::str::from_utf8(parts[0])
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            IndexError::InvalidResponse(String::from_utf8_lossy(parts[0]).into_owned())
        })?;

    Ok(OverviewRecord {
        number,
        subject: parts[1].to_vec(),
        poster: parts[2].to_vec(),
        date: String::from_utf8_lossy(parts[3]).trim().to_string(),
        message_id: String::from_utf8_lossy(parts[4]).trim().to_string(),
        references: String::from_utf8_lossy(parts[5]).trim().to_string(),
        bytes: std::str::from_utf8(parts[6])
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0),
        lines: std::str::from_utf8(parts[7])
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overview_line() {
        let line = b"12345\tTest Subject\tposter@example.com\tMon, 01 Jan 2024 10:00:00 +0000\t<msg@id>\t<ref@id>\t1234\t50";
        let record = parse_overview_line(line).unwrap();

        assert_eq!(record.number, 12345);
        assert_eq!(record.subject, b"Test Subject");
        assert_eq!(record.poster, b"poster@example.com");
        assert_eq!(record.message_id, "<msg@id>");
        assert_eq!(record.bytes, 1234);
        assert_eq!(record.lines, 50);
    }

    #[test]
    fn test_parse_overview_line_trailing_fields_ignored() {
        let line =
            b"7\tsubj\tposter\tdate\t<id@x>\t\t100\t5\tXref: news.example alt.test:7\textra";
        let record = parse_overview_line(line).unwrap();
        assert_eq!(record.number, 7);
        assert_eq!(record.bytes, 100);
    }

    #[test]
    fn test_parse_overview_line_too_few_fields() {
        assert!(parse_overview_line(b"1\tsubject\tposter").is_err());
    }

    #[test]
    fn test_parse_overview_line_bad_number() {
        let line = b"abc\tsubj\tposter\tdate\t<id@x>\t\t100\t5";
        assert!(parse_overview_line(line).is_err());
    }

    #[test]
    fn test_parse_overview_line_non_utf8_subject_kept() {
        let line = b"9\tR\xe9sum\xe9\tposter\tdate\t<id@x>\t\t100\t5";
        let record = parse_overview_line(line).unwrap();
        assert_eq!(record.subject, b"R\xe9sum\xe9");
    }

    #[test]
    fn test_parse_overview_line_unparseable_sizes_default_zero() {
        let line = b"9\tsubj\tposter\tdate\t<id@x>\t\tnot-a-size\tnot-lines";
        let record = parse_overview_line(line).unwrap();
        assert_eq!(record.bytes, 0);
        assert_eq!(record.lines, 0);
    }

    #[test]
    fn test_xover_command() {
        assert_eq!(xover(1, 100), "XOVER 1-100\r\n");
    }
}
