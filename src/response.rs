//! NNTP response types and status codes

/// NNTP response with status code, message, and optional multi-line body
#[derive(Debug, Clone)]
pub struct NntpResponse {
    /// 3-digit NNTP response code
    pub code: u16,
    /// Status message from server
    pub message: String,
    /// Multi-line response body (empty for single-line responses)
    pub lines: Vec<String>,
}

impl NntpResponse {
    /// Check if response indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Check if response indicates continuation (3xx)
    pub fn is_continuation(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Check if response indicates error (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

/// NNTP response codes (RFC 3977 subset used by the indexer)
pub mod codes {
    /// Server ready, posting allowed
    pub const READY_POSTING_ALLOWED: u16 = 200;
    /// Server ready, no posting
    pub const READY_NO_POSTING: u16 = 201;
    /// Closing connection
    pub const CLOSING_CONNECTION: u16 = 205;
    /// Group selected
    pub const GROUP_SELECTED: u16 = 211;
    /// List of newsgroups follows
    pub const LIST_INFORMATION_FOLLOWS: u16 = 215;
    /// Overview information follows
    pub const OVERVIEW_INFO_FOLLOWS: u16 = 224;
    /// Authentication accepted
    pub const AUTH_ACCEPTED: u16 = 281;

    /// Continue with authentication
    pub const AUTH_CONTINUE: u16 = 381;

    /// No such newsgroup
    pub const NO_SUCH_GROUP: u16 = 411;
    /// No newsgroup selected
    pub const NO_GROUP_SELECTED: u16 = 412;
    /// Authentication required
    pub const AUTH_REQUIRED: u16 = 480;
    /// Authentication rejected
    pub const AUTH_REJECTED: u16 = 481;

    /// Command not recognized
    pub const COMMAND_NOT_RECOGNIZED: u16 = 500;
    /// Access denied / command unavailable
    pub const ACCESS_DENIED: u16 = 502;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: u16) -> NntpResponse {
        NntpResponse {
            code,
            message: String::new(),
            lines: vec![],
        }
    }

    #[test]
    fn test_handshake_codes_classify() {
        // Both greeting flavors succeed; 480 demands AUTHINFO before
        // reader mode is granted
        assert!(response(codes::READY_POSTING_ALLOWED).is_success());
        assert!(response(codes::READY_NO_POSTING).is_success());
        assert!(response(codes::AUTH_REQUIRED).is_error());
        assert!(!response(codes::AUTH_REQUIRED).is_success());
    }

    #[test]
    fn test_auth_exchange_codes() {
        // 381 continues the USER/PASS exchange, 281 completes it, 481
        // rejects the credentials
        assert!(response(codes::AUTH_CONTINUE).is_continuation());
        assert!(!response(codes::AUTH_CONTINUE).is_success());
        assert!(response(codes::AUTH_ACCEPTED).is_success());
        assert!(response(codes::AUTH_REJECTED).is_error());
    }

    #[test]
    fn test_fetch_codes_classify() {
        assert!(response(codes::GROUP_SELECTED).is_success());
        assert!(response(codes::OVERVIEW_INFO_FOLLOWS).is_success());
        assert!(response(codes::LIST_INFORMATION_FOLLOWS).is_success());
        // 411 drops the task for good; 412 means XOVER ran without GROUP
        assert!(response(codes::NO_SUCH_GROUP).is_error());
        assert!(response(codes::NO_GROUP_SELECTED).is_error());
    }

    #[test]
    fn test_leading_digit_splits_transient_from_poisoning() {
        // The worker retries 4xx on the same pool and poisons the session
        // on 5xx; both classify as errors, the leading digit decides which
        let transient = response(codes::NO_SUCH_GROUP);
        assert!(transient.is_error() && transient.code < 500);

        let poisoning = response(codes::COMMAND_NOT_RECOGNIZED);
        assert!(poisoning.is_error() && poisoning.code >= 500);
        assert!(response(codes::ACCESS_DENIED).code >= 500);

        // QUIT's 205 and auth continuations are never errors
        assert!(!response(codes::CLOSING_CONNECTION).is_error());
        assert!(!response(codes::AUTH_CONTINUE).is_error());
    }
}
