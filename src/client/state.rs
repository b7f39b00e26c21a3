//! Connection state types for NNTP sessions

/// NNTP session state
///
/// Tracks where a session is in its lifecycle: greeting received, reader
/// mode and authentication negotiated, or closed. Group selection is
/// tracked separately on the client as the current group name.
pub(super) enum ConnectionState {
    /// Greeting received, reader mode not yet negotiated
    Greeted,
    /// Authentication in progress (AUTHINFO USER sent, waiting for PASS)
    AuthInProgress,
    /// Handshake complete, ready for commands
    Ready,
    /// QUIT sent, connection closed
    Closed,
}
