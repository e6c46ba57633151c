/// Errors raised while turning frames into events and back, and while
/// checking the opening handshake.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[cfg(feature = "json")]
    #[error("cannot encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// Bytes that are not an envelope, or carry an unknown event type.
    #[cfg(feature = "json")]
    #[error("cannot decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    /// The first frame was not a handshake.
    #[error("expected handshake, got {0}")]
    HandshakeExpected(String),

    /// The peer went quiet or hung up before handshaking.
    #[error("no handshake: {0}")]
    NoHandshake(&'static str),
}
