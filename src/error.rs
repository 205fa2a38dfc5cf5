//! Error types and the crate-wide [`Result`] alias.

use thiserror::Error;

/// Convenience alias for handshake results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible WebSocket handshake errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The connection was closed by the peer before the handshake
    /// completed.
    #[error("Connection closed during handshake")]
    ConnectionClosed,
    /// Input-output error. Apart from `WouldBlock`, these are generally
    /// errors with the underlying connection and the handshake should be
    /// treated as failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The handshake-wide deadline expired.
    #[error("Handshake timed out")]
    Timeout,
    /// Opening-handshake protocol violation.
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Indicates the specific type or cause of an opening-handshake protocol
/// error.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtocolError {
    /// The peer sent more handshake bytes than the receive buffer holds.
    #[error("Opening handshake too long")]
    HandshakeTooLong,
    /// The request is missing required headers or carries values RFC 6455
    /// forbids.
    #[error("Invalid opening handshake request")]
    InvalidOpeningHandshake,
    /// The peer requested a WebSocket version other than 13.
    #[error("Unsupported WebSocket version")]
    UnsupportedWebSocketVersion,
    /// The request lacks headers the SP layer requires. Reserved: no
    /// current parse path produces it.
    #[error("Missing SP required headers")]
    MissingSpHeaders,
    /// The peer's SP socket type is recognized but cannot talk to the
    /// local one.
    #[error("Incompatible socket type")]
    IncompatibleSocketType,
    /// The peer requested a sub-protocol outside the SP map.
    #[error("Unrecognized socket type")]
    UnknownSocketType,
    /// The server response was not a valid `101 Switching Protocols`
    /// upgrade, or its accept key did not match the expected one.
    #[error("Invalid server handshake response")]
    InvalidServerResponse,
    /// The handshake ended before a terminal parse result was reached.
    #[error("Handshake not finished")]
    HandshakeIncomplete,
}
