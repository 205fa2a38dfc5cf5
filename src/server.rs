//! Methods to accept an incoming WebSocket connection on a server.

use monoio::io::{AsyncReadRent, AsyncWriteRent};

use crate::{
    error::Result,
    handshake::{
        driver,
        machine::{Handshake, HandshakeConfig, Mode},
    },
    subprotocol::PipeBase,
};

/// Accepts a new WebSocket connection with the provided stream.
///
/// This is typically used after a socket has been accepted from a
/// `TcpListener`. The client's opening request is validated against
/// RFC 6455 and against `pipe` for SP compatibility; a rejected request
/// is answered with a `400` reply before the error is returned. On
/// success the stream is returned upgraded and ready for framed traffic.
///
/// The runtime must have its timer enabled for the handshake deadline.
pub async fn accept<S, P>(stream: S, pipe: P) -> Result<S>
where
    S: AsyncReadRent + AsyncWriteRent,
    P: PipeBase,
{
    accept_with_config(stream, pipe, None).await
}

/// The same as [`accept`] but the one can specify a handshake
/// configuration.
pub async fn accept_with_config<S, P>(
    stream: S,
    pipe: P,
    config: Option<HandshakeConfig>,
) -> Result<S>
where
    S: AsyncReadRent + AsyncWriteRent,
    P: PipeBase,
{
    let mut machine = Handshake::with_config(config.unwrap_or_default());
    let first = machine.start(stream, pipe, Mode::Server, "", "");
    driver::drive(&mut machine, first).await
}
