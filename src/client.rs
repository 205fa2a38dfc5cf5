//! Methods to reach a WebSocket peer as a client.

use monoio::{
    io::{AsyncReadRent, AsyncWriteRent},
    net::TcpStream,
};

use crate::{
    error::Result,
    handshake::{
        driver,
        machine::{Handshake, HandshakeConfig, Mode},
    },
    subprotocol::PipeBase,
};

/// Connects over TCP and performs the client side of the opening
/// handshake.
///
/// `addr` is a `host:port` pair used both to dial and as the `Host`
/// header; `resource` is the path sent in the GET line and must be
/// non-empty. On success the stream is returned upgraded and ready for
/// framed traffic.
///
/// The runtime must have its timer enabled for the handshake deadline.
pub async fn connect<P>(addr: &str, resource: &str, pipe: P) -> Result<TcpStream>
where
    P: PipeBase,
{
    connect_with_config(addr, resource, pipe, None).await
}

/// The same as [`connect`] but the one can specify a handshake
/// configuration.
pub async fn connect_with_config<P>(
    addr: &str,
    resource: &str,
    pipe: P,
    config: Option<HandshakeConfig>,
) -> Result<TcpStream>
where
    P: PipeBase,
{
    let stream = TcpStream::connect(addr).await?;
    client_with_config(stream, pipe, resource, addr, config).await
}

/// Performs the client handshake over an already-connected stream.
pub async fn client<S, P>(stream: S, pipe: P, resource: &str, host: &str) -> Result<S>
where
    S: AsyncReadRent + AsyncWriteRent,
    P: PipeBase,
{
    client_with_config(stream, pipe, resource, host, None).await
}

/// The same as [`client`] but the one can specify a handshake
/// configuration. Passing `None` is equal to calling [`client`].
pub async fn client_with_config<S, P>(
    stream: S,
    pipe: P,
    resource: &str,
    host: &str,
    config: Option<HandshakeConfig>,
) -> Result<S>
where
    S: AsyncReadRent + AsyncWriteRent,
    P: PipeBase,
{
    let mut machine = Handshake::with_config(config.unwrap_or_default());
    let first = machine.start(stream, pipe, Mode::Client, resource, host);
    driver::drive(&mut machine, first).await
}
