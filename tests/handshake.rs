//! End-to-end opening handshakes over loopback TCP.

use std::time::{Duration, Instant};

use local_sync::oneshot;
use monoio::{
    io::{AsyncReadRent, AsyncWriteRentExt},
    net::{TcpListener, TcpStream},
};
use sp_ws_handshake::{
    accept, connect, connect_with_config, derive_accept_key, Error, HandshakeConfig,
    ProtocolError, SocketType, SpSocket,
};

fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Can't listen on loopback");
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

/// A raw opening request, version and sub-protocol chosen by the test.
fn raw_request(version: &str, protocol: Option<&str>) -> Vec<u8> {
    let mut request = format!(
        "GET /sp HTTP/1.1\r\n\
         Host: a\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: {version}\r\n"
    );
    if let Some(protocol) = protocol {
        request.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
    }
    request.push_str("\r\n");
    request.into_bytes()
}

async fn read_until_eof(stream: &mut TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    loop {
        let buf = Vec::with_capacity(1024);
        let (res, buf) = stream.read(buf).await;
        match res {
            Ok(0) | Err(_) => break,
            Ok(_) => data.extend_from_slice(&buf),
        }
    }
    data
}

async fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut data = Vec::new();
    while data.len() < n {
        let buf = Vec::with_capacity(n - data.len());
        let (res, buf) = stream.read(buf).await;
        assert!(res.unwrap() > 0, "peer closed early");
        data.extend_from_slice(&buf);
    }
    data
}

#[monoio::test(timer_enabled = true)]
async fn req_client_upgrades_against_rep_server() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Rep)).await
    });

    let client = connect(&addr, "/sp", SpSocket::new(SocketType::Req)).await;
    assert!(client.is_ok(), "client side failed: {:?}", client.err());
    assert!(server.await.is_ok());
}

#[monoio::test(timer_enabled = true)]
async fn pair_sockets_upgrade_both_ways() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Pair)).await
    });

    assert!(connect(&addr, "/", SpSocket::new(SocketType::Pair))
        .await
        .is_ok());
    assert!(server.await.is_ok());
}

#[monoio::test(timer_enabled = true)]
async fn unsupported_version_is_rejected_on_the_wire() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Rep)).await
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let (res, _) = stream
        .write_all(raw_request("8", Some("x-nanomsg-req")))
        .await;
    res.unwrap();

    let err = server.await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::UnsupportedWebSocketVersion)
    ));

    let reply = read_until_eof(&mut stream).await;
    assert_eq!(
        reply,
        b"HTTP/1.1 400 Unsupported WebSocket Version\r\nSec-WebSocket-Version: 8\r\n"
    );
}

#[monoio::test(timer_enabled = true)]
async fn pub_client_is_not_a_peer_of_a_req_server() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Req)).await
    });

    // The failure reply carries no header terminator, so the client side
    // keeps reading until the server hangs up on it.
    let client = connect(&addr, "/sp", SpSocket::new(SocketType::Pub)).await;
    assert!(matches!(client, Err(Error::ConnectionClosed)));

    let err = server.await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::IncompatibleSocketType)
    ));
}

#[monoio::test(timer_enabled = true)]
async fn protocolless_client_is_presumed_pair() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Pair)).await
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let (res, _) = stream.write_all(raw_request("13", None)).await;
    res.unwrap();

    let expected = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         Sec-WebSocket-Protocol: \r\n\r\n",
        derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ==")
    );
    let reply = read_exact(&mut stream, expected.len()).await;
    assert_eq!(reply, expected.as_bytes());

    assert!(server.await.is_ok());
}

#[monoio::test(timer_enabled = true)]
async fn protocolless_client_is_no_peer_for_a_req_server() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Req)).await
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let (res, _) = stream.write_all(raw_request("13", None)).await;
    res.unwrap();

    let err = server.await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::IncompatibleSocketType)
    ));

    let reply = read_until_eof(&mut stream).await;
    assert_eq!(
        reply,
        b"HTTP/1.1 400 Incompatible Socket Type\r\nSec-WebSocket-Version: 13\r\n"
    );
}

#[monoio::test(timer_enabled = true)]
async fn dribbled_request_still_upgrades() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Rep)).await
    });

    let started = Instant::now();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    for &byte in raw_request("13", Some("x-nanomsg-req")).iter() {
        let (res, _) = stream.write_all(vec![byte]).await;
        res.unwrap();
        monoio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(server.await.is_ok());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[monoio::test(timer_enabled = true)]
async fn oversized_handshake_is_rejected() {
    let (listener, addr) = listen();
    let server = monoio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept(stream, SpSocket::new(SocketType::Pair)).await
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Headers that never terminate, well past the receive buffer. The
    // write may fail once the server gives up reading; only the server
    // verdict matters here.
    let _ = stream.write_all(vec![b'x'; 16 * 1024]).await;

    let err = server.await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::HandshakeTooLong)
    ));
}

#[monoio::test(timer_enabled = true)]
async fn client_times_out_against_a_silent_server() {
    let (listener, addr) = listen();
    let (tx, rx) = oneshot::channel::<()>();
    let server = monoio::spawn(async move {
        // Accept and sit on the connection without answering.
        let (stream, _) = listener.accept().await.unwrap();
        rx.await.ok();
        drop(stream);
    });

    let config = HandshakeConfig::default().timeout(Duration::from_millis(100));
    let started = Instant::now();
    let err = connect_with_config(&addr, "/sp", SpSocket::new(SocketType::Req), Some(config))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));

    tx.send(()).unwrap();
    server.await;
}
