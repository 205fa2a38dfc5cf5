//! Client handshake request.

use std::fmt::Write;

use bytes::BytesMut;

use crate::{
    base64,
    handshake::{derive_accept_key, ACCEPT_KEY_LEN, ENCODED_KEY_LEN},
    subprotocol::SocketType,
};

/// Generates a random key for the `Sec-WebSocket-Key` header.
pub fn generate_key() -> String {
    // a base64-encoded (see Section 4 of [RFC4648]) value that,
    // when decoded, is 16 bytes in length (RFC 6455)
    let nonce: [u8; 16] = rand::random();
    let mut encoded = [0u8; ENCODED_KEY_LEN];
    let written = base64::encode(&nonce, &mut encoded)
        .expect("Bug: encoded key does not fit its fixed buffer");
    debug_assert_eq!(written, ENCODED_KEY_LEN);
    String::from_utf8(encoded.to_vec()).expect("Bug: Base64 output is always ASCII")
}

/// Formats the opening GET request into `dst` and returns the accept
/// key the server must answer with.
pub(crate) fn build_opening_request(
    resource: &str,
    host: &str,
    local: SocketType,
    dst: &mut BytesMut,
) -> [u8; ACCEPT_KEY_LEN] {
    let key = generate_key();

    // Pre-calculated expected accept key per RFC 6455 4.2.2.5.4.
    let expected: [u8; ACCEPT_KEY_LEN] = derive_accept_key(key.as_bytes())
        .into_bytes()
        .try_into()
        .expect("Bug: accept key is always 28 bytes");

    write!(
        dst,
        "GET {resource} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Protocol: {token}\r\n\r\n",
        token = local.token()
    )
    .expect("Bug: writing to BytesMut cannot fail");

    expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::parse::{parse_client_opening, RequestParse, ResponseCode};
    use crate::subprotocol::SpSocket;

    #[test]
    fn random_keys() {
        let k1 = generate_key();
        println!("Generated random key 1: {k1}");
        let k2 = generate_key();
        println!("Generated random key 2: {k2}");
        assert_ne!(k1, k2);
        assert_eq!(k1.len(), k2.len());
        assert_eq!(k1.len(), 24);
        assert_eq!(k2.len(), 24);
        assert!(k1.ends_with("=="));
        assert!(k2.ends_with("=="));
        assert!(k1[..22].find('=').is_none());
        assert!(k2[..22].find('=').is_none());
    }

    #[test]
    fn request_formatting() {
        let mut request = BytesMut::new();
        let expected =
            build_opening_request("/sp", "server.example.com", SocketType::Req, &mut request);

        let text = std::str::from_utf8(&request).unwrap();
        assert!(text.starts_with("GET /sp HTTP/1.1\r\nHost: server.example.com\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.contains("Sec-WebSocket-Protocol: x-nanomsg-req\r\n"));
        assert!(text.ends_with("\r\n\r\n"));

        // The request's key and the returned accept key must agree.
        let key_line = text
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap();
        assert_eq!(
            derive_accept_key(key_line.as_bytes()).as_bytes(),
            expected.as_slice()
        );
    }

    #[test]
    fn request_parses_on_a_compatible_server() {
        let mut request = BytesMut::new();
        build_opening_request("/", "localhost", SocketType::Req, &mut request);

        assert!(matches!(
            parse_client_opening(&request, &SpSocket::new(SocketType::Rep)),
            RequestParse::Done {
                code: ResponseCode::Ok,
                ..
            }
        ));
    }
}
