//! Server handshake reply.

use std::fmt::Write;

use bytes::BytesMut;

use crate::handshake::{
    derive_accept_key,
    parse::{OpeningRequest, ResponseCode},
};

impl ResponseCode {
    /// Status line text sent when failing the connection.
    fn status(self) -> &'static str {
        match self {
            ResponseCode::TooBig => "400 Opening Handshake Too Long",
            ResponseCode::WsProto => "400 Cannot Have Body",
            ResponseCode::WsVersion => "400 Unsupported WebSocket Version",
            ResponseCode::NnProto => "400 Missing nanomsg Required Headers",
            ResponseCode::NotPeer => "400 Incompatible Socket Type",
            ResponseCode::UnknownType => "400 Unrecognized Socket Type",
            ResponseCode::Ok => unreachable!("Bug: Ok selects the upgrade reply"),
        }
    }
}

/// Formats the reply selected by `code` into `dst`.
///
/// An `Ok` upgrades the connection per RFC 6455 4.2.2, echoing the
/// client's sub-protocol token (empty when the client sent none). Any
/// other code fails the connection per RFC 6455 4.4 with a helpful
/// status line and an echo of the client's version field; the failure
/// reply deliberately ends after that header.
pub(crate) fn build_reply(code: ResponseCode, request: &OpeningRequest<'_>, dst: &mut BytesMut) {
    if code == ResponseCode::Ok {
        let key = request.key.expect("Bug: upgrade reply without a client key");
        let accept_key = derive_accept_key(key);

        write!(
            dst,
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept_key}\r\n\
             Sec-WebSocket-Protocol: "
        )
        .expect("Bug: writing to BytesMut cannot fail");
        dst.extend_from_slice(request.protocol.unwrap_or_default());
        dst.extend_from_slice(b"\r\n\r\n");
    } else {
        write!(
            dst,
            "HTTP/1.1 {status}\r\nSec-WebSocket-Version: ",
            status = code.status()
        )
        .expect("Bug: writing to BytesMut cannot fail");
        dst.extend_from_slice(request.version.unwrap_or_default());
        dst.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_reply() {
        let request = OpeningRequest {
            key: Some(b"dGhlIHNhbXBsZSBub25jZQ=="),
            protocol: Some(b"x-nanomsg-req"),
            ..OpeningRequest::default()
        };
        let mut reply = BytesMut::new();
        build_reply(ResponseCode::Ok, &request, &mut reply);

        assert_eq!(
            &reply[..],
            b"HTTP/1.1 101 Switching Protocols\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
              Sec-WebSocket-Protocol: x-nanomsg-req\r\n\r\n"
                .as_slice()
        );
    }

    #[test]
    fn upgrade_reply_echoes_empty_protocol() {
        let request = OpeningRequest {
            key: Some(b"dGhlIHNhbXBsZSBub25jZQ=="),
            ..OpeningRequest::default()
        };
        let mut reply = BytesMut::new();
        build_reply(ResponseCode::Ok, &request, &mut reply);

        let text = std::str::from_utf8(&reply).unwrap();
        assert!(text.contains("Sec-WebSocket-Protocol: \r\n"));
    }

    #[test]
    fn version_failure_reply() {
        let request = OpeningRequest {
            version: Some(b"8"),
            ..OpeningRequest::default()
        };
        let mut reply = BytesMut::new();
        build_reply(ResponseCode::WsVersion, &request, &mut reply);

        assert_eq!(
            &reply[..],
            b"HTTP/1.1 400 Unsupported WebSocket Version\r\n\
              Sec-WebSocket-Version: 8\r\n"
                .as_slice()
        );
    }

    #[test]
    fn overflow_failure_reply_has_empty_version_echo() {
        let mut reply = BytesMut::new();
        build_reply(ResponseCode::TooBig, &OpeningRequest::default(), &mut reply);

        assert_eq!(
            &reply[..],
            b"HTTP/1.1 400 Opening Handshake Too Long\r\n\
              Sec-WebSocket-Version: \r\n"
                .as_slice()
        );
    }
}
