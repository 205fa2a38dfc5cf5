//! Incremental parsing of the opening handshake.
//!
//! Both entry points operate on whatever prefix of the peer's handshake
//! has been buffered so far and report [`RecvMore`] until the CRLF CRLF
//! terminator is present, then analyze the message in one pass. Captured
//! header values are slices of the buffer; nothing is copied.
//!
//! This is not a general-purpose HTTP parser. It recognizes exactly the
//! fields the upgrade needs and skips everything else line by line.
//!
//! [`RecvMore`]: RequestParse::RecvMore

use crate::{
    handshake::TERMSEQ,
    scan::{self, Cursor},
    subprotocol::{PipeBase, SocketType},
};

const CRLF: &[u8] = b"\r\n";

/// Server-side reply selector, carried from the parse to the reply
/// builder. `Ok` upgrades the connection; everything else picks one of
/// the `400` failure replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Upgrade the connection.
    Ok,
    /// The opening handshake overflowed the receive buffer.
    TooBig,
    /// RFC 6455 violation: missing required headers or bad values.
    WsProto,
    /// The client asked for a WebSocket version other than 13.
    WsVersion,
    /// SP-required headers are missing. Reserved: no parse path
    /// currently assigns it.
    NnProto,
    /// The client's socket type cannot talk to the local one.
    NotPeer,
    /// The client's sub-protocol token is not in the SP map.
    UnknownType,
}

/// Header slices captured from a client's opening request. Absent
/// headers stay `None`; present values are trimmed of ASCII spaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpeningRequest<'a> {
    /// Requested resource from the GET line.
    pub uri: Option<&'a [u8]>,
    /// `Host` header value.
    pub host: Option<&'a [u8]>,
    /// `Origin` header value.
    pub origin: Option<&'a [u8]>,
    /// `Sec-WebSocket-Key` header value (Base64 text).
    pub key: Option<&'a [u8]>,
    /// `Upgrade` header value.
    pub upgrade: Option<&'a [u8]>,
    /// `Connection` header value.
    pub connection: Option<&'a [u8]>,
    /// `Sec-WebSocket-Version` header value.
    pub version: Option<&'a [u8]>,
    /// `Sec-WebSocket-Protocol` header value.
    pub protocol: Option<&'a [u8]>,
    /// `Sec-WebSocket-Extensions` header value.
    pub extensions: Option<&'a [u8]>,
}

/// Header slices captured from a server's handshake response.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpeningResponse<'a> {
    /// Status code from the status line.
    pub status_code: Option<&'a [u8]>,
    /// Reason phrase from the status line.
    pub reason_phrase: Option<&'a [u8]>,
    /// `Server` header value.
    pub server: Option<&'a [u8]>,
    /// `Sec-WebSocket-Accept` header value.
    pub accept_key: Option<&'a [u8]>,
    /// `Upgrade` header value.
    pub upgrade: Option<&'a [u8]>,
    /// `Connection` header value.
    pub connection: Option<&'a [u8]>,
    /// `Sec-WebSocket-Version-Server` header value.
    pub version: Option<&'a [u8]>,
    /// `Sec-WebSocket-Protocol-Server` header value.
    pub protocol: Option<&'a [u8]>,
    /// `Sec-WebSocket-Extensions` header value.
    pub extensions: Option<&'a [u8]>,
}

/// Result of parsing a client's opening request.
#[derive(Debug)]
pub enum RequestParse<'a> {
    /// The terminator was seen and the request analyzed. `code` is
    /// [`ResponseCode::Ok`] for a valid, compatible upgrade and a
    /// failure code otherwise.
    Done {
        /// The captured header view.
        request: OpeningRequest<'a>,
        /// Reply selector for the server.
        code: ResponseCode,
    },
    /// More bytes are needed before validity can be determined.
    RecvMore,
}

/// Result of parsing a server's handshake response.
#[derive(Debug)]
pub enum ResponseParse<'a> {
    /// A well-formed `101 Switching Protocols` with the expected accept
    /// key.
    Valid(OpeningResponse<'a>),
    /// Complete but not an acceptable upgrade.
    Invalid,
    /// More bytes are needed before validity can be determined.
    RecvMore,
}

/// Parses a client's opening request (server side).
pub fn parse_client_opening<'a, P>(buf: &'a [u8], pipe: &P) -> RequestParse<'a>
where
    P: PipeBase + ?Sized,
{
    if scan::find(buf, TERMSEQ).is_none() {
        return RequestParse::RecvMore;
    }

    let mut cursor = Cursor::new(buf);
    let mut request = OpeningRequest::default();

    // Request line per RFC 7230 3.1.1. Method and version are matched
    // case-sensitively, with exactly one space.
    if !cursor.match_token(b"GET ", false, false) {
        return RequestParse::RecvMore;
    }
    match cursor.match_value(b" ", false, false) {
        Some(uri) => request.uri = Some(uri),
        None => return RequestParse::RecvMore,
    }
    if !cursor.match_token(b"HTTP/1.1", false, false) {
        return RequestParse::RecvMore;
    }
    if !cursor.match_token(CRLF, false, false) {
        return RequestParse::RecvMore;
    }

    while !cursor.at_end() {
        let slot = if cursor.match_token(b"Host:", true, false) {
            Some(&mut request.host)
        } else if cursor.match_token(b"Origin:", true, false) {
            Some(&mut request.origin)
        } else if cursor.match_token(b"Sec-WebSocket-Key:", true, false) {
            Some(&mut request.key)
        } else if cursor.match_token(b"Upgrade:", true, false) {
            Some(&mut request.upgrade)
        } else if cursor.match_token(b"Connection:", true, false) {
            Some(&mut request.connection)
        } else if cursor.match_token(b"Sec-WebSocket-Version:", true, false) {
            Some(&mut request.version)
        } else if cursor.match_token(b"Sec-WebSocket-Protocol:", true, false) {
            Some(&mut request.protocol)
        } else if cursor.match_token(b"Sec-WebSocket-Extensions:", true, false) {
            Some(&mut request.extensions)
        } else if cursor.match_token(CRLF, true, false) {
            // Bare CRLF: all headers parsed.
            break;
        } else {
            // Unknown header; skip the line.
            None
        };

        let Some(value) = cursor.match_value(CRLF, true, true) else {
            return RequestParse::RecvMore;
        };
        if let Some(slot) = slot {
            *slot = Some(value);
        }
    }

    debug_assert!(cursor.at_end(), "read scheduling let bytes trail the terminator");

    // Required fields per RFC 6455 4.1.
    if request.host.is_none()
        || request.upgrade.is_none()
        || request.connection.is_none()
        || request.key.is_none()
        || request.version.is_none()
    {
        return RequestParse::Done {
            request,
            code: ResponseCode::WsProto,
        };
    }

    // RFC 6455 4.2.1.6.
    if !scan::validate_value(b"13", request.version.unwrap_or_default(), true) {
        return RequestParse::Done {
            request,
            code: ResponseCode::WsVersion,
        };
    }

    // RFC 6455 4.2.1.3.
    if !scan::validate_value(b"websocket", request.upgrade.unwrap_or_default(), true) {
        return RequestParse::Done {
            request,
            code: ResponseCode::WsProto,
        };
    }

    // RFC 6455 4.2.1.4.
    if !scan::validate_value(b"Upgrade", request.connection.unwrap_or_default(), true) {
        return RequestParse::Done {
            request,
            code: ResponseCode::WsProto,
        };
    }

    // RFC 6455 compliance established; check SP compatibility. A client
    // that does not declare a sub-protocol is presumed PAIR, which lets
    // non-SP peers interoperate with a local PAIR socket.
    let code = match request.protocol {
        Some(token) => match SocketType::from_token(token) {
            Some(ty) if pipe.is_peer(ty) => ResponseCode::Ok,
            Some(_) => ResponseCode::NotPeer,
            None => ResponseCode::UnknownType,
        },
        None => {
            if pipe.is_peer(SocketType::Pair) {
                ResponseCode::Ok
            } else {
                ResponseCode::NotPeer
            }
        }
    };

    RequestParse::Done { request, code }
}

/// Parses a server's handshake response (client side), checking it
/// against the accept key computed at request build time.
pub fn parse_server_response<'a>(buf: &'a [u8], expected_accept_key: &[u8]) -> ResponseParse<'a> {
    if scan::find(buf, TERMSEQ).is_none() {
        return ResponseParse::RecvMore;
    }

    let mut cursor = Cursor::new(buf);
    let mut response = OpeningResponse::default();

    // Status line per RFC 7230 3.1.2.
    if !cursor.match_token(b"HTTP/1.1 ", false, false) {
        return ResponseParse::RecvMore;
    }
    match cursor.match_value(b" ", false, false) {
        Some(status) => response.status_code = Some(status),
        None => return ResponseParse::RecvMore,
    }
    match cursor.match_value(CRLF, false, false) {
        Some(reason) => response.reason_phrase = Some(reason),
        None => return ResponseParse::RecvMore,
    }

    while !cursor.at_end() {
        let slot = if cursor.match_token(b"Server:", true, false) {
            Some(&mut response.server)
        } else if cursor.match_token(b"Sec-WebSocket-Accept:", true, false) {
            Some(&mut response.accept_key)
        } else if cursor.match_token(b"Upgrade:", true, false) {
            Some(&mut response.upgrade)
        } else if cursor.match_token(b"Connection:", true, false) {
            Some(&mut response.connection)
        } else if cursor.match_token(b"Sec-WebSocket-Version-Server:", true, false) {
            Some(&mut response.version)
        } else if cursor.match_token(b"Sec-WebSocket-Protocol-Server:", true, false) {
            Some(&mut response.protocol)
        } else if cursor.match_token(b"Sec-WebSocket-Extensions:", true, false) {
            Some(&mut response.extensions)
        } else if cursor.match_token(CRLF, true, false) {
            break;
        } else {
            None
        };

        let Some(value) = cursor.match_value(CRLF, true, true) else {
            return ResponseParse::RecvMore;
        };
        if let Some(slot) = slot {
            *slot = Some(value);
        }
    }

    debug_assert!(cursor.at_end(), "read scheduling let bytes trail the terminator");

    // Required fields per RFC 6455 4.2.2.
    if response.status_code.is_none()
        || response.upgrade.is_none()
        || response.connection.is_none()
        || response.accept_key.is_none()
    {
        return ResponseParse::Invalid;
    }

    // Only a completed upgrade is handled; redirects and authentication
    // challenges fail the connection.
    if !scan::validate_value(b"101", response.status_code.unwrap_or_default(), true) {
        return ResponseParse::Invalid;
    }

    // RFC 6455 4.2.2.5.2.
    if !scan::validate_value(b"websocket", response.upgrade.unwrap_or_default(), true) {
        return ResponseParse::Invalid;
    }

    // RFC 6455 4.2.2.5.3.
    if !scan::validate_value(b"Upgrade", response.connection.unwrap_or_default(), true) {
        return ResponseParse::Invalid;
    }

    // RFC 6455 4.2.2.5.4.
    if !scan::validate_value(
        expected_accept_key,
        response.accept_key.unwrap_or_default(),
        true,
    ) {
        return ResponseParse::Invalid;
    }

    ResponseParse::Valid(response)
}
