//! WebSocket opening-handshake control.

pub mod client;
pub(crate) mod driver;
pub mod machine;
pub mod parse;
pub mod server;

use crate::{base64, sha1::Sha1};

/// End-of-headers terminator of an HTTP/1.1 opening handshake.
pub(crate) const TERMSEQ: &[u8] = b"\r\n\r\n";

/// A Base64 16-byte key is 24 bytes long including padding.
pub(crate) const ENCODED_KEY_LEN: usize = 24;

/// A Base64 SHA-1 digest is 28 bytes long including padding.
pub(crate) const ACCEPT_KEY_LEN: usize = 28;

/// Derives the `Sec-WebSocket-Accept` response header from a
/// `Sec-WebSocket-Key` request header.
///
/// The input is the Base64 key text itself, not the decoded nonce.
pub fn derive_accept_key(request_key: &[u8]) -> String {
    // ... field is constructed by concatenating /key/ ...
    // ... with the string "258EAFA5-E914-47DA-95CA-C5AB0DC85B11" (RFC 6455)
    const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut sha1 = Sha1::new();
    sha1.update(request_key);
    sha1.update(WS_GUID);

    let mut encoded = [0u8; ACCEPT_KEY_LEN];
    let written = base64::encode(&sha1.finalize(), &mut encoded)
        .expect("Bug: accept key does not fit its fixed buffer");
    debug_assert_eq!(written, ACCEPT_KEY_LEN);
    String::from_utf8(encoded.to_vec()).expect("Bug: Base64 output is always ASCII")
}
