//! RFC 6455 opening handshake for Scalability Protocols sockets on the
//! [`monoio`](https://github.com/bytedance/monoio) runtime, modeled on
//! the nanomsg WebSocket transport.
//!
//! Given an already-connected byte stream, the crate performs the
//! opening handshake in either role, negotiates an `x-nanomsg-<role>`
//! sub-protocol against the local SP socket type, and hands the stream
//! back either upgraded and ready for framed traffic or failed. The
//! exchange is bounded: a fixed receive buffer, exact-length reads that
//! never consume a byte past the header terminator, and a handshake-wide
//! deadline.
//!
//! Use [`accept`] / [`connect`] for the async entry points, or drive the
//! sans-IO [`Handshake`] machine from your own event loop.

#![deny(
    missing_docs,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub mod error;
pub use error::{Error, ProtocolError, Result};

pub mod base64;
mod scan;
mod sha1;

pub mod handshake;
pub mod subprotocol;

pub mod client;
pub mod server;

pub use crate::{
    client::{client, client_with_config, connect, connect_with_config},
    handshake::{
        client::generate_key,
        derive_accept_key,
        machine::{Action, Event, Handshake, HandshakeConfig, Mode, Outcome, State},
        parse::ResponseCode,
    },
    server::{accept, accept_with_config},
    subprotocol::{PipeBase, SocketType, SpSocket},
};
