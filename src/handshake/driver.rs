//! Bridges the sans-IO handshake machine onto a monoio byte stream.
//!
//! The driver executes [`Action`]s and feeds the resulting [`Event`]s
//! back until the machine reports completion. The handshake deadline is
//! enforced by bounding every pending read or write with the remaining
//! time; an elapsed bound is delivered as [`Event::TimerFired`], which
//! keeps the machine's own shutdown protocol in charge of the outcome.

use std::{
    collections::VecDeque,
    future::Future,
    io,
    time::Instant,
};

use bytes::Bytes;
use monoio::io::{AsyncReadRent, AsyncWriteRent, AsyncWriteRentExt};

use crate::{
    error::{Error, ProtocolError, Result},
    handshake::{
        machine::{Action, Event, Handshake, Mode, Outcome},
        parse::ResponseCode,
    },
    subprotocol::PipeBase,
};

/// What a bounded IO attempt came back with.
enum Io {
    Data(Vec<u8>),
    Sent,
    Eof,
    Failed(io::Error),
    TimedOut,
}

/// Runs a started machine to completion. On success the upgraded stream
/// is returned; on failure the stream is dropped, closing it.
pub(crate) async fn drive<S, P>(hs: &mut Handshake<S, P>, first: Vec<Action<S>>) -> Result<S>
where
    S: AsyncReadRent + AsyncWriteRent,
    P: PipeBase,
{
    let mut pending: VecDeque<Action<S>> = first.into();
    let mut deadline: Option<Instant> = None;
    let mut timed_out = false;
    let mut eof = false;
    let mut io_error: Option<io::Error> = None;

    while let Some(action) = pending.pop_front() {
        match action {
            Action::StartTimer(timeout) => deadline = Some(Instant::now() + timeout),
            Action::StopTimer => {
                // Stopping the deadline completes synchronously here.
                deadline = None;
                let followups = hs.handle(Event::TimerStopped);
                pending.extend(followups);
            }
            Action::Recv(n) => {
                let outcome = {
                    let socket = hs
                        .socket_mut()
                        .expect("Bug: read scheduled without a stream");
                    recv_exact(socket, n, deadline).await
                };
                deliver(
                    hs,
                    &mut pending,
                    outcome,
                    &mut timed_out,
                    &mut eof,
                    &mut io_error,
                );
            }
            Action::Send(bytes) => {
                let outcome = {
                    let socket = hs
                        .socket_mut()
                        .expect("Bug: write scheduled without a stream");
                    send_all(socket, bytes, deadline).await
                };
                deliver(
                    hs,
                    &mut pending,
                    outcome,
                    &mut timed_out,
                    &mut eof,
                    &mut io_error,
                );
            }
            Action::Done {
                outcome: Outcome::Ok,
                socket,
            } => return Ok(socket),
            Action::Done {
                outcome: Outcome::Error,
                ..
            } => return Err(failure(hs, timed_out, eof, io_error)),
            Action::Stopped { .. } => unreachable!("Bug: the driver never stops the machine"),
        }
    }

    Err(Error::Protocol(ProtocolError::HandshakeIncomplete))
}

fn deliver<S, P>(
    hs: &mut Handshake<S, P>,
    pending: &mut VecDeque<Action<S>>,
    outcome: Io,
    timed_out: &mut bool,
    eof: &mut bool,
    io_error: &mut Option<io::Error>,
) where
    P: PipeBase,
{
    match outcome {
        Io::Data(data) => pending.extend(hs.handle(Event::Received(&data))),
        Io::Sent => pending.extend(hs.handle(Event::Sent)),
        Io::Eof => {
            *eof = true;
            pending.extend(hs.handle(Event::SocketShutdown));
            pending.extend(hs.handle(Event::SocketError));
        }
        Io::Failed(e) => {
            *io_error = Some(e);
            pending.extend(hs.handle(Event::SocketError));
        }
        Io::TimedOut => {
            *timed_out = true;
            pending.extend(hs.handle(Event::TimerFired));
        }
    }
}

/// Maps a failed handshake onto the error taxonomy, most specific cause
/// first.
fn failure<S, P: PipeBase>(
    hs: &Handshake<S, P>,
    timed_out: bool,
    eof: bool,
    io_error: Option<io::Error>,
) -> Error {
    if timed_out {
        return Error::Timeout;
    }
    if let Some(e) = io_error {
        return Error::Io(e);
    }
    if eof {
        return Error::ConnectionClosed;
    }
    let protocol = match hs.mode() {
        Some(Mode::Server) => hs
            .response_code()
            .map(reject_reason)
            .unwrap_or(ProtocolError::InvalidOpeningHandshake),
        _ => ProtocolError::InvalidServerResponse,
    };
    Error::Protocol(protocol)
}

fn reject_reason(code: ResponseCode) -> ProtocolError {
    match code {
        ResponseCode::TooBig => ProtocolError::HandshakeTooLong,
        ResponseCode::WsProto => ProtocolError::InvalidOpeningHandshake,
        ResponseCode::WsVersion => ProtocolError::UnsupportedWebSocketVersion,
        ResponseCode::NnProto => ProtocolError::MissingSpHeaders,
        ResponseCode::NotPeer => ProtocolError::IncompatibleSocketType,
        ResponseCode::UnknownType => ProtocolError::UnknownSocketType,
        // A sent upgrade cannot fail the exchange by itself.
        ResponseCode::Ok => ProtocolError::HandshakeIncomplete,
    }
}

/// Reads exactly `n` bytes. `Vec::with_capacity` allocates exactly the
/// requested capacity for `u8`, so the kernel can never hand back more
/// bytes than the machine asked for.
async fn recv_exact<S: AsyncReadRent>(socket: &mut S, n: usize, deadline: Option<Instant>) -> Io {
    let mut data = Vec::with_capacity(n);
    while data.len() < n {
        let chunk: Vec<u8> = Vec::with_capacity(n - data.len());
        let (res, chunk) = match bounded(socket.read(chunk), deadline).await {
            Some(result) => result,
            None => return Io::TimedOut,
        };
        match res {
            Ok(0) => return Io::Eof,
            Ok(read) => {
                debug_assert!(read <= n - data.len());
                data.extend_from_slice(&chunk[..read]);
            }
            Err(e) => return Io::Failed(e),
        }
    }
    Io::Data(data)
}

async fn send_all<S: AsyncWriteRent>(socket: &mut S, bytes: Bytes, deadline: Option<Instant>) -> Io {
    let (res, _buf) = match bounded(socket.write_all(bytes), deadline).await {
        Some(result) => result,
        None => return Io::TimedOut,
    };
    match res {
        Ok(_) => Io::Sent,
        Err(e) => Io::Failed(e),
    }
}

/// Awaits `fut` within whatever remains of the deadline. `None` means
/// the deadline expired (possibly before the attempt started).
async fn bounded<F: Future>(fut: F, deadline: Option<Instant>) -> Option<F::Output> {
    match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            monoio::time::timeout(remaining, fut).await.ok()
        }
        None => Some(fut.await),
    }
}
