//! The opening-handshake state machine.
//!
//! [`Handshake`] is a sans-IO state machine: it owns the byte stream for
//! the duration of the exchange but never touches it. Its owner feeds it
//! [`Event`]s (completed reads and writes, socket failures, timer edges)
//! and executes the [`Action`]s it returns (exact-length reads, writes,
//! timer arming). The stream is handed back inside the terminal
//! [`Action::Done`] or [`Action::Stopped`], so a machine in a terminal
//! state provably no longer holds it.
//!
//! Reads are scheduled so that the machine never consumes a byte past
//! the CRLF CRLF terminator: after each partial receive the next read
//! length is the number of bytes still missing from the terminator,
//! judged by the longest terminator prefix ending the buffer. The first
//! read is the length of the shortest syntactically valid message, so
//! the tail is always polled in chunks of one to four bytes.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, trace};

use crate::{
    handshake::{
        client,
        parse::{self, OpeningRequest, RequestParse, ResponseCode, ResponseParse},
        server, ACCEPT_KEY_LEN, TERMSEQ,
    },
    subprotocol::PipeBase,
};

/// Time allowed to complete the handshake.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default receive-buffer capacity. Generous for handshakes without
/// cookie-laden headers while still bounding a hostile peer.
const DEFAULT_RECV_CAPACITY: usize = 4096;

/// Shortest syntactically valid opening request: GET line plus the five
/// required headers, single-byte resource and host, 24-byte key. Polling
/// starts with a read of exactly this many bytes.
const MIN_SERVER_RECV: usize = "GET x HTTP/1.1\r\n\
     Host: x\r\n\
     Upgrade: websocket\r\n\
     Connection: Upgrade\r\n\
     Sec-WebSocket-Key: xxxxxxxxxxxxxxxxxxxxxxxx\r\n\
     Sec-WebSocket-Version: xx\r\n\r\n"
    .len();

/// Shortest conceivable response from a server is a terse status.
const MIN_CLIENT_RECV: usize = "HTTP/1.1 xxx\r\n\r\n".len();

/// Configuration for a [`Handshake`].
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct HandshakeConfig {
    /// Time the whole exchange may take before it fails.
    ///
    /// The default value is 5 seconds.
    pub timeout: Duration,
    /// Capacity of the receive buffer. A peer whose handshake does not
    /// terminate within this many bytes is failed.
    ///
    /// The default value is 4 KiB.
    pub recv_buffer_capacity: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            recv_buffer_capacity: DEFAULT_RECV_CAPACITY,
        }
    }
}

impl HandshakeConfig {
    /// Sets [`Self::timeout`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets [`Self::recv_buffer_capacity`].
    pub fn recv_buffer_capacity(mut self, recv_buffer_capacity: usize) -> Self {
        self.recv_buffer_capacity = recv_buffer_capacity;
        self
    }
}

/// Which side of the handshake this machine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Send the opening request, validate the response.
    Client,
    /// Receive the opening request, send the reply.
    Server,
}

/// Terminal result of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The connection is upgraded and ready for framed traffic.
    Ok,
    /// The handshake failed; the caller decides the stream's fate.
    Error,
}

/// Machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not started; the machine owns no stream.
    Idle,
    /// Receiving the client's opening request.
    ServerRecv,
    /// Sending the reply, success or failure.
    ServerReply,
    /// Sending the opening request.
    ClientSend,
    /// Receiving the server's response.
    ClientRecv,
    /// Reply handed to the socket; waiting for the write to complete.
    HandshakeSent,
    /// Waiting for the timer to stop before reporting failure.
    StoppingTimerError,
    /// Waiting for the timer to stop before reporting success.
    StoppingTimerDone,
    /// Owner-requested shutdown; waiting for the timer to stop.
    Stopping,
    /// Terminal. The stream has been handed back.
    Done,
}

/// Completion events fed into [`Handshake::handle`].
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A scheduled read completed with exactly these bytes.
    Received(&'a [u8]),
    /// The scheduled write completed in full.
    Sent,
    /// The peer shut its half of the connection down. Ignored; the
    /// socket error that follows is what fails the handshake.
    SocketShutdown,
    /// The stream failed.
    SocketError,
    /// The handshake deadline expired.
    TimerFired,
    /// The timer acknowledged a stop request. Terminal transitions wait
    /// for this; a racing [`Event::TimerFired`] delivered after the stop
    /// was requested is discarded.
    TimerStopped,
}

/// Work the owner must perform on the machine's behalf.
#[derive(Debug)]
pub enum Action<S> {
    /// Arm the handshake deadline.
    StartTimer(Duration),
    /// Stop the timer and answer with [`Event::TimerStopped`].
    StopTimer,
    /// Read exactly this many bytes, then feed [`Event::Received`].
    Recv(usize),
    /// Write these bytes in full, then feed [`Event::Sent`].
    Send(Bytes),
    /// The handshake reached its terminal state.
    Done {
        /// How it ended.
        outcome: Outcome,
        /// The stream, returned to the owner.
        socket: S,
    },
    /// An owner-requested stop completed; the machine is idle again.
    Stopped {
        /// The stream, if one was held when the stop was requested.
        socket: Option<S>,
    },
}

/// The opening-handshake state machine. `S` is the byte stream held for
/// the duration of the exchange; `P` is the pipe view consulted for SP
/// compatibility.
#[derive(Debug)]
pub struct Handshake<S, P> {
    state: State,
    mode: Option<Mode>,
    socket: Option<S>,
    pipe: Option<P>,
    resource: String,
    host: String,
    recv: BytesMut,
    recv_capacity: usize,
    send: BytesMut,
    recv_len: usize,
    retries: u32,
    timeout: Duration,
    expected_accept_key: Option<[u8; ACCEPT_KEY_LEN]>,
    response_code: Option<ResponseCode>,
}

impl<S, P: PipeBase> Handshake<S, P> {
    /// Creates an idle machine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(HandshakeConfig::default())
    }

    /// Creates an idle machine with the given configuration.
    pub fn with_config(config: HandshakeConfig) -> Self {
        Self {
            state: State::Idle,
            mode: None,
            socket: None,
            pipe: None,
            resource: String::new(),
            host: String::new(),
            recv: BytesMut::with_capacity(config.recv_buffer_capacity),
            recv_capacity: config.recv_buffer_capacity,
            send: BytesMut::new(),
            recv_len: 0,
            retries: 0,
            timeout: config.timeout,
            expected_accept_key: None,
            response_code: None,
        }
    }

    /// True when the machine may be started (again).
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The side this machine plays, once started.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// The reply selector chosen while serving, once the request has
    /// been analyzed. Useful for diagnosing rejections after the fact.
    pub fn response_code(&self) -> Option<ResponseCode> {
        self.response_code
    }

    /// How many follow-up reads the current exchange has needed.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The stream, while the machine holds one. The owner borrows it to
    /// carry out [`Action::Recv`] and [`Action::Send`].
    pub fn socket_mut(&mut self) -> Option<&mut S> {
        self.socket.as_mut()
    }

    /// Takes ownership of the stream and begins the exchange. `resource`
    /// must be non-empty in client mode.
    ///
    /// # Panics
    ///
    /// Panics when the machine is not idle: a started machine must reach
    /// [`Action::Done`] or be stopped before it can be started again.
    pub fn start(
        &mut self,
        socket: S,
        pipe: P,
        mode: Mode,
        resource: &str,
        host: &str,
    ) -> Vec<Action<S>> {
        assert!(self.state == State::Idle, "handshake already in progress");
        assert!(self.socket.is_none(), "Bug: idle machine holds a stream");
        if mode == Mode::Client {
            assert!(!resource.is_empty(), "client handshake needs a resource");
        }

        self.socket = Some(socket);
        self.pipe = Some(pipe);
        self.mode = Some(mode);
        self.resource.clear();
        self.resource.push_str(resource);
        self.host.clear();
        self.host.push_str(host);
        self.recv.clear();
        self.send.clear();
        self.retries = 0;
        self.expected_accept_key = None;
        self.response_code = None;

        let mut actions = vec![Action::StartTimer(self.timeout)];
        match mode {
            Mode::Client => {
                let local = self
                    .pipe
                    .as_ref()
                    .expect("Bug: pipe was just stored")
                    .socket_type();
                let expected =
                    client::build_opening_request(&self.resource, &self.host, local, &mut self.send);
                self.expected_accept_key = Some(expected);
                self.recv_len = MIN_CLIENT_RECV;
                self.state = State::ClientSend;
                trace!("client handshake started for {}", self.host);
                actions.push(Action::Send(self.send.split().freeze()));
            }
            Mode::Server => {
                self.recv_len = MIN_SERVER_RECV;
                debug_assert!(self.recv_len <= self.recv_capacity);
                self.state = State::ServerRecv;
                trace!("server handshake started");
                actions.push(Action::Recv(self.recv_len));
            }
        }
        actions
    }

    /// Requests a graceful shutdown. The machine stops the timer, waits
    /// for [`Event::TimerStopped`], then reports [`Action::Stopped`] and
    /// becomes idle and reusable.
    pub fn stop(&mut self) -> Vec<Action<S>> {
        if self.state == State::Idle {
            return vec![Action::Stopped { socket: None }];
        }
        self.state = State::Stopping;
        vec![Action::StopTimer]
    }

    /// Feeds one completion event into the machine.
    pub fn handle(&mut self, event: Event<'_>) -> Vec<Action<S>> {
        match self.state {
            State::Idle | State::Done => self.unexpected(event),

            State::ServerRecv => match event {
                Event::Received(bytes) => self.server_received(bytes),
                Event::SocketShutdown => Vec::new(),
                Event::SocketError | Event::TimerFired => self.abort(),
                _ => self.unexpected(event),
            },

            // HandshakeSent mirrors ServerReply: the reply is with the
            // socket and only the write completion is awaited.
            State::ServerReply | State::HandshakeSent => match event {
                Event::Sent => {
                    // As per RFC 6455 4.2.2, the exchange is complete as
                    // soon as the reply is written; whether it upgraded
                    // or failed the connection decides the outcome.
                    self.state = if self.response_code == Some(ResponseCode::Ok) {
                        State::StoppingTimerDone
                    } else {
                        State::StoppingTimerError
                    };
                    vec![Action::StopTimer]
                }
                Event::SocketShutdown => Vec::new(),
                Event::SocketError | Event::TimerFired => self.abort(),
                _ => self.unexpected(event),
            },

            State::ClientSend => match event {
                Event::Sent => {
                    self.state = State::ClientRecv;
                    trace!("opening request sent; awaiting response");
                    vec![Action::Recv(self.recv_len)]
                }
                Event::SocketShutdown => Vec::new(),
                Event::SocketError | Event::TimerFired => self.abort(),
                _ => self.unexpected(event),
            },

            State::ClientRecv => match event {
                Event::Received(bytes) => self.client_received(bytes),
                Event::SocketShutdown => Vec::new(),
                Event::SocketError | Event::TimerFired => self.abort(),
                _ => self.unexpected(event),
            },

            // The only bytes a peer would send past this point announce
            // its own close; wait for the timer, ignore the socket.
            State::StoppingTimerError => match event {
                Event::TimerStopped => self.leave(Outcome::Error),
                _ => Vec::new(),
            },

            State::StoppingTimerDone => match event {
                Event::TimerStopped => self.leave(Outcome::Ok),
                _ => Vec::new(),
            },

            State::Stopping => match event {
                Event::TimerStopped => {
                    self.state = State::Idle;
                    self.mode = None;
                    self.pipe = None;
                    trace!("handshake stopped");
                    vec![Action::Stopped {
                        socket: self.socket.take(),
                    }]
                }
                _ => Vec::new(),
            },
        }
    }

    fn server_received(&mut self, bytes: &[u8]) -> Vec<Action<S>> {
        self.buffer(bytes);

        let pipe = self
            .pipe
            .as_ref()
            .expect("Bug: server handshake without a pipe");
        let more = match parse::parse_client_opening(&self.recv, pipe) {
            RequestParse::Done { request, code } => {
                self.response_code = Some(code);
                if code != ResponseCode::Ok {
                    debug!("rejecting opening handshake: {code:?}");
                }
                server::build_reply(code, &request, &mut self.send);
                false
            }
            RequestParse::RecvMore => true,
        };

        if more {
            return self.recv_more();
        }
        self.state = State::ServerReply;
        vec![Action::Send(self.send.split().freeze())]
    }

    fn client_received(&mut self, bytes: &[u8]) -> Vec<Action<S>> {
        self.buffer(bytes);

        let expected = self
            .expected_accept_key
            .expect("Bug: response received before the request was built");
        let verdict = match parse::parse_server_response(&self.recv, &expected) {
            ResponseParse::Valid(_) => Some(Outcome::Ok),
            ResponseParse::Invalid => Some(Outcome::Error),
            ResponseParse::RecvMore => None,
        };

        match verdict {
            Some(Outcome::Ok) => {
                // As per RFC 6455 4.2.2, the connection is immediately
                // ready for framed traffic.
                self.state = State::StoppingTimerDone;
                vec![Action::StopTimer]
            }
            Some(Outcome::Error) => {
                debug!("server response failed validation");
                self.state = State::StoppingTimerError;
                vec![Action::StopTimer]
            }
            None => self.recv_more(),
        }
    }

    /// Schedules the next dribble read, or fails the exchange when the
    /// peer has outgrown the receive buffer.
    fn recv_more(&mut self) -> Vec<Action<S>> {
        debug_assert!(self.recv.len() >= TERMSEQ.len());
        self.recv_len = next_recv_len(&self.recv);

        if self.recv.len() + self.recv_len > self.recv_capacity {
            debug!("opening handshake exceeds {} bytes", self.recv_capacity);
            return match self.mode {
                Some(Mode::Server) => {
                    self.response_code = Some(ResponseCode::TooBig);
                    server::build_reply(
                        ResponseCode::TooBig,
                        &OpeningRequest::default(),
                        &mut self.send,
                    );
                    self.state = State::ServerReply;
                    vec![Action::Send(self.send.split().freeze())]
                }
                _ => self.abort(),
            };
        }

        self.retries += 1;
        vec![Action::Recv(self.recv_len)]
    }

    fn buffer(&mut self, bytes: &[u8]) {
        debug_assert!(
            self.recv.len() + bytes.len() <= self.recv_capacity,
            "read scheduling overflowed the receive buffer"
        );
        self.recv.extend_from_slice(bytes);
    }

    fn abort(&mut self) -> Vec<Action<S>> {
        self.state = State::StoppingTimerError;
        vec![Action::StopTimer]
    }

    fn leave(&mut self, outcome: Outcome) -> Vec<Action<S>> {
        let socket = self
            .socket
            .take()
            .expect("Bug: terminal transition without a stream");
        self.pipe = None;
        self.state = State::Done;
        debug!("handshake done: {outcome:?}");
        vec![Action::Done { outcome, socket }]
    }

    fn unexpected(&mut self, event: Event<'_>) -> Vec<Action<S>> {
        debug_assert!(
            false,
            "unexpected {event:?} in state {:?}",
            self.state
        );
        Vec::new()
    }
}

impl<S, P: PipeBase> Default for Handshake<S, P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes still missing from the CRLF CRLF terminator, judged by the
/// longest terminator prefix ending the buffered data. Always in [1, 4].
fn next_recv_len(buf: &[u8]) -> usize {
    let tail_len = buf.len().min(TERMSEQ.len() - 1);
    let tail = &buf[buf.len() - tail_len..];
    let overlap = (1..=tail_len)
        .rev()
        .find(|&k| tail[tail_len - k..] == TERMSEQ[..k])
        .unwrap_or(0);
    TERMSEQ.len() - overlap
}
