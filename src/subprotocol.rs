//! SP socket types and their WebSocket sub-protocol tokens.
//!
//! The opening handshake advertises the local scalability-protocol
//! socket type as an `x-nanomsg-<role>` sub-protocol token and checks
//! the peer's token against the local type for compatibility. The map is
//! closed: ten socket types, ten tokens.

/// A scalability-protocol socket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    /// One-to-one bidirectional pipe.
    Pair,
    /// Request half of req/rep.
    Req,
    /// Reply half of req/rep.
    Rep,
    /// Publisher half of pub/sub.
    Pub,
    /// Subscriber half of pub/sub.
    Sub,
    /// Survey issuer.
    Surveyor,
    /// Survey responder.
    Respondent,
    /// Push half of the pipeline pattern.
    Push,
    /// Pull half of the pipeline pattern.
    Pull,
    /// Many-to-many bus.
    Bus,
}

/// Sub-protocol token table. Lookup is linear; the set is small and
/// never changes.
const SP_MAP: [(SocketType, &str); 10] = [
    (SocketType::Pair, "x-nanomsg-pair"),
    (SocketType::Req, "x-nanomsg-req"),
    (SocketType::Rep, "x-nanomsg-rep"),
    (SocketType::Pub, "x-nanomsg-pub"),
    (SocketType::Sub, "x-nanomsg-sub"),
    (SocketType::Surveyor, "x-nanomsg-surveyor"),
    (SocketType::Respondent, "x-nanomsg-respondent"),
    (SocketType::Push, "x-nanomsg-push"),
    (SocketType::Pull, "x-nanomsg-pull"),
    (SocketType::Bus, "x-nanomsg-bus"),
];

impl SocketType {
    /// The `Sec-WebSocket-Protocol` token advertised for this type.
    pub fn token(self) -> &'static str {
        SP_MAP
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, token)| *token)
            .expect("Bug: socket type missing from SP map")
    }

    /// Looks a token up in the map, ignoring ASCII case. Returns `None`
    /// for tokens outside the closed set.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        SP_MAP
            .iter()
            .find(|(_, candidate)| token.eq_ignore_ascii_case(candidate.as_bytes()))
            .map(|(ty, _)| *ty)
    }
}

/// The slice of a pipe the handshake consults: which SP socket type it
/// carries, and whether a given peer type may talk to it.
pub trait PipeBase {
    /// The local SP socket type.
    fn socket_type(&self) -> SocketType;

    /// True when `peer` may interoperate with the local socket type.
    fn is_peer(&self, peer: SocketType) -> bool;
}

/// Stock [`PipeBase`] implementation: one socket type with the standard
/// SP compatibility relation.
#[derive(Debug, Clone, Copy)]
pub struct SpSocket {
    socket_type: SocketType,
}

impl SpSocket {
    /// Creates a pipe handle for the given local socket type.
    pub const fn new(socket_type: SocketType) -> Self {
        Self { socket_type }
    }
}

impl PipeBase for SpSocket {
    fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn is_peer(&self, peer: SocketType) -> bool {
        use SocketType::*;
        matches!(
            (self.socket_type, peer),
            (Pair, Pair)
                | (Req, Rep)
                | (Rep, Req)
                | (Pub, Sub)
                | (Sub, Pub)
                | (Surveyor, Respondent)
                | (Respondent, Surveyor)
                | (Push, Pull)
                | (Pull, Push)
                | (Bus, Bus)
        )
    }
}
