use std::fmt::{self, Display, Formatter};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request never produced an HTTP response (connection refused,
    /// DNS failure, timeout, broken stream).
    Transport,
    /// The provider answered with a non-success HTTP status.
    Http,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The provider answered, but the payload breaks the protocol.
    MalformedResponse,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns the snake case identifier of this kind.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport_error",
            ErrorKind::Http => "http_error",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Other => "other",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
