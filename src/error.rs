/// Error type returned by this crate.
///
/// Only terminal outcomes are represented here. Whether a failure is worth
/// retrying is decided by a [`RetryPolicy`](crate::RetryPolicy), never by the
/// variant alone.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network or request execution error from `reqwest`.
    #[error("transport error")]
    Transport(#[source] reqwest::Error),
    /// I/O error surfaced by a transport that does not go through `reqwest`.
    #[error("io error")]
    Io(#[from] std::io::Error),
    /// The caller cancelled the request or its deadline passed.
    #[error("request cancelled")]
    Cancelled,
    /// The original request body could not be buffered for replay.
    #[error("copying request body")]
    BodyCopy(#[source] reqwest::Error),
    /// A token source failed to produce an access token.
    #[error("token error: {0}")]
    Token(String),
    /// An access token could not be encoded as a header value.
    #[error("invalid header value")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    /// A URL handed to the client could not be parsed.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Parser message.
        reason: String,
    },
    /// Retry settings could not be read.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err)
    }
}
