//! Error types shared by the acquisition engine

use std::path::PathBuf;

use crate::http::TransportError;
use crate::shutdown::Cancelled;

/// Failure of a single request issued through the rate-governed client.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP 429. The breaker has already counted it; never retried by the client.
    RateLimited,
    /// Non-success status other than 429
    Http { status: u16, message: String },
    /// Network failure that survived local retries
    Transport(TransportError),
    /// Body was not the expected JSON
    Decode(String),
    /// Shutdown was requested before the request could be issued
    Cancelled,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limited (HTTP 429)"),
            Self::Http { status, message } if message.is_empty() => write!(f, "HTTP {status}"),
            Self::Http { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Transport(e) => write!(f, "{e}"),
            Self::Decode(msg) => write!(f, "invalid response: {msg}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl FetchError {
    /// Whether a later attempt (this run or a resumed one) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Decode(_) | Self::Cancelled => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

/// Failure writing or reading the output ledger. Always fatal for a run.
#[derive(Debug)]
pub enum LedgerError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Encode(serde_json::Error),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "ledger {}: {source}", path.display()),
            Self::Encode(e) => write!(f, "ledger record encoding: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encode(e) => Some(e),
        }
    }
}
