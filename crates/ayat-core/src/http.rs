//! HTTP transport behind the rate-governed client.
//!
//! Uses async reqwest on a shared tokio runtime, but presents a blocking
//! interface so rayon workers and the collector thread can call it directly.

use std::sync::LazyLock;
use std::time::Duration;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whole-request timeout (connect + headers + body)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum response body kept in error messages
const ERROR_BODY_LIMIT: usize = 200;

/// Network-level failure: the request never produced an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout(String),
    Connect(String),
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Connect(msg) => write!(f, "connection failed: {msg}"),
            Self::Other(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let msg = e.to_string();
        if e.is_timeout() {
            Self::Timeout(msg)
        } else if e.is_connect() {
            Self::Connect(msg)
        } else {
            Self::Other(msg)
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Leading part of the body, for error messages.
    pub fn body_excerpt(&self) -> &str {
        if self.body.len() <= ERROR_BODY_LIMIT {
            return &self.body;
        }
        let mut end = ERROR_BODY_LIMIT;
        while !self.body.is_char_boundary(end) {
            end -= 1;
        }
        &self.body[..end]
    }
}

/// Blocking GET transport.
///
/// Implementations must not interpret status codes: 429 and 5xx are returned
/// as ordinary responses so the client can apply its own policy.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, TransportError>;
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// reqwest-backed transport with connection pooling.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        SHARED_RUNTIME.handle().block_on(async {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(query)
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(&e))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::from_reqwest(&e))?;
            Ok(HttpResponse { status, body })
        })
    }
}
