//! Ayat Core - rate-governed HTTP collection infrastructure
//!
//! Shared building blocks for crawling a rate-limited JSON API politely:
//! a blocking transport over reqwest, a circuit breaker that shrinks the
//! concurrency budget on repeated 429s, bounded fan-out on a rayon pool,
//! and a batched JSON Lines ledger that survives interruption.

pub mod breaker;
pub mod client;
pub mod error;
pub mod fanout;
pub mod http;
pub mod ledger;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
mod work_queue;

// Re-exports for convenience
pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, Permit};
pub use client::{ClientConfig, RateClient};
pub use error::{FetchError, LedgerError};
pub use fanout::{Fanout, FanoutReport, MAX_WORKERS, MIN_WORKERS};
pub use http::{
    DEFAULT_REQUEST_TIMEOUT, HttpResponse, ReqwestTransport, SHARED_RUNTIME, Transport,
    TransportError,
};
pub use ledger::{Ledger, LedgerScan, OpenMode, scan};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{backoff_duration, requeue_rate_limited};
pub use shutdown::{Cancelled, ShutdownToken};
