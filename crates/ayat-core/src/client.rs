//! Rate-governed API client
//!
//! Every request goes through three gates before it reaches the transport:
//! the breaker's concurrency budget (which also enforces trip pauses), the
//! per-client pacing delay measured between request starts, and the shutdown
//! token. Network failures and 502/503/504 are retried here with exponential
//! backoff; 429s are counted by the breaker and surfaced immediately.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::error::FetchError;
use crate::http::Transport;
use crate::retry::backoff_duration;
use crate::shutdown::{Cancelled, ShutdownToken};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme + host, no trailing slash
    pub base_url: String,
    /// Minimum gap between the starts of two requests
    pub min_delay: Duration,
    /// Local retries for network failures and gateway errors
    pub max_retries: u32,
    /// First backoff step; doubles per attempt
    pub backoff_base: Duration,
    pub breaker: BreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            min_delay: Duration::from_millis(300),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Statuses that indicate an overloaded or restarting upstream
fn is_transient_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

pub struct RateClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    last_start: Mutex<Option<Instant>>,
    min_delay: Duration,
    max_retries: u32,
    backoff_base: Duration,
    token: ShutdownToken,
}

impl RateClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, token: ShutdownToken) -> Self {
        log::debug!(
            "RateClient: base_url={}, delay={:?}, concurrency={}, breaker={}x429/{:?}",
            config.base_url,
            config.min_delay,
            config.breaker.concurrency,
            config.breaker.threshold,
            config.breaker.pause
        );
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
            breaker: Arc::new(CircuitBreaker::new(config.breaker)),
            last_start: Mutex::new(None),
            min_delay: config.min_delay,
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            token,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn token(&self) -> &ShutdownToken {
        &self.token
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// GET `path` (relative to the base URL) and return the body of a 2xx response.
    pub fn fetch(&self, path: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self.breaker.preflight(&self.token)?;
                self.pace()?;
                self.transport.get(&url, query)
            };

            let failure = match result {
                Ok(resp) if resp.status == 429 => {
                    let tripped = self.breaker.record_rate_limited();
                    log::debug!("{path}: HTTP 429 (tripped={tripped})");
                    return Err(FetchError::RateLimited);
                }
                Ok(resp) if resp.is_success() => {
                    self.breaker.record_success();
                    return Ok(resp.body);
                }
                Ok(resp) if is_transient_status(resp.status) => FetchError::Http {
                    status: resp.status,
                    message: resp.body_excerpt().to_string(),
                },
                Ok(resp) => {
                    return Err(FetchError::Http {
                        status: resp.status,
                        message: resp.body_excerpt().to_string(),
                    });
                }
                Err(e) => FetchError::Transport(e),
            };

            if attempt >= self.max_retries {
                log::warn!("{path}: failed after {} attempts: {failure}", attempt + 1);
                return Err(failure);
            }
            attempt += 1;
            let delay = backoff_duration(self.backoff_base, attempt - 1);
            log::debug!(
                "{path}: attempt {attempt}/{} failed: {failure}, retrying in {delay:?}",
                self.max_retries
            );
            self.token.sleep(delay)?;
        }
    }

    /// Serialize request starts so consecutive ones are at least `min_delay` apart.
    fn pace(&self) -> Result<(), Cancelled> {
        let mut last = self
            .last_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                self.token.sleep(self.min_delay - elapsed)?;
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }
}
