//! Bounded parallel fan-out of small, independent requests.
//!
//! A dedicated rayon pool runs up to `max_workers` workers pulling from a
//! [`WorkQueue`]. Before claiming each item a worker re-reads the breaker's
//! concurrency; worker `i` retires once `i >= concurrency`. The limit never
//! rises within a run, so a retired worker is never needed again.
//!
//! Results travel back to the caller over a channel and are keyed by item,
//! so completion order does not matter.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::mpsc;

use indicatif::ProgressBar;

use crate::breaker::CircuitBreaker;
use crate::error::FetchError;
use crate::shutdown::ShutdownToken;
use crate::work_queue::WorkQueue;

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 10;

/// Per-item outcomes of one fan-out batch.
#[derive(Debug)]
pub struct FanoutReport<K, T> {
    pub results: HashMap<K, Result<T, FetchError>>,
}

impl<K: Eq + Hash, T> FanoutReport<K, T> {
    pub fn empty() -> Self {
        Self {
            results: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.failed() as f64 / self.results.len() as f64
    }

    pub fn get(&self, key: &K) -> Option<&Result<T, FetchError>> {
        self.results.get(key)
    }
}

pub struct Fanout {
    pool: rayon::ThreadPool,
    max_workers: usize,
}

impl Fanout {
    /// Build a pool of `max_workers` threads (clamped to 1–10).
    pub fn new(max_workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let max_workers = max_workers.clamp(MIN_WORKERS, MAX_WORKERS);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("fanout-{i}"))
            .build()?;
        Ok(Self { pool, max_workers })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `fetch` for every item. One item's failure never stops the others.
    ///
    /// Items left unclaimed because shutdown was requested are reported as
    /// [`FetchError::Cancelled`]. Items sharing a key keep the first result received.
    pub fn fetch_all<I, K, T>(
        &self,
        items: Vec<I>,
        breaker: &CircuitBreaker,
        token: &ShutdownToken,
        pb: &ProgressBar,
        key: impl Fn(&I) -> K + Sync,
        fetch: impl Fn(&I) -> Result<T, FetchError> + Sync,
    ) -> FanoutReport<K, T>
    where
        I: Sync,
        K: Eq + Hash + Send,
        T: Send,
    {
        if items.is_empty() {
            return FanoutReport::empty();
        }

        let queue = WorkQueue::new(items);
        let workers = self.max_workers.min(queue.total());
        let (tx, rx) = mpsc::channel::<(K, Result<T, FetchError>)>();

        {
            let queue = &queue;
            let key = &key;
            let fetch = &fetch;
            self.pool.scope(|s| {
                for worker in 0..workers {
                    let tx = tx.clone();
                    s.spawn(move |_| {
                        loop {
                            if token.is_cancelled() {
                                break;
                            }
                            if worker >= breaker.concurrency() {
                                log::debug!("fanout worker {worker} retiring after breaker trip");
                                break;
                            }
                            let Some(item) = queue.next() else { break };
                            let result = fetch(item);
                            pb.inc(1);
                            if tx.send((key(item), result)).is_err() {
                                break;
                            }
                        }
                    });
                }
            });
        }
        drop(tx);

        let mut results: HashMap<K, Result<T, FetchError>> = HashMap::with_capacity(queue.total());
        for (k, result) in rx {
            results.entry(k).or_insert(result);
        }
        for item in queue.unclaimed() {
            results.entry(key(item)).or_insert(Err(FetchError::Cancelled));
        }

        FanoutReport { results }
    }
}
