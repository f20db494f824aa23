//! Lock-free work queue for distributing fan-out items across workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Items are claimed by an atomic cursor; each item is handed out at most once.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next item (lock-free)
    pub fn next(&self) -> Option<&S> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items never handed out, e.g. because workers stopped on shutdown.
    pub fn unclaimed(&self) -> &[S] {
        let claimed = self.cursor.load(Ordering::Relaxed).min(self.items.len());
        &self.items[claimed..]
    }
}
