//! Advisory count of live client sessions.
//!
//! The value only feeds log lines. Nothing may base an admission or
//! correctness decision on it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ClientCounter {
    live: Arc<AtomicUsize>,
}

impl ClientCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new session. The slot is released when the guard drops.
    pub fn register(&self) -> ClientSlot {
        let live = self.live.fetch_add(1, Ordering::Relaxed) + 1;
        ClientSlot {
            live: Arc::clone(&self.live),
            count_at_register: live,
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

/// One counted session.
#[derive(Debug)]
pub struct ClientSlot {
    live: Arc<AtomicUsize>,
    count_at_register: usize,
}

impl ClientSlot {
    /// Live sessions right after this one was counted.
    pub fn count_at_register(&self) -> usize {
        self.count_at_register
    }
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}
