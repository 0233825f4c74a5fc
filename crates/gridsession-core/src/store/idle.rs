//! Idle-timeout tracking for store entries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks the last access of each key so idle entries can be expired.
///
/// An entry is idle once more than `timeout` has passed since its last
/// touch. A tracker without a timeout never reports anything as idle.
#[derive(Debug)]
pub struct IdleTracker {
    last_access: HashMap<String, Instant>,
    timeout: Option<Duration>,
}

impl IdleTracker {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            last_access: HashMap::new(),
            timeout,
        }
    }

    /// Record an access, restarting the key's idle timer.
    pub fn touch(&mut self, key: &str) {
        self.last_access.insert(key.to_string(), Instant::now());
    }

    /// Stop tracking a key.
    pub fn forget(&mut self, key: &str) {
        self.last_access.remove(key);
    }

    pub fn is_idle(&self, key: &str) -> bool {
        self.is_idle_at(key, Instant::now())
    }

    fn is_idle_at(&self, key: &str, now: Instant) -> bool {
        match (self.timeout, self.last_access.get(key)) {
            (Some(timeout), Some(last)) => now.saturating_duration_since(*last) > timeout,
            _ => false,
        }
    }

    /// Remove and return every key idle at `now`.
    pub fn drain_idle_at(&mut self, now: Instant) -> Vec<String> {
        let Some(timeout) = self.timeout else {
            return Vec::new();
        };
        let idle: Vec<String> = self
            .last_access
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) > timeout)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &idle {
            self.last_access.remove(key);
        }
        idle
    }

    pub fn drain_idle(&mut self) -> Vec<String> {
        self.drain_idle_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.last_access.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_access.is_empty()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
