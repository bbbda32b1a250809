//! Fixed-window request limiter keyed by client address
//!
//! Each client gets a counter that resets when its window rolls over. Bursts
//! straddling a window boundary can reach twice the nominal rate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Length of one counting window
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Default)]
struct Windows {
    clients: HashMap<String, Window>,
    last_purge: Option<Instant>,
}

/// Per-client fixed-window counter
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<Windows>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32) -> Self {
        Self::with_window(max_requests, WINDOW)
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count a request from `client` now; false when it must be rejected
    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    /// Count a request from `client` at `now`
    pub fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let window = self.window;
        let expired = |w: &Window| now.saturating_duration_since(w.started) >= window;

        // Sweep idle clients at most once per window
        let purge_due = windows
            .last_purge
            .map_or(true, |at| now.saturating_duration_since(at) >= window);
        if purge_due {
            windows.clients.retain(|_, w| !expired(&*w));
            windows.last_purge = Some(now);
        }

        let entry = windows.clients.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if expired(&*entry) {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Number of clients currently tracked, including rolled-over ones not yet swept
    pub fn tracked_clients(&self) -> usize {
        match self.windows.lock() {
            Ok(guard) => guard.clients.len(),
            Err(poisoned) => poisoned.into_inner().clients.len(),
        }
    }
}
