//! Thread-safe request metrics
//!
//! Atomic counters for the HTTP surface and the submission flow, plus a
//! bounded window of recent response times for latency percentiles.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Response times kept for percentile calculation
const MAX_RESPONSE_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<RequestMetrics> = Lazy::new(RequestMetrics::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static RequestMetrics {
    &METRICS
}

/// Counters for everything the server answers
pub struct RequestMetrics {
    requests_total: AtomicU64,
    rate_limited: AtomicU64,
    not_found: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    submissions_accepted: AtomicU64,
    submissions_rejected: AtomicU64,
    started_at: AtomicU64,
    response_times: Mutex<Vec<u64>>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            submissions_accepted: AtomicU64::new(0),
            submissions_rejected: AtomicU64::new(0),
            started_at: AtomicU64::new(current_timestamp()),
            response_times: Mutex::new(Vec::new()),
        }
    }

    /// Record one answered request by its status code
    pub fn request_completed(&self, status: u16, elapsed: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        match status {
            429 => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            404 => {
                self.not_found.fetch_add(1, Ordering::Relaxed);
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            400..=499 => {
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        let mut times = self
            .response_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        times.push(elapsed.as_millis() as u64);
        if times.len() > MAX_RESPONSE_SAMPLES {
            let excess = times.len() - MAX_RESPONSE_SAMPLES;
            times.drain(..excess);
        }
    }

    pub fn submission_accepted(&self) {
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submission_rejected(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the collector was created or last reset
    pub fn uptime_seconds(&self) -> u64 {
        current_timestamp().saturating_sub(self.started_at.load(Ordering::Relaxed))
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let mut times = self
            .response_times
            .lock()
            .map(|t| t.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
        times.sort_unstable();

        let avg_response_time_ms = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<u64>() as f64 / times.len() as f64
        };

        MetricsSnapshot {
            timestamp: current_timestamp(),
            uptime_seconds: self.uptime_seconds(),
            requests: RequestCounts {
                total: self.requests_total.load(Ordering::Relaxed),
                rate_limited: self.rate_limited.load(Ordering::Relaxed),
                not_found: self.not_found.load(Ordering::Relaxed),
                client_errors: self.client_errors.load(Ordering::Relaxed),
                server_errors: self.server_errors.load(Ordering::Relaxed),
                avg_response_time_ms,
                p95_response_time_ms: percentile(&times, 95.0),
            },
            submissions: SubmissionCounts {
                accepted: self.submissions_accepted.load(Ordering::Relaxed),
                rejected: self.submissions_rejected.load(Ordering::Relaxed),
            },
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.requests_total.store(0, Ordering::Relaxed);
        self.rate_limited.store(0, Ordering::Relaxed);
        self.not_found.store(0, Ordering::Relaxed);
        self.client_errors.store(0, Ordering::Relaxed);
        self.server_errors.store(0, Ordering::Relaxed);
        self.submissions_accepted.store(0, Ordering::Relaxed);
        self.submissions_rejected.store(0, Ordering::Relaxed);
        self.started_at.store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.response_times.lock() {
            times.clear();
        }
    }
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub requests: RequestCounts,
    pub submissions: SubmissionCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestCounts {
    pub total: u64,
    pub rate_limited: u64,
    pub not_found: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionCounts {
    pub accepted: u64,
    pub rejected: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;
    lower + (upper - lower) * index.fract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_status_buckets() {
        let collector = RequestMetrics::new();

        collector.request_completed(200, Duration::from_millis(5));
        collector.request_completed(404, Duration::from_millis(1));
        collector.request_completed(429, Duration::from_millis(1));
        collector.request_completed(400, Duration::from_millis(1));
        collector.request_completed(502, Duration::from_millis(30));

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.requests.total, 5);
        assert_eq!(snapshot.requests.not_found, 1);
        assert_eq!(snapshot.requests.rate_limited, 1);
        assert_eq!(snapshot.requests.client_errors, 3);
        assert_eq!(snapshot.requests.server_errors, 1);
        assert!(snapshot.requests.avg_response_time_ms > 7.0);
    }

    #[test]
    fn test_submission_counters() {
        let collector = RequestMetrics::new();
        collector.submission_accepted();
        collector.submission_rejected();
        collector.submission_rejected();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.submissions.accepted, 1);
        assert_eq!(snapshot.submissions.rejected, 2);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(RequestMetrics::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.request_completed(200, Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.get_metrics().requests.total, 1000);
    }

    #[test]
    fn test_response_samples_are_bounded() {
        let collector = RequestMetrics::new();
        for i in 0..1500 {
            collector.request_completed(200, Duration::from_millis(i));
        }
        assert_eq!(collector.response_times.lock().unwrap().len(), MAX_RESPONSE_SAMPLES);
        // only the newest 1000 samples (500..1500) remain
        assert!(collector.get_metrics().requests.avg_response_time_ms > 900.0);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert!((percentile(&data, 50.0) - 5.5).abs() < 0.1);
        assert!((percentile(&data, 100.0) - 10.0).abs() < 0.1);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = RequestMetrics::new();
        collector.request_completed(500, Duration::from_millis(2));
        collector.submission_accepted();

        collector.reset();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.requests.total, 0);
        assert_eq!(snapshot.requests.server_errors, 0);
        assert_eq!(snapshot.submissions.accepted, 0);
        assert_eq!(snapshot.requests.avg_response_time_ms, 0.0);
    }
}
