//! Observability for the registry service
//!
//! Structured logging setup and process-wide request metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{metrics, MetricsSnapshot, RequestMetrics};

// Span macros for structured logging
pub use logging::{request_span, store_span, submission_span};
