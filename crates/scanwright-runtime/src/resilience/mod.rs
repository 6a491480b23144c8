//! Resilience patterns for scanwright-runtime.
//!
//! This module provides:
//! - Transport retries with exponential backoff
//! - The static-fallback choice for the next probe
//! - Judge usage accounting

mod fallback;
mod retry;
mod usage;

pub use fallback::{choose_next_probe, FallbackReason, NextProbe};
pub use retry::{with_transport_retries, RetryPolicy};
pub use usage::{JudgeUsage, UsageTracker};
