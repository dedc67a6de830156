use crate::transaction::{Checks, TransactionData};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics_util::AtomicBucket;
use stampede_core::{CheckSummary, SampleData};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters shared by every VU task, drained once per tick.
pub(crate) struct TaskAtomics {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    success: Arc<AtomicU64>,
    error: Arc<AtomicU64>,
    latency: Arc<AtomicBucket<Duration>>,
    iterations: Arc<AtomicU64>,
    iteration_duration: Arc<AtomicBucket<Duration>>,
    checks: Arc<Checks>,
}

impl TaskAtomics {
    pub fn new(rps: Option<NonZeroU32>) -> Self {
        Self {
            limiter: rps.map(|rps| Arc::new(rate_limiter(rps))),
            success: Arc::new(AtomicU64::new(0)),
            error: Arc::new(AtomicU64::new(0)),
            latency: Arc::new(AtomicBucket::new()),
            iterations: Arc::new(AtomicU64::new(0)),
            iteration_duration: Arc::new(AtomicBucket::new()),
            checks: Arc::new(Checks::default()),
        }
    }

    pub fn clone_to_transaction_data(&self) -> TransactionData {
        TransactionData {
            limiter: self.limiter.clone(),
            success: self.success.clone(),
            error: self.error.clone(),
            latency: self.latency.clone(),
            iterations: self.iterations.clone(),
            iteration_duration: self.iteration_duration.clone(),
            checks: self.checks.clone(),
        }
    }

    pub fn collect(&self, elapsed: Duration) -> SampleData {
        let (checks_passed, checks_failed) = self.checks.take_totals();
        let mut sample = SampleData {
            success_count: self.success.swap(0, Ordering::Relaxed),
            error_count: self.error.swap(0, Ordering::Relaxed),
            iterations: self.iterations.swap(0, Ordering::Relaxed),
            checks_passed,
            checks_failed,
            elapsed,
            ..Default::default()
        };

        self.latency
            .clear_with(|dur| sample.latencies.extend_from_slice(dur));
        self.iteration_duration
            .clear_with(|dur| sample.iteration_durations.extend_from_slice(dur));

        sample
    }

    pub fn check_summaries(&self) -> Vec<CheckSummary> {
        self.checks.summaries()
    }
}

fn rate_limiter(rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rps).allow_burst(NonZeroU32::MIN))
}
