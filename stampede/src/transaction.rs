use governor::DefaultDirectRateLimiter;
use metrics_util::AtomicBucket;
use stampede_core::CheckSummary;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::{Duration, Instant};

/// Transaction hook used by the `#[transaction]` macro. Not intended to be used manually.
pub async fn transaction_hook<T, R, E>(func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    if let Ok(hook) = TRANSACTION_HOOK.try_with(|v| v.clone()) {
        if let Some(limiter) = &hook.limiter {
            limiter.until_ready().await;
        }

        let start = Instant::now();
        let res = func.await;
        let elapsed = start.elapsed();

        hook.latency.push(elapsed);
        #[cfg(feature = "metrics")]
        metrics::histogram!("http_req_duration").record(elapsed.as_secs_f64() * 1e3);

        if res.is_ok() {
            hook.success.fetch_add(1, Ordering::Relaxed);
        } else {
            hook.error.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            metrics::counter!("http_req_failed").increment(1);
        }
        #[cfg(feature = "metrics")]
        metrics::counter!("http_reqs").increment(1);

        res
    } else {
        tracing::warn!("No hook available.");
        func.await
    }
}

/// Records a named check for the current iteration and hands back `passed`.
///
/// Checks never stop an iteration; they are tallied per name and feed the `checks` metric.
///
/// # Example
/// ```ignore
/// let accepted = check("status is 202", status == StatusCode::ACCEPTED);
/// ```
pub fn check(name: &str, passed: bool) -> bool {
    let res = TRANSACTION_HOOK.try_with(|hook| hook.checks.record(name, passed));
    if res.is_err() {
        tracing::warn!("No hook available for check `{name}`.");
    }

    #[cfg(feature = "metrics")]
    metrics::counter!("checks", "result" => if passed { "pass" } else { "fail" }).increment(1);

    passed
}

#[derive(Clone)]
pub(crate) struct TransactionData {
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub success: Arc<AtomicU64>,
    pub error: Arc<AtomicU64>,
    pub latency: Arc<AtomicBucket<Duration>>,
    pub iterations: Arc<AtomicU64>,
    pub iteration_duration: Arc<AtomicBucket<Duration>>,
    pub checks: Arc<Checks>,
}

impl TransactionData {
    pub fn record_iteration(&self, elapsed: Duration) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.iteration_duration.push(elapsed);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("iterations").increment(1);
            metrics::histogram!("iteration_duration").record(elapsed.as_secs_f64() * 1e3);
        }
    }
}

tokio::task_local! {
    pub(crate) static TRANSACTION_HOOK: TransactionData;
}

/// Check outcomes: windowed totals for sampling plus cumulative per-name tallies.
#[derive(Default)]
pub(crate) struct Checks {
    passed: AtomicU64,
    failed: AtomicU64,
    by_name: Mutex<BTreeMap<String, (u64, u64)>>,
}

impl Checks {
    pub fn record(&self, name: &str, passed: bool) {
        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let bump = |tally: &mut (u64, u64)| {
            if passed {
                tally.0 += 1;
            } else {
                tally.1 += 1;
            }
        };

        let mut by_name = self.by_name.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tally) = by_name.get_mut(name) {
            bump(tally);
        } else {
            bump(by_name.entry(name.to_string()).or_default());
        }
    }

    /// Returns and resets the `(passed, failed)` totals since the last call.
    pub fn take_totals(&self) -> (u64, u64) {
        (
            self.passed.swap(0, Ordering::Relaxed),
            self.failed.swap(0, Ordering::Relaxed),
        )
    }

    pub fn summaries(&self) -> Vec<CheckSummary> {
        self.by_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, (passes, fails))| CheckSummary {
                name: name.clone(),
                passes: *passes,
                fails: *fails,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction_data() -> TransactionData {
        TransactionData {
            limiter: None,
            success: Arc::new(AtomicU64::new(0)),
            error: Arc::new(AtomicU64::new(0)),
            latency: Arc::new(AtomicBucket::new()),
            iterations: Arc::new(AtomicU64::new(0)),
            iteration_duration: Arc::new(AtomicBucket::new()),
            checks: Arc::new(Checks::default()),
        }
    }

    #[tokio::test]
    async fn hook_counts_outcomes() {
        let data = transaction_data();
        TRANSACTION_HOOK
            .scope(data.clone(), async {
                let _ = transaction_hook(async { Ok::<_, ()>(()) }).await;
                let _ = transaction_hook(async { Ok::<_, ()>(()) }).await;
                let res = transaction_hook(async { Err::<(), _>("refused") }).await;
                assert_eq!(res, Err("refused"));
            })
            .await;

        assert_eq!(data.success.load(Ordering::Relaxed), 2);
        assert_eq!(data.error.load(Ordering::Relaxed), 1);
        assert_eq!(data.latency.data().len(), 3);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn hook_without_scope_passes_through() {
        let res = transaction_hook(async { Ok::<_, ()>(7) }).await;
        assert_eq!(res, Ok(7));
        assert!(logs_contain("No hook available."));
    }

    #[tokio::test]
    async fn checks_are_tallied_by_name() {
        let data = transaction_data();
        TRANSACTION_HOOK
            .scope(data.clone(), async {
                assert!(check("status is 202", true));
                assert!(check("status is 202", true));
                assert!(!check("status is 202", false));
                assert!(check("has vote id", true));
            })
            .await;

        assert_eq!(data.checks.take_totals(), (3, 1));
        assert_eq!(data.checks.take_totals(), (0, 0));
        assert_eq!(
            data.checks.summaries(),
            vec![
                CheckSummary {
                    name: "has vote id".to_string(),
                    passes: 1,
                    fails: 0,
                },
                CheckSummary {
                    name: "status is 202".to_string(),
                    passes: 2,
                    fails: 1,
                },
            ]
        );
    }
}
