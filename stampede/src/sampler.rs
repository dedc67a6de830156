mod task_atomics;
mod timer;
mod vu_pool;

use stampede_core::{CheckSummary, Iteration, SampleData, ScenarioConfig, SAMPLE_INTERVAL};
use std::future::Future;
use task_atomics::TaskAtomics;
use timer::Timer;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use vu_pool::VuPool;

/// Runs the VUs of a scenario and samples what they report on every tick.
pub(crate) struct Sampler<T> {
    pool: VuPool<T>,
    timer: Timer,
    task_atomics: TaskAtomics,
}

impl<T, F> Sampler<T>
where
    T: Fn(Iteration) -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub async fn new(scenario: T, config: &ScenarioConfig) -> Self {
        let task_atomics = TaskAtomics::new(config.rps);
        let pool = VuPool::new(
            scenario,
            task_atomics.clone_to_transaction_data(),
            config.graceful_ramp_down,
        );
        let timer = Timer::new(SAMPLE_INTERVAL).await;
        debug!("Sampling every {timer}");

        Self {
            pool,
            timer,
            task_atomics,
        }
    }

    pub fn set_concurrency(&mut self, concurrency: usize) {
        if concurrency != self.pool.concurrency() {
            trace!("VUs {} -> {concurrency}", self.pool.concurrency());
        }
        self.pool.set_concurrency(concurrency);
    }

    pub fn concurrency(&self) -> usize {
        self.pool.concurrency()
    }

    pub fn allocated(&self) -> usize {
        self.pool.allocated()
    }

    /// Waits for the next tick and drains everything reported since the previous one.
    pub async fn sample(&mut self) -> SampleData {
        let elapsed = self.timer.tick().await;
        self.task_atomics.collect(elapsed)
    }

    /// Stops all VUs and returns what was reported since the last tick along with the check
    /// tallies for the whole run.
    pub async fn shutdown(self, graceful_stop: std::time::Duration) -> (SampleData, Vec<CheckSummary>) {
        self.pool.shutdown(graceful_stop).await;
        let sample = self.task_atomics.collect(self.timer.since_last_tick());
        (sample, self.task_atomics.check_summaries())
    }
}
