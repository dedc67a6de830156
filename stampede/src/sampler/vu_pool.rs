use crate::transaction::{TransactionData, TRANSACTION_HOOK};
use stampede_core::Iteration;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

struct Vu {
    id: u64,
    next_iteration: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Vu {
    fn retire(self, deadline: Instant) -> RetiringVu {
        self.stop.store(true, Ordering::Relaxed);
        RetiringVu { vu: self, deadline }
    }
}

struct RetiringVu {
    vu: Vu,
    deadline: Instant,
}

/// Owns the VU tasks of a run.
///
/// VU ids are 1-based. A stopped VU's id and iteration counter are kept and handed to the next
/// VU spawned, lowest id first, so ids stay dense and `(vu, iteration)` pairs never repeat.
pub(crate) struct VuPool<T> {
    scenario: T,
    data: TransactionData,
    active: Vec<Vu>,
    retiring: Vec<RetiringVu>,
    idle: BTreeMap<u64, Arc<AtomicU64>>,
    allocated: u64,
    graceful_ramp_down: Duration,
}

impl<T, F> VuPool<T>
where
    T: Fn(Iteration) -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(scenario: T, data: TransactionData, graceful_ramp_down: Duration) -> Self {
        Self {
            scenario,
            data,
            active: vec![],
            retiring: vec![],
            idle: BTreeMap::new(),
            allocated: 0,
            graceful_ramp_down,
        }
    }

    pub fn set_concurrency(&mut self, concurrency: usize) {
        self.reap();

        if self.active.len() > concurrency {
            let deadline = Instant::now() + self.graceful_ramp_down;
            for vu in self.active.drain(concurrency..) {
                trace!("Retiring VU {}", vu.id);
                self.retiring.push(vu.retire(deadline));
            }
        }

        while self.active.len() < concurrency {
            let vu = self.spawn();
            self.active.push(vu);
        }
    }

    /// Number of VUs running iterations, not counting those finishing after a ramp-down.
    pub fn concurrency(&self) -> usize {
        self.active.len()
    }

    /// Highest number of VUs ever allocated.
    pub fn allocated(&self) -> usize {
        self.allocated as usize
    }

    /// Stops every VU, aborting those still mid-iteration once `graceful_stop` has passed.
    pub async fn shutdown(mut self, graceful_stop: Duration) {
        let deadline = Instant::now() + graceful_stop;
        for vu in std::mem::take(&mut self.active) {
            self.retiring.push(vu.retire(deadline));
        }

        let mut interrupted = 0;
        for RetiringVu {
            mut vu,
            deadline: ramp_down,
        } in self.retiring.drain(..)
        {
            if timeout_at(deadline.min(ramp_down), &mut vu.handle)
                .await
                .is_err()
            {
                vu.handle.abort();
                interrupted += 1;
            }
        }

        if interrupted > 0 {
            warn!("{interrupted} VUs were still running after the graceful stop and were interrupted.");
        }
    }

    fn spawn(&mut self) -> Vu {
        let (id, next_iteration) = match self.idle.pop_first() {
            Some(slot) => slot,
            None => {
                self.allocated += 1;
                (self.allocated, Arc::new(AtomicU64::new(0)))
            }
        };
        trace!("Starting VU {id}");

        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(
            TRANSACTION_HOOK
                .scope(
                    self.data.clone(),
                    vu_loop(
                        self.scenario.clone(),
                        self.data.clone(),
                        id,
                        next_iteration.clone(),
                        stop.clone(),
                    ),
                )
                .in_current_span(),
        );

        Vu {
            id,
            next_iteration,
            stop,
            handle,
        }
    }

    /// Returns the ids of finished VUs to the idle set.
    fn reap(&mut self) {
        let now = Instant::now();
        let mut still_retiring = Vec::with_capacity(self.retiring.len());
        for retiring in self.retiring.drain(..) {
            if retiring.vu.handle.is_finished() {
                self.idle
                    .insert(retiring.vu.id, retiring.vu.next_iteration);
            } else if retiring.deadline <= now {
                debug!("VU {} exceeded the graceful ramp-down, aborting.", retiring.vu.id);
                retiring.vu.handle.abort();
                still_retiring.push(retiring);
            } else {
                still_retiring.push(retiring);
            }
        }
        self.retiring = still_retiring;

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|vu| vu.handle.is_finished());
        for vu in finished {
            error!("VU {} stopped unexpectedly (did the scenario panic?)", vu.id);
            self.idle.insert(vu.id, vu.next_iteration);
        }
        self.active = running;
    }
}

async fn vu_loop<T, F>(
    scenario: T,
    data: TransactionData,
    vu: u64,
    next_iteration: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
) where
    T: Fn(Iteration) -> F,
    F: Future<Output = ()>,
{
    while !stop.load(Ordering::Relaxed) {
        let iteration = Iteration::new(vu, next_iteration.fetch_add(1, Ordering::Relaxed));
        let start = Instant::now();
        scenario(iteration).await;
        data.record_iteration(start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::task_atomics::TaskAtomics;
    use std::collections::HashSet;
    use std::pin::Pin;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<Iteration>>>;
    type BoxedIteration = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn pool(
        seen: &Seen,
        delay: Duration,
        ramp_down: Duration,
    ) -> VuPool<impl Fn(Iteration) -> BoxedIteration + Send + Sync + Clone + 'static> {
        let seen = seen.clone();
        let scenario = move |iteration| {
            let seen = seen.clone();
            Box::pin(async move {
                seen.lock().unwrap().push(iteration);
                tokio::time::sleep(delay).await;
            }) as BoxedIteration
        };

        let atomics = TaskAtomics::new(None);
        VuPool::new(scenario, atomics.clone_to_transaction_data(), ramp_down)
    }

    #[tokio::test]
    async fn spawns_and_retires() {
        let seen = Seen::default();
        let mut pool = pool(&seen, Duration::from_millis(5), Duration::from_secs(1));

        pool.set_concurrency(5);
        assert_eq!(pool.concurrency(), 5);
        assert_eq!(pool.allocated(), 5);
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.set_concurrency(2);
        assert_eq!(pool.concurrency(), 2);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let vus: HashSet<_> = seen.lock().unwrap().iter().map(|i| i.vu).collect();
        assert_eq!(vus, HashSet::from([1, 2, 3, 4, 5]));

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn reused_vus_continue_their_iterations() {
        let seen = Seen::default();
        let mut pool = pool(&seen, Duration::from_millis(2), Duration::from_secs(1));

        pool.set_concurrency(3);
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.set_concurrency(0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.set_concurrency(3);
        assert_eq!(pool.allocated(), 3);
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.shutdown(Duration::from_secs(1)).await;

        let seen = seen.lock().unwrap();
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len(), "(vu, iteration) pairs repeated");
        assert!(seen.iter().all(|i| (1..=3).contains(&i.vu)));
    }

    #[tokio::test]
    async fn graceful_stop_interrupts_slow_iterations() {
        let seen = Seen::default();
        let mut pool = pool(&seen, Duration::from_secs(60), Duration::from_secs(60));

        pool.set_concurrency(4);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let start = Instant::now();
        pool.shutdown(Duration::from_millis(50)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn ramp_down_deadline_aborts_stragglers() {
        let seen = Seen::default();
        let mut pool = pool(&seen, Duration::from_secs(60), Duration::from_millis(10));

        pool.set_concurrency(2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.set_concurrency(0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Past the deadline: aborted now, reaped on the next call.
        pool.set_concurrency(0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.set_concurrency(1);

        assert_eq!(pool.allocated(), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown(Duration::from_millis(10)).await;

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&Iteration::new(1, 1)));
    }
}
