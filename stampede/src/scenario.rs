//! Scenario logic and configuration
use crate::controllers;
use crate::sampler::Sampler;
use stampede_core::{
    AbortReason, ConfigError, Iteration, LoadProfile, Options, RunMetrics, RunSummary,
    ScenarioConfig, Stage, Threshold,
};
use std::{
    future::Future,
    num::NonZeroU32,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Load test scenario structure
///
/// Handler for running scenarios. Not intended for manual creation, use the [`#[scenario]`](stampede_macros::scenario) macro which will add these methods to functions.
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<Pin<Box<dyn Future<Output = RunSummary> + Send>>>,
    config: ScenarioConfig,
}

impl<T> Scenario<T> {
    #[doc(hidden)]
    pub fn new(name: &str, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config: ScenarioConfig::new(name),
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }
}

impl<T, F> Future for Scenario<T>
where
    T: Fn(Iteration) -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    type Output = RunSummary;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.runner_fut.is_none() {
            let func = this.func.clone();
            let config = this.config.clone();
            *this.runner_fut = Some(Box::pin(async move { run_scenario(func, config).await }));
        }

        if let Some(runner) = this.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn stages(self, stages: &[Stage]) -> Self;
    fn stage(self, duration: Duration, target: usize) -> Self;
    fn start_vus(self, vus: usize) -> Self;
    fn constant_vus(self, vus: usize, duration: Duration) -> Self;
    fn threshold(self, threshold: Threshold) -> Self;
    fn graceful_stop(self, graceful_stop: Duration) -> Self;
    fn graceful_ramp_down(self, graceful_ramp_down: Duration) -> Self;
    fn rps(self, rps: NonZeroU32) -> Self;
    fn options(self, options: &Options) -> Result<Self, ConfigError>;
}

impl<T, F> ConfigurableScenario<RunSummary> for Scenario<T>
where
    T: Fn(Iteration) -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    /// Ramp through the given stages, replacing any previously configured profile.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .stages(&[
    ///             Stage::new(Duration::from_secs(60), 100),
    ///             Stage::new(Duration::from_secs(60), 0),
    ///         ])
    ///         .await;
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario(iteration: Iteration) {
    /// }
    /// ```
    fn stages(mut self, stages: &[Stage]) -> Self {
        let start_vus = match self.config.profile {
            LoadProfile::Ramping { start_vus, .. } => start_vus,
            LoadProfile::Constant { .. } => 0,
        };
        self.config.profile = LoadProfile::Ramping {
            start_vus,
            stages: stages.to_vec(),
        };
        self
    }

    /// Append a single stage to the ramping profile.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .stage(Duration::from_secs(30), 50)
    ///         .stage(Duration::from_secs(30), 0)
    ///         .await;
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn stage(mut self, duration: Duration, target: usize) -> Self {
        self.config.push_stage(Stage::new(duration, target));
        self
    }

    /// VUs active before the first stage starts ramping. Defaults to 0.
    fn start_vus(mut self, vus: usize) -> Self {
        match &mut self.config.profile {
            LoadProfile::Ramping { start_vus, .. } => *start_vus = vus,
            LoadProfile::Constant { .. } => {
                self.config.profile = LoadProfile::Ramping {
                    start_vus: vus,
                    stages: vec![],
                }
            }
        }
        self
    }

    /// Run a fixed number of VUs for the given duration.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .constant_vus(10, Duration::from_secs(120))
    ///         .await;
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn constant_vus(mut self, vus: usize, duration: Duration) -> Self {
        self.config.profile = LoadProfile::Constant { vus, duration };
        self
    }

    /// Add a pass/fail threshold evaluated over the whole run.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let summary = my_scenario()
    ///         .constant_vus(10, Duration::from_secs(120))
    ///         .threshold(Threshold::parse("http_req_failed", "rate<0.01").unwrap())
    ///         .await;
    ///     assert!(summary.passed());
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn threshold(mut self, threshold: Threshold) -> Self {
        self.config.thresholds.push(threshold);
        self
    }

    fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.config.graceful_stop = graceful_stop;
        self
    }

    fn graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.config.graceful_ramp_down = graceful_ramp_down;
        self
    }

    /// Cap the request rate across all VUs.
    fn rps(mut self, rps: NonZeroU32) -> Self {
        self.config.rps = Some(rps);
        self
    }

    /// Replace the whole configuration with parsed options, keeping the scenario name.
    fn options(mut self, options: &Options) -> Result<Self, ConfigError> {
        self.config = options.to_config(&self.config.name)?;
        Ok(self)
    }
}

#[instrument(name="scenario", skip_all, fields(name = %config.name))]
pub(crate) async fn run_scenario<T, F>(scenario: T, config: ScenarioConfig) -> RunSummary
where
    T: Fn(Iteration) -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    info!("Running {} with config {:?}", config.name, &config);

    let controller = controllers::controller(&config.profile);
    let mut sampler = Sampler::new(scenario, &config).await;
    let mut metrics = RunMetrics::new();
    let mut aborted = None;
    let abort_on_fail = config.has_abort_thresholds();

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut listen_for_interrupt = true;

    let start = Instant::now();

    // NOTE: This loop is time-sensitive. Any long awaits or blocking will throw off measurements
    loop {
        let elapsed = start.elapsed();
        sampler.set_concurrency(controller.target(elapsed));
        metrics.set_vus(sampler.concurrency());

        #[cfg(feature = "metrics")]
        metrics::gauge!("vus").set(sampler.concurrency() as f64);

        if controller.finished(elapsed) {
            break;
        }

        tokio::select! {
            sample = sampler.sample() => metrics.push(sample),
            res = &mut interrupt, if listen_for_interrupt => match res {
                Ok(()) => {
                    warn!("Interrupted, stopping the run.");
                    aborted = Some(AbortReason::Interrupted);
                    break;
                }
                Err(err) => {
                    warn!("Unable to listen for interrupts: {err}");
                    listen_for_interrupt = false;
                }
            },
        }

        if !abort_on_fail {
            continue;
        }
        if let Some(threshold) = config
            .thresholds
            .iter()
            .find(|t| t.should_abort(&metrics, start.elapsed()))
        {
            warn!("Threshold {threshold} crossed, aborting the run.");
            aborted = Some(AbortReason::Threshold(threshold.to_string()));
            break;
        }
    }

    debug!("Stopping {} VUs", sampler.concurrency());
    let allocated = sampler.allocated();
    let (sample, checks) = sampler.shutdown(config.graceful_stop).await;
    metrics.push(sample);

    let mut summary = RunSummary::new(
        &config.name,
        &metrics,
        checks,
        &config.thresholds,
        aborted,
    );
    summary.vus_max = allocated;

    if summary.passed() {
        info!("Scenario complete, all thresholds passed");
    } else {
        warn!("Scenario complete, thresholds failed");
    }

    summary
}
