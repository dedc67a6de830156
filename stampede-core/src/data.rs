use crate::{Aggregation, Metric};
use hdrhistogram::Histogram;
use std::time::Duration;
use tracing::warn;

/// Latencies are recorded in microseconds, up to an hour, with 3 significant figures.
const HISTOGRAM_MAX_MICROS: u64 = 3_600_000_000;
const HISTOGRAM_SIGFIGS: u8 = 3;

/// Everything the VUs reported during a single sampling tick.
#[derive(Debug, Clone, Default)]
pub struct SampleData {
    pub success_count: u64,
    pub error_count: u64,
    pub latencies: Vec<Duration>,
    pub iterations: u64,
    pub iteration_durations: Vec<Duration>,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub elapsed: Duration,
}

impl SampleData {
    pub fn total(&self) -> u64 {
        self.success_count + self.error_count
    }
}

/// Running distribution of a duration metric, reported in milliseconds.
///
/// Quantiles come from an HDR histogram and are within 0.1% of the recorded value; count, sum,
/// min and max are exact.
#[derive(Debug, Clone)]
pub struct Trend {
    histogram: Histogram<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Trend {
    fn default() -> Self {
        Self::new()
    }
}

impl Trend {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new_with_bounds(1, HISTOGRAM_MAX_MICROS, HISTOGRAM_SIGFIGS)
                .expect("histogram bounds are valid"),
            count: 0,
            sum: 0.,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn insert(&mut self, value: Duration) {
        let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
        if micros > HISTOGRAM_MAX_MICROS {
            warn!(
                "Duration of {} exceeds the trackable range, recording it as {}.",
                humantime::format_duration(value),
                humantime::format_duration(Duration::from_micros(HISTOGRAM_MAX_MICROS))
            );
        }
        self.histogram.saturating_record(micros);

        let ms = value.as_nanos() as f64 / 1e6;
        self.count += 1;
        self.sum += ms;
        self.min = self.min.min(ms);
        self.max = self.max.max(ms);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn med(&self) -> Option<f64> {
        self.quantile(0.5)
    }

    /// `quantile` is in `[0, 1]`. Nearest rank: the smallest recorded value with at least
    /// `quantile` of the samples at or below it.
    pub fn quantile(&self, quantile: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        let micros = self.histogram.value_at_quantile(quantile.clamp(0., 1.));
        Some((micros as f64 / 1e3).clamp(self.min, self.max))
    }

    pub fn value(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Avg => self.avg(),
            Aggregation::Min => self.min(),
            Aggregation::Max => self.max(),
            Aggregation::Med => self.med(),
            Aggregation::Percentile(p) => self.quantile(p / 100.),
            _ => None,
        }
    }
}

/// Cumulative metrics for a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub http_req_duration: Trend,
    pub iteration_duration: Trend,
    pub http_reqs: u64,
    pub http_req_failed: u64,
    pub iterations: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub vus: usize,
    pub vus_min: Option<usize>,
    pub vus_max: usize,
    pub elapsed: Duration,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: SampleData) {
        self.http_reqs += sample.total();
        self.http_req_failed += sample.error_count;
        self.iterations += sample.iterations;
        self.checks_passed += sample.checks_passed;
        self.checks_failed += sample.checks_failed;
        self.elapsed += sample.elapsed;

        for latency in sample.latencies {
            self.http_req_duration.insert(latency);
        }
        for duration in sample.iteration_durations {
            self.iteration_duration.insert(duration);
        }
    }

    pub fn set_vus(&mut self, vus: usize) {
        self.vus = vus;
        self.vus_min = Some(self.vus_min.map_or(vus, |min| min.min(vus)));
        self.vus_max = self.vus_max.max(vus);
    }

    pub fn failure_rate(&self) -> Option<f64> {
        rate(self.http_req_failed, self.http_reqs)
    }

    pub fn checks_rate(&self) -> Option<f64> {
        rate(self.checks_passed, self.checks_passed + self.checks_failed)
    }

    /// Reduces `metric` with `aggregation`, or `None` when there is nothing to reduce.
    pub fn value(&self, metric: Metric, aggregation: Aggregation) -> Option<f64> {
        match (metric, aggregation) {
            (Metric::HttpReqDuration, agg) => self.http_req_duration.value(agg),
            (Metric::IterationDuration, agg) => self.iteration_duration.value(agg),
            (Metric::HttpReqFailed, Aggregation::Rate) => self.failure_rate(),
            (Metric::Checks, Aggregation::Rate) => self.checks_rate(),
            (Metric::HttpReqs, Aggregation::Count) => Some(self.http_reqs as f64),
            (Metric::HttpReqs, Aggregation::Rate) => self.per_second(self.http_reqs),
            (Metric::Iterations, Aggregation::Count) => Some(self.iterations as f64),
            (Metric::Iterations, Aggregation::Rate) => self.per_second(self.iterations),
            (Metric::Vus, Aggregation::Value) => Some(self.vus as f64),
            (Metric::Vus, Aggregation::Min) => self.vus_min.map(|v| v as f64),
            (Metric::Vus, Aggregation::Max) => Some(self.vus_max as f64),
            _ => None,
        }
    }

    fn per_second(&self, count: u64) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.).then(|| count as f64 / secs)
    }
}

fn rate(hits: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| hits as f64 / total as f64)
}
