use crate::{
    Aggregation, HumanDuration, Metric, MetricKind, RunMetrics, Threshold, ThresholdResult,
    SUMMARY_PERCENTILES, THRESHOLDS_FAILED_EXIT_CODE,
};
use serde::Serialize;
use serde_with::serde_as;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Pass/fail tally of a named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Why a run stopped before its profile finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// An `abortOnFail` threshold was crossed.
    Threshold(String),
    /// The process received an interrupt.
    Interrupted,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Threshold(threshold) => write!(f, "threshold {threshold} crossed"),
            AbortReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Result of a scenario run: aggregated metrics, checks and threshold outcomes.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    #[serde_as(as = "HumanDuration")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortReason>,
    pub vus_max: usize,
    pub metrics: BTreeMap<Metric, BTreeMap<String, f64>>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdResult>,
}

impl RunSummary {
    pub fn new(
        name: &str,
        metrics: &RunMetrics,
        checks: Vec<CheckSummary>,
        thresholds: &[Threshold],
        aborted: Option<AbortReason>,
    ) -> Self {
        let mut values: BTreeMap<Metric, BTreeMap<String, f64>> = BTreeMap::new();
        for metric in Metric::ALL {
            for aggregation in summary_aggregations(metric, thresholds) {
                if let Some(value) = metrics.value(metric, aggregation) {
                    values
                        .entry(metric)
                        .or_default()
                        .insert(aggregation.to_string(), value);
                }
            }
        }

        Self {
            name: name.to_string(),
            elapsed: metrics.elapsed,
            aborted,
            vus_max: metrics.vus_max,
            metrics: values,
            checks,
            thresholds: thresholds.iter().map(|t| t.evaluate(metrics)).collect(),
        }
    }

    /// An interrupted run is judged on what it measured; a threshold abort always fails.
    pub fn passed(&self) -> bool {
        !matches!(self.aborted, Some(AbortReason::Threshold(_)))
            && self.thresholds.iter().all(|t| t.passed)
    }

    pub fn exit_code(&self) -> u8 {
        if self.passed() {
            0
        } else {
            THRESHOLDS_FAILED_EXIT_CODE
        }
    }

    pub fn value(&self, metric: Metric, aggregation: &str) -> Option<f64> {
        self.metrics.get(&metric)?.get(aggregation).copied()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Default aggregations per metric kind, plus any percentile a threshold asks about.
fn summary_aggregations(metric: Metric, thresholds: &[Threshold]) -> Vec<Aggregation> {
    let mut aggregations = match metric.kind() {
        MetricKind::Trend => {
            let mut aggs = vec![
                Aggregation::Avg,
                Aggregation::Min,
                Aggregation::Med,
                Aggregation::Max,
            ];
            aggs.extend(SUMMARY_PERCENTILES.map(Aggregation::Percentile));
            aggs
        }
        MetricKind::Rate => vec![Aggregation::Rate],
        MetricKind::Counter => vec![Aggregation::Count, Aggregation::Rate],
        MetricKind::Gauge => vec![Aggregation::Value, Aggregation::Min, Aggregation::Max],
    };

    for threshold in thresholds.iter().filter(|t| t.metric == metric) {
        if !aggregations.contains(&threshold.expr.aggregation) {
            aggregations.push(threshold.expr.aggregation);
        }
    }

    aggregations
}

const NAME_WIDTH: usize = 32;

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "     scenario: {}", self.name)?;
        write!(
            f,
            "     duration: {}",
            humantime::format_duration(round_millis(self.elapsed))
        )?;
        match &self.aborted {
            Some(reason) => writeln!(f, " (aborted: {reason})")?,
            None => writeln!(f)?,
        }
        writeln!(f, "     vus_max:  {}", self.vus_max)?;
        writeln!(f)?;

        for check in &self.checks {
            let mark = if check.fails == 0 { '✓' } else { '✗' };
            write!(f, "     {mark} {}", check.name)?;
            if check.fails > 0 {
                let total = check.passes + check.fails;
                write!(
                    f,
                    "\n      ↳  {:.0}% ✓ {} / ✗ {}",
                    check.passes as f64 / total as f64 * 100.,
                    check.passes,
                    check.fails
                )?;
            }
            writeln!(f)?;
        }
        if !self.checks.is_empty() {
            writeln!(f)?;
        }

        for (metric, values) in &self.metrics {
            let results: Vec<_> = self
                .thresholds
                .iter()
                .filter(|t| t.metric == *metric)
                .collect();
            let mark = if results.is_empty() {
                ' '
            } else if results.iter().all(|t| t.passed) {
                '✓'
            } else {
                '✗'
            };

            let name = format!("{metric}");
            let dots = ".".repeat(NAME_WIDTH.saturating_sub(name.len()));
            let rendered: Vec<_> = values
                .iter()
                .map(|(agg, value)| format!("{agg}={}", render_value(*metric, agg, *value)))
                .collect();
            writeln!(f, "   {mark} {name}{dots}: {}", rendered.join(" "))?;

            for result in results {
                writeln!(
                    f,
                    "       {} {}",
                    if result.passed { '✓' } else { '✗' },
                    result.expr
                )?;
            }
        }

        Ok(())
    }
}

fn render_value(metric: Metric, aggregation: &str, value: f64) -> String {
    match (metric.kind(), aggregation) {
        (MetricKind::Trend, _) if value >= 1_000. => format!("{:.2}s", value / 1_000.),
        (MetricKind::Trend, _) => format!("{value:.2}ms"),
        (MetricKind::Rate, _) => format!("{:.2}%", value * 100.),
        (MetricKind::Counter, "rate") => format!("{value:.2}/s"),
        _ => format!("{value}"),
    }
}

fn round_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
