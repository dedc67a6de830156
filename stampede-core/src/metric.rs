use crate::ThresholdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Built-in metrics collected for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Time spent in each transaction, in milliseconds.
    HttpReqDuration,
    /// Fraction of transactions that returned an error.
    HttpReqFailed,
    /// Number of transactions.
    HttpReqs,
    /// Fraction of checks that passed.
    Checks,
    /// Number of completed iterations.
    Iterations,
    /// Time spent in each full iteration, in milliseconds.
    IterationDuration,
    /// Number of active virtual users.
    Vus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Trend,
    Rate,
    Counter,
    Gauge,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Checks,
        Metric::HttpReqDuration,
        Metric::HttpReqFailed,
        Metric::HttpReqs,
        Metric::IterationDuration,
        Metric::Iterations,
        Metric::Vus,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::HttpReqDuration => "http_req_duration",
            Metric::HttpReqFailed => "http_req_failed",
            Metric::HttpReqs => "http_reqs",
            Metric::Checks => "checks",
            Metric::Iterations => "iterations",
            Metric::IterationDuration => "iteration_duration",
            Metric::Vus => "vus",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::HttpReqDuration | Metric::IterationDuration => MetricKind::Trend,
            Metric::HttpReqFailed | Metric::Checks => MetricKind::Rate,
            Metric::HttpReqs | Metric::Iterations => MetricKind::Counter,
            Metric::Vus => MetricKind::Gauge,
        }
    }
}

impl FromStr for Metric {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == s.trim())
            .ok_or_else(|| ThresholdError::UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Trend => "trend",
            MetricKind::Rate => "rate",
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        };
        f.write_str(name)
    }
}
