use crate::{Metric, MetricKind, RunMetrics, ThresholdError};
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a metric's samples are reduced to the single number a threshold compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
    Rate,
    Count,
    Value,
}

impl Aggregation {
    fn supported_by(&self, kind: MetricKind) -> bool {
        use Aggregation::*;
        match kind {
            MetricKind::Trend => matches!(self, Avg | Min | Max | Med | Percentile(_)),
            MetricKind::Rate => matches!(self, Rate),
            MetricKind::Counter => matches!(self, Count | Rate),
            MetricKind::Gauge => matches!(self, Value | Min | Max),
        }
    }
}

impl FromStr for Aggregation {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let agg = match s {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            "rate" => Aggregation::Rate,
            "count" => Aggregation::Count,
            "value" => Aggregation::Value,
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|s| s.strip_suffix(')'))
                    .ok_or_else(|| ThresholdError::UnknownAggregation(s.to_string()))?;
                let percentile: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| ThresholdError::InvalidPercentile(inner.to_string()))?;
                if !(0. ..=100.).contains(&percentile) {
                    return Err(ThresholdError::InvalidPercentile(inner.to_string()));
                }
                Aggregation::Percentile(percentile)
            }
        };
        Ok(agg)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
            Aggregation::Value => f.write_str("value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // NOTE: Two-character operators must be matched first.
    const OPERATORS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }

    fn symbol(&self) -> &'static str {
        Self::OPERATORS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(symbol, _)| *symbol)
            .unwrap_or("?")
    }
}

/// A parsed threshold predicate such as `p(95)<1000` or `rate<0.05`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub value: f64,
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let idx = s
            .find(&['<', '>', '=', '!'][..])
            .ok_or_else(|| ThresholdError::MissingOperator(s.to_string()))?;
        let (lhs, rest) = s.split_at(idx);

        let (symbol, comparison) = Comparison::OPERATORS
            .iter()
            .find(|(symbol, _)| rest.starts_with(symbol))
            .ok_or_else(|| ThresholdError::MissingOperator(s.to_string()))?;

        let rhs = rest[symbol.len()..].trim();
        let value = rhs
            .parse()
            .map_err(|_| ThresholdError::InvalidValue(rhs.to_string()))?;

        Ok(Self {
            aggregation: lhs.parse()?,
            comparison: *comparison,
            value,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.aggregation,
            self.comparison.symbol(),
            self.value
        )
    }
}

/// A pass/fail predicate over one metric, evaluated against the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub expr: ThresholdExpr,
    /// Stop the run as soon as this threshold is crossed.
    pub abort_on_fail: bool,
    /// Do not abort before the run has been going for this long.
    pub delay_abort_eval: Option<Duration>,
}

impl Threshold {
    pub fn new(metric: Metric, expr: ThresholdExpr) -> Result<Self, ThresholdError> {
        if !expr.aggregation.supported_by(metric.kind()) {
            return Err(ThresholdError::Unsupported {
                metric: metric.to_string(),
                kind: metric.kind().to_string(),
                aggregation: expr.aggregation.to_string(),
            });
        }

        Ok(Self {
            metric,
            expr,
            abort_on_fail: false,
            delay_abort_eval: None,
        })
    }

    pub fn parse(metric: &str, expr: &str) -> Result<Self, ThresholdError> {
        Self::new(metric.parse()?, expr.parse()?)
    }

    pub fn abort_on_fail(mut self, delay: Option<Duration>) -> Self {
        self.abort_on_fail = true;
        self.delay_abort_eval = delay;
        self
    }

    /// Metrics with no samples yet pass.
    pub fn evaluate(&self, metrics: &RunMetrics) -> ThresholdResult {
        let observed = metrics.value(self.metric, self.expr.aggregation);
        let passed = observed
            .map(|value| self.expr.comparison.holds(value, self.expr.value))
            .unwrap_or(true);

        ThresholdResult {
            metric: self.metric,
            expr: self.expr,
            observed,
            passed,
        }
    }

    /// Whether this threshold should stop a run that has been going for `elapsed`.
    pub fn should_abort(&self, metrics: &RunMetrics, elapsed: Duration) -> bool {
        if !self.abort_on_fail {
            return false;
        }

        if let Some(delay) = self.delay_abort_eval {
            if elapsed < delay {
                return false;
            }
        }

        !self.evaluate(metrics).passed
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expr)?;
        if self.abort_on_fail {
            write!(f, " (abort on fail")?;
            if let Some(delay) = self.delay_abort_eval {
                write!(f, " after {}", humantime::format_duration(delay))?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdResult {
    pub metric: Metric,
    #[serde_as(as = "DisplayFromStr")]
    pub expr: ThresholdExpr,
    pub observed: Option<f64>,
    pub passed: bool,
}
