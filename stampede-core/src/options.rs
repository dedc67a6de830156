use crate::{
    ConfigError, LoadProfile, ScenarioConfig, Stage, Threshold, DEFAULT_GRACEFUL_RAMP_DOWN,
    DEFAULT_GRACEFUL_STOP,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DeserializeAs, SerializeAs};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

/// `serde_with` adapter reading and writing durations as humantime strings (`"1m30s"`).
pub struct HumanDuration;

impl SerializeAs<Duration> for HumanDuration {
    fn serialize_as<S: Serializer>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDuration {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Workload options as written in an options file.
///
/// ```json
/// {
///   "stages": [{ "duration": "1m", "target": 100 }, { "duration": "1m", "target": 0 }],
///   "thresholds": {
///     "http_req_duration": ["p(95)<1000"],
///     "http_req_failed": [{ "threshold": "rate<0.05", "abortOnFail": true }]
///   }
/// }
/// ```
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Options {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
    #[serde(rename = "startVUs", skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<usize>,
    #[serde_as(as = "Option<HumanDuration>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, Vec<ThresholdOption>>,
    #[serde_as(as = "Option<HumanDuration>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graceful_stop: Option<Duration>,
    #[serde_as(as = "Option<HumanDuration>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graceful_ramp_down: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rps: Option<NonZeroU32>,
}

/// A threshold entry: either a bare expression or one with abort settings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdOption {
    Expr(String),
    #[serde(rename_all = "camelCase")]
    Detailed {
        threshold: String,
        #[serde(default)]
        abort_on_fail: bool,
        #[serde_as(as = "Option<HumanDuration>")]
        #[serde(skip_serializing_if = "Option::is_none")]
        delay_abort_eval: Option<Duration>,
    },
}

impl From<&str> for ThresholdOption {
    fn from(expr: &str) -> Self {
        ThresholdOption::Expr(expr.to_string())
    }
}

impl ThresholdOption {
    fn to_threshold(&self, metric: &str) -> Result<Threshold, ConfigError> {
        let threshold = match self {
            ThresholdOption::Expr(expr) => Threshold::parse(metric, expr)?,
            ThresholdOption::Detailed {
                threshold,
                abort_on_fail,
                delay_abort_eval,
            } => {
                let parsed = Threshold::parse(metric, threshold)?;
                if *abort_on_fail {
                    parsed.abort_on_fail(*delay_abort_eval)
                } else {
                    parsed
                }
            }
        };
        Ok(threshold)
    }
}

impl Options {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn threshold(mut self, metric: &str, expr: impl Into<ThresholdOption>) -> Self {
        self.thresholds
            .entry(metric.to_string())
            .or_default()
            .push(expr.into());
        self
    }

    /// Stages take precedence over `vus`/`duration`. Without stages a duration is required and
    /// `vus` defaults to 1.
    pub fn profile(&self) -> Result<LoadProfile, ConfigError> {
        if !self.stages.is_empty() {
            Ok(LoadProfile::Ramping {
                start_vus: self.start_vus.unwrap_or(0),
                stages: self.stages.clone(),
            })
        } else if let Some(duration) = self.duration {
            Ok(LoadProfile::Constant {
                vus: self.vus.unwrap_or(1),
                duration,
            })
        } else {
            Err(ConfigError::MissingProfile)
        }
    }

    pub fn thresholds(&self) -> Result<Vec<Threshold>, ConfigError> {
        self.thresholds
            .iter()
            .flat_map(|(metric, options)| options.iter().map(move |o| o.to_threshold(metric)))
            .collect()
    }

    pub fn to_config(&self, name: &str) -> Result<ScenarioConfig, ConfigError> {
        Ok(ScenarioConfig {
            name: name.to_string(),
            profile: self.profile()?,
            thresholds: self.thresholds()?,
            graceful_stop: self.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
            graceful_ramp_down: self.graceful_ramp_down.unwrap_or(DEFAULT_GRACEFUL_RAMP_DOWN),
            rps: self.rps,
        })
    }
}
