use crate::{Stage, Threshold, DEFAULT_GRACEFUL_RAMP_DOWN, DEFAULT_GRACEFUL_STOP};
use std::num::NonZeroU32;
use std::time::Duration;

/// How the number of active VUs evolves over a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProfile {
    /// Linear ramps between stage targets, starting from `start_vus`.
    Ramping {
        start_vus: usize,
        stages: Vec<Stage>,
    },
    /// A fixed number of VUs for a fixed duration.
    Constant { vus: usize, duration: Duration },
}

impl Default for LoadProfile {
    fn default() -> Self {
        LoadProfile::Ramping {
            start_vus: 0,
            stages: vec![],
        }
    }
}

impl LoadProfile {
    pub fn duration(&self) -> Duration {
        match self {
            LoadProfile::Ramping { stages, .. } => stages.iter().map(|s| s.duration).sum(),
            LoadProfile::Constant { duration, .. } => *duration,
        }
    }

    pub fn max_vus(&self) -> usize {
        match self {
            LoadProfile::Ramping { start_vus, stages } => stages
                .iter()
                .map(|s| s.target)
                .fold(*start_vus, usize::max),
            LoadProfile::Constant { vus, .. } => *vus,
        }
    }
}

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub name: String,
    pub profile: LoadProfile,
    pub thresholds: Vec<Threshold>,
    pub graceful_stop: Duration,
    pub graceful_ramp_down: Duration,
    pub rps: Option<NonZeroU32>,
}

impl ScenarioConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            profile: LoadProfile::default(),
            thresholds: vec![],
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
            rps: None,
        }
    }

    /// Adds a stage, switching the profile to a ramping one if needed.
    pub fn push_stage(&mut self, stage: Stage) {
        match &mut self.profile {
            LoadProfile::Ramping { stages, .. } => stages.push(stage),
            LoadProfile::Constant { .. } => {
                self.profile = LoadProfile::Ramping {
                    start_vus: 0,
                    stages: vec![stage],
                }
            }
        }
    }

    pub fn has_abort_thresholds(&self) -> bool {
        self.thresholds.iter().any(|t| t.abort_on_fail)
    }
}
