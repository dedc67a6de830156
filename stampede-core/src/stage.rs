use crate::{ConfigError, HumanDuration};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One step of a ramping profile: move linearly from the previous target to `target` VUs over
/// `duration`.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde_as(as = "HumanDuration")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub const fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// Parses the `<duration>:<target>` shorthand, e.g. `1m30s:250`.
impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidStage(s.to_string()))?;

        let duration = humantime::parse_duration(duration.trim())?;
        let target = target
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidStage(s.to_string()))?;

        Ok(Self { duration, target })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shorthand() {
        let stage: Stage = "1m:100".parse().unwrap();
        assert_eq!(stage, Stage::new(Duration::from_secs(60), 100));

        let stage: Stage = " 2m 30s : 5 ".parse().unwrap();
        assert_eq!(stage, Stage::new(Duration::from_secs(150), 5));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "1m".parse::<Stage>(),
            Err(ConfigError::InvalidStage(_))
        ));
        assert!(matches!(
            "1m:-3".parse::<Stage>(),
            Err(ConfigError::InvalidStage(_))
        ));
        assert!(matches!(
            "soon:10".parse::<Stage>(),
            Err(ConfigError::Duration(_))
        ));
    }

    #[test]
    fn display_matches_shorthand() {
        let stage = Stage::new(Duration::from_secs(180), 500);
        assert_eq!(stage.to_string(), "3m:500");
        assert_eq!(stage.to_string().parse::<Stage>().unwrap(), stage);
    }

    #[test]
    fn json_uses_human_durations() {
        let stage: Stage = serde_json::from_str(r#"{"duration": "2m", "target": 1000}"#).unwrap();
        assert_eq!(stage, Stage::new(Duration::from_secs(120), 1000));

        let json = serde_json::to_value(stage).unwrap();
        assert_eq!(json, serde_json::json!({"duration": "2m", "target": 1000}));
    }
}
