use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("threshold `{0}` has no comparison operator")]
    MissingOperator(String),

    #[error("unknown aggregation `{0}`")]
    UnknownAggregation(String),

    #[error("invalid percentile `{0}`, expected a value between 0 and 100")]
    InvalidPercentile(String),

    #[error("invalid threshold value `{0}`")]
    InvalidValue(String),

    #[error("aggregation `{aggregation}` is not available on {kind} metric `{metric}`")]
    Unsupported {
        metric: String,
        kind: String,
        aggregation: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no load profile configured, provide stages or a duration")]
    MissingProfile,

    #[error("invalid stage `{0}`, expected <duration>:<target>")]
    InvalidStage(String),

    #[error("invalid duration: {0}")]
    Duration(#[from] humantime::DurationError),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("unable to read options: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to parse options: {0}")]
    Json(#[from] serde_json::Error),
}
