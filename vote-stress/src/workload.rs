use stampede::{Options, Stage};
use std::time::Duration;

/// Where votes are sent unless told otherwise.
pub const DEFAULT_TARGET: &str = "http://host.docker.internal:8080/api/v1/vote";

const fn mins(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

/// The vote stress profile.
///
/// Ramps to 100 VUs over a minute, to 500 over three, to 1000 over two, holds 1000 for two
/// minutes and ramps down to zero over the last minute. The run fails if the 95th percentile
/// request duration reaches one second or 5% of requests fail.
pub fn vote_workload() -> Options {
    Options {
        stages: vec![
            Stage::new(mins(1), 100),
            Stage::new(mins(3), 500),
            Stage::new(mins(2), 1000),
            Stage::new(mins(2), 1000),
            Stage::new(mins(1), 0),
        ],
        ..Default::default()
    }
    .threshold("http_req_duration", "p(95)<1000")
    .threshold("http_req_failed", "rate<0.05")
}
