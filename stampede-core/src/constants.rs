use std::time::Duration;

/// Interval at which the run loop adjusts the VU count and drains measurements.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// How long VUs get to finish their current iteration when the run ends.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// How long a VU removed by a ramp-down gets to finish its current iteration.
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);

/// Process exit code reported when at least one threshold failed.
pub const THRESHOLDS_FAILED_EXIT_CODE: u8 = 99;

/// Percentiles always reported for trend metrics in the summary.
pub const SUMMARY_PERCENTILES: [f64; 2] = [90., 95.];
