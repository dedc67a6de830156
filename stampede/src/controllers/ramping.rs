use crate::controllers::Controller;
use stampede_core::Stage;
use std::time::Duration;
use tracing::trace;

/// Guards against `49.999..` flooring to 49 when the line sits exactly on an integer.
const EPSILON: f64 = 1e-9;

/// Linear interpolation between stage targets.
///
/// The target is floored so the active VU count never exceeds the line, and each stage lands
/// exactly on its target when its duration has elapsed. Zero-length stages jump immediately.
pub(crate) struct RampingController {
    start_vus: usize,
    stages: Vec<Stage>,
    duration: Duration,
}

impl RampingController {
    pub fn new(start_vus: usize, stages: Vec<Stage>) -> Self {
        let duration = stages.iter().map(|s| s.duration).sum();
        Self {
            start_vus,
            stages,
            duration,
        }
    }
}

impl Controller for RampingController {
    fn target(&self, elapsed: Duration) -> usize {
        let mut from = self.start_vus;
        let mut offset = Duration::ZERO;

        for stage in &self.stages {
            let end = offset + stage.duration;
            if elapsed < end {
                let progress = (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
                let target = interpolate(from, stage.target, progress);
                trace!("{from} -> {} at {progress:.3}: {target}", stage.target);
                return target;
            }
            from = stage.target;
            offset = end;
        }

        from
    }

    fn finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }
}

fn interpolate(from: usize, to: usize, progress: f64) -> usize {
    let exact = from as f64 + (to as f64 - from as f64) * progress;
    (exact + EPSILON).floor().max(0.) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn vote_profile() -> RampingController {
        RampingController::new(
            0,
            vec![
                Stage::new(secs(60.), 100),
                Stage::new(secs(180.), 500),
                Stage::new(secs(120.), 1000),
                Stage::new(secs(120.), 1000),
                Stage::new(secs(60.), 0),
            ],
        )
    }

    #[test]
    fn ramps_linearly() {
        let controller = vote_profile();
        assert_eq!(controller.target(secs(0.)), 0);
        assert_eq!(controller.target(secs(30.)), 50);
        assert_eq!(controller.target(secs(59.99)), 99);
        assert_eq!(controller.target(secs(60.)), 100);
        assert_eq!(controller.target(secs(150.)), 300);
        assert_eq!(controller.target(secs(300.)), 750);
        assert_eq!(controller.target(secs(400.)), 1000);
        assert_eq!(controller.target(secs(510.)), 500);
    }

    #[test]
    fn reaches_final_target_at_the_end() {
        let controller = RampingController::new(0, vec![Stage::new(secs(60.), 100)]);
        assert!(!controller.finished(secs(59.9)));
        assert!(controller.finished(secs(60.)));
        assert_eq!(controller.target(secs(60.)), 100);
        assert_eq!(controller.target(secs(90.)), 100);

        let controller = vote_profile();
        assert!(controller.finished(secs(540.)));
        assert_eq!(controller.target(secs(540.)), 0);
    }

    #[test]
    fn never_exceeds_the_line() {
        let controller = vote_profile();
        let stages = [(0., 0., 60., 100.), (60., 100., 240., 500.)];

        let mut t = 0.;
        while t < 240. {
            let (start, from, end, to) = stages
                .iter()
                .copied()
                .find(|(start, _, end, _)| t >= *start && t < *end)
                .unwrap();
            let line = from + (to - from) * (t - start) / (end - start);
            assert!(controller.target(secs(t)) as f64 <= line + 1e-6, "t = {t}");
            t += 0.1;
        }
    }

    #[test]
    fn ramp_down_uses_floor() {
        let controller = RampingController::new(10, vec![Stage::new(secs(10.), 0)]);
        assert_eq!(controller.target(secs(0.)), 10);
        assert_eq!(controller.target(secs(0.5)), 9);
        assert_eq!(controller.target(secs(9.99)), 0);
    }

    #[test]
    fn zero_length_stage_jumps() {
        let controller = RampingController::new(
            0,
            vec![Stage::new(Duration::ZERO, 20), Stage::new(secs(10.), 20)],
        );
        assert_eq!(controller.target(secs(0.)), 20);
        assert_eq!(controller.target(secs(5.)), 20);
    }

    #[test]
    fn empty_profile_is_finished() {
        let controller = RampingController::new(3, vec![]);
        assert!(controller.finished(Duration::ZERO));
        assert_eq!(controller.target(Duration::ZERO), 3);
    }
}
