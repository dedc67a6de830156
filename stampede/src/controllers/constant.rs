use crate::controllers::Controller;
use std::time::Duration;

pub(crate) struct ConstantController {
    vus: usize,
    duration: Duration,
}

impl ConstantController {
    pub fn new(vus: usize, duration: Duration) -> Self {
        Self { vus, duration }
    }
}

impl Controller for ConstantController {
    fn target(&self, _elapsed: Duration) -> usize {
        self.vus
    }

    fn finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }
}
