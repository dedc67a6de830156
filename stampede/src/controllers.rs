mod constant;
mod ramping;

pub(crate) use constant::ConstantController;
pub(crate) use ramping::RampingController;

use stampede_core::LoadProfile;
use std::time::Duration;

/// Decides how many VUs should be active at a given point of the run.
pub(crate) trait Controller: Send {
    fn target(&self, elapsed: Duration) -> usize;
    fn finished(&self, elapsed: Duration) -> bool;
}

pub(crate) fn controller(profile: &LoadProfile) -> Box<dyn Controller> {
    match profile {
        LoadProfile::Ramping { start_vus, stages } => {
            Box::new(RampingController::new(*start_vus, stages.clone()))
        }
        LoadProfile::Constant { vus, duration } => {
            Box::new(ConstantController::new(*vus, *duration))
        }
    }
}
