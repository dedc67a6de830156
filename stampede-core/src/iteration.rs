/// Identifies a single invocation of a scenario's action.
///
/// `vu` is 1-based and stable for the lifetime of a virtual user. `iteration` is 0-based and
/// counts the iterations that VU has started, including those before it was ramped down and
/// brought back, so a `(vu, iteration)` pair never repeats within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iteration {
    pub vu: u64,
    pub iteration: u64,
}

impl Iteration {
    pub const fn new(vu: u64, iteration: u64) -> Self {
        Self { vu, iteration }
    }
}
