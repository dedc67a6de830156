mod config;
mod constants;
mod data;
mod error;
mod iteration;
mod metric;
mod options;
mod stage;
mod stats;
mod threshold;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use iteration::*;
pub use metric::*;
pub use options::*;
pub use stage::*;
pub use stats::*;
pub use threshold::*;
