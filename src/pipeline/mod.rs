//! Pipeline components: steps, chaining and the run loop.

pub mod chain;
pub mod orchestrator;
pub mod step;

pub use chain::Pipeline;
pub use orchestrator::StepOutcome;
pub use step::{Step, StepConfig};
