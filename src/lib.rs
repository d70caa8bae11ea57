//! Pairflow: chained file-processing pipelines for synthetic object-detection datasets.
//!
//! A [`Pipeline`] is an ordered list of [`Step`]s. Each step lists its input directories, pairs the
//! files with a [`PairingStrategy`], and calls its [`Transform`] once per argument tuple, either
//! sequentially or on a bounded worker pool. Every tuple ends up as exactly one [`LogEntry`].

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use engine::{CommandTransform, PairingFn, PairingStrategy, Transform};
pub use error::{PipelineError, StepError};
pub use pipeline::{Pipeline, Step, StepConfig, StepOutcome};
pub use utils::{CancelToken, PipelineSettings};

use log::debug;

/// Result alias for the ambient edges of the API (Ctrl+C wiring, log files).
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Run `pipeline` from step `from` (only that step when `only_one`) with Ctrl+C wired to cancellation.
///
/// Installs the console logger first (debug level when the settings file sets `verbose`) unless
/// the application already installed one. Pressing Ctrl+C stops new items from being submitted;
/// in-flight items finish, the rest are logged as pending and no further step starts.
pub fn run_interruptible(
    pipeline: &mut Pipeline,
    from: usize,
    only_one: bool,
) -> Result<Vec<StepOutcome>> {
    utils::setup_logging(utils::verbose_from(pipeline.settings()));
    let cancel = utils::install_ctrlc_handler()?;
    cancel.reset();
    debug!(
        "{} running {} step(s) from index {}",
        env!("CARGO_PKG_NAME"),
        if only_one { 1 } else { pipeline.len().saturating_sub(from) },
        from
    );
    let outcomes = pipeline.run_with_cancel(from, only_one, &cancel)?;
    if cancel.is_cancelled() {
        log::warn!("Run interrupted; partial logs were kept");
    }
    Ok(outcomes)
}
