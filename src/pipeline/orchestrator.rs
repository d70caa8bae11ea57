use log::{error, info, warn};

use crate::error::{PipelineError, StepError};
use crate::pipeline::chain::Pipeline;
use crate::types::StepSummary;
use crate::utils::cancel::CancelToken;
use crate::utils::config::PackagePaths;

/// What happened to one selected step.
#[derive(Debug)]
pub enum StepOutcome {
    Completed(StepSummary),
    /// Precondition failure; the step processed nothing.
    Failed { step: String, error: StepError },
}

impl StepOutcome {
    pub fn summary(&self) -> Option<&StepSummary> {
        match self {
            StepOutcome::Completed(s) => Some(s),
            StepOutcome::Failed { .. } => None,
        }
    }
}

impl Pipeline {
    /// Run steps from `from`, or only that step when `only_one`. See [`Pipeline::run_with_cancel`].
    pub fn run(&mut self, from: usize, only_one: bool) -> Result<Vec<StepOutcome>, PipelineError> {
        self.run_with_cancel(from, only_one, &CancelToken::new())
    }

    /// Run the selected steps in order.
    ///
    /// An out-of-range `from` fails before anything runs. A step that fails its preconditions is
    /// logged and recorded as [`StepOutcome::Failed`]; the next step still runs. Cancellation stops
    /// the pipeline after the current step.
    pub fn run_with_cancel(
        &mut self,
        from: usize,
        only_one: bool,
        cancel: &CancelToken,
    ) -> Result<Vec<StepOutcome>, PipelineError> {
        let len = self.steps.len();
        if from >= len {
            return Err(PipelineError::StartIndexOutOfRange { index: from, len });
        }
        let end = if only_one { from + 1 } else { len };

        let mut outcomes = Vec::with_capacity(end - from);
        for i in from..end {
            if cancel.is_cancelled() {
                warn!("Pipeline cancelled before step {i}");
                break;
            }
            let step = &mut self.steps[i];
            info!("Running step {}: {}", i, step.name());
            match step.run_with_cancel(cancel) {
                Ok(summary) => {
                    if let Some(dir) = &self.log_dir {
                        let path = dir.join(PackagePaths::get().step_log_filename(i, step.name()));
                        if let Err(e) = step.write_log(&path) {
                            warn!("Could not write log for step '{}': {:#}", step.name(), e);
                        }
                    }
                    outcomes.push(StepOutcome::Completed(summary));
                }
                Err(e) => {
                    error!("Step '{}' did not start: {}", step.name(), e);
                    outcomes.push(StepOutcome::Failed {
                        step: step.name().to_string(),
                        error: e,
                    });
                }
            }
        }
        Ok(outcomes)
    }
}
