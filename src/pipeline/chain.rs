//! Pipeline construction: ordered steps and directory chaining at insertion time.

use log::debug;
use std::path::{Path, PathBuf};

use crate::engine::dispatch::Transform;
use crate::error::PipelineError;
use crate::pipeline::step::{Step, StepConfig};
use crate::utils::settings::{PipelineSettings, load_settings};

/// Ordered collection of steps. Owns its steps; steps hold no reference back.
#[derive(Debug, Default)]
pub struct Pipeline {
    pub(crate) steps: Vec<Step>,
    pub(crate) root_dir: Option<PathBuf>,
    pub(crate) log_dir: Option<PathBuf>,
    settings: Option<PipelineSettings>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline whose steps (when rootless) resolve relative directories under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: Some(root.into()),
            ..Self::default()
        }
    }

    /// Pipeline rooted at `root`, picking up `.pairflow.toml` from it when present.
    pub fn from_root_with_settings(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let settings = load_settings(&root);
        let log_dir = settings.as_ref().and_then(|s| s.log_dir(Some(&root)));
        Self {
            root_dir: Some(root),
            log_dir,
            settings,
            ..Self::default()
        }
    }

    /// Persist each step's log to `<dir>/<index>_<name>.json` after it runs.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        if self.log_dir.is_none() {
            self.log_dir = settings.log_dir(self.root_dir.as_deref());
        }
        self.settings = Some(settings);
        self
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    pub fn settings(&self) -> Option<&PipelineSettings> {
        self.settings.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the first step called `name`. Names are labels, so several steps may share one.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }

    /// Append `step`, chaining its inputs to the previous step's outputs. Returns its index.
    pub fn add(&mut self, step: Step) -> Result<usize, PipelineError> {
        self.insert(step, None)
    }

    /// Apply the pipeline's settings file to `config`, build the step and append it.
    pub fn add_configured<T: Transform + 'static>(
        &mut self,
        mut config: StepConfig,
        transform: T,
    ) -> Result<usize, PipelineError> {
        if let Some(settings) = &self.settings {
            settings.apply_to_config(&mut config);
        }
        let step = Step::new(config, transform)?;
        self.add(step)
    }

    /// Insert `step` at `position` (append when `None`).
    ///
    /// A step without inputs inherits the outputs of its new predecessor. When inserted between
    /// two steps, the following step (unless `fixed_input`) is rewired to read from it, so
    /// `A -> B` becomes `A -> X -> B`. A rootless step adopts the pipeline root and its
    /// directories are re-resolved after chaining.
    pub fn insert(&mut self, mut step: Step, position: Option<usize>) -> Result<usize, PipelineError> {
        let len = self.steps.len();
        let pos = match position {
            None => len,
            Some(p) if p > len || (p == 0 && len > 0) => {
                return Err(PipelineError::InvalidInsertPosition {
                    step: step.name().to_string(),
                    position: p,
                    len,
                });
            }
            Some(p) => p,
        };

        if step.input_dirs().is_empty() {
            if pos == 0 || step.fixed_input() {
                return Err(PipelineError::MissingInputError {
                    step: step.name().to_string(),
                });
            }
            let previous = &self.steps[pos - 1];
            debug!(
                "chaining '{}' <- outputs of '{}'",
                step.name(),
                previous.name()
            );
            step.set_input_dirs(previous.output_dirs().to_vec());
        }

        if step.root_dir().is_none()
            && let Some(root) = &self.root_dir
        {
            step.apply_root(root);
        }

        if let Some(next) = self.steps.get_mut(pos)
            && !next.fixed_input()
        {
            debug!("rewiring '{}' <- outputs of '{}'", next.name(), step.name());
            next.set_input_dirs(step.output_dirs().to_vec());
        }

        self.steps.insert(pos, step);
        Ok(pos)
    }
}
