//! Step: one configured unit of chained file processing.

use anyhow::Result;
use log::{debug, info};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::dispatch::{Dispatcher, Transform, effective_workers};
use crate::engine::lister::{ListingFilter, list_inputs};
use crate::engine::pairing::{ArgumentGenerator, PairingFn, PairingStrategy};
use crate::engine::paths::{dir_names, resolve_dirs};
use crate::error::StepError;
use crate::types::{ArgTuple, ItemStatus, LogEntry, Options, StepSummary};
use crate::utils::cancel::CancelToken;
use crate::utils::config::{DEFAULT_PAIRING, DEFAULT_WORKERS};
use crate::utils::fd_limit::fds_per_item;
use crate::utils::log_file::write_log;

/// Everything a step is built from. Fill what you need and leave the rest at `Default`.
#[derive(Clone)]
pub struct StepConfig {
    /// Label for logs, errors and `[steps.<name>]` settings. Several steps may share one.
    pub name: String,
    /// May be left empty for any step but the first; the pipeline chains it.
    pub input_dirs: Vec<PathBuf>,
    /// At least one is required.
    pub output_dirs: Vec<PathBuf>,
    /// `one_input` (default), `zip`, `modulo`, `sample` or `custom`.
    pub pairing: String,
    /// Required for `custom`.
    pub pairing_fn: Option<Arc<dyn PairingFn>>,
    /// Subset ratios for `sample`. Default 0.3 each.
    pub sample_ratios: Option<(f64, f64)>,
    /// Never let pipeline chaining rewrite `input_dirs`.
    pub fixed_input: bool,
    /// Relative directories are resolved under it.
    pub root_dir: Option<PathBuf>,
    /// Keep a random subset of this many items (same indices in every listing).
    pub sample_k: Option<usize>,
    /// Pool size; 1 or unset runs sequentially.
    pub workers: Option<usize>,
    /// Seed for sampling and shuffling. Unset draws from OS entropy.
    pub seed: Option<u64>,
    /// Passed verbatim to the transform on every call.
    pub options: Options,
    /// Reject the step unless it has exactly this many output directories.
    pub expected_outputs: Option<usize>,
    pub filter: ListingFilter,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            input_dirs: Vec::new(),
            output_dirs: Vec::new(),
            pairing: DEFAULT_PAIRING.to_string(),
            pairing_fn: None,
            sample_ratios: None,
            fixed_input: false,
            root_dir: None,
            sample_k: None,
            workers: None,
            seed: None,
            options: Options::new(),
            expected_outputs: None,
            filter: ListingFilter::default(),
        }
    }
}

impl StepConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

pub struct Step {
    name: String,
    transform: Arc<dyn Transform>,
    root_dir: Option<PathBuf>,
    input_dirs: Vec<PathBuf>,
    output_dirs: Vec<PathBuf>,
    strategy: PairingStrategy,
    fixed_input: bool,
    sample_k: Option<usize>,
    workers: usize,
    seed: Option<u64>,
    options: Options,
    filter: ListingFilter,
    log: Vec<LogEntry>,
}

impl Step {
    /// Validate `config` and build the step. Directories are resolved against `root_dir`.
    pub fn new<T: Transform + 'static>(config: StepConfig, transform: T) -> Result<Self, StepError> {
        Self::with_shared(config, Arc::new(transform))
    }

    /// Same as [`Step::new`] for a transform shared between steps.
    pub fn with_shared(config: StepConfig, transform: Arc<dyn Transform>) -> Result<Self, StepError> {
        let StepConfig {
            name,
            input_dirs,
            output_dirs,
            pairing,
            pairing_fn,
            sample_ratios,
            fixed_input,
            root_dir,
            sample_k,
            workers,
            seed,
            options,
            expected_outputs,
            filter,
        } = config;

        if output_dirs.is_empty() {
            return Err(StepError::MissingOutputDirs { step: name });
        }
        if let Some(expected) = expected_outputs
            && expected != output_dirs.len()
        {
            return Err(StepError::OutputDirCountMismatch {
                step: name,
                expected,
                got: output_dirs.len(),
            });
        }
        let strategy = PairingStrategy::from_name(&pairing, pairing_fn, sample_ratios)?;

        let root = root_dir.as_deref();
        Ok(Self {
            input_dirs: resolve_dirs(&input_dirs, root),
            output_dirs: resolve_dirs(&output_dirs, root),
            name,
            transform,
            root_dir,
            strategy,
            fixed_input,
            sample_k,
            workers: workers.unwrap_or(DEFAULT_WORKERS),
            seed,
            options,
            filter,
            log: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dirs(&self) -> &[PathBuf] {
        &self.input_dirs
    }

    pub fn output_dirs(&self) -> &[PathBuf] {
        &self.output_dirs
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    pub fn fixed_input(&self) -> bool {
        self.fixed_input
    }

    pub fn strategy(&self) -> &PairingStrategy {
        &self.strategy
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// Log of the last run; empty before the first run or after a precondition failure.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Inputs → outputs for every successful item of the last run.
    pub fn processed_map(&self) -> HashMap<ArgTuple, Vec<PathBuf>> {
        self.log
            .iter()
            .filter(|e| e.status == ItemStatus::Success)
            .filter_map(|e| e.outputs.clone().map(|o| (e.inputs.clone(), o)))
            .collect()
    }

    /// Persist the last run's log as a JSON array.
    pub fn write_log(&self, path: &Path) -> Result<()> {
        write_log(path, &self.log)
    }

    pub(crate) fn set_input_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.input_dirs = dirs;
    }

    /// Adopt `root` and re-resolve every directory under it.
    pub(crate) fn apply_root(&mut self, root: &Path) {
        self.input_dirs = resolve_dirs(&self.input_dirs, Some(root));
        self.output_dirs = resolve_dirs(&self.output_dirs, Some(root));
        self.root_dir = Some(root.to_path_buf());
    }

    /// Run over all inputs. See [`Step::run_with_cancel`].
    pub fn run(&mut self) -> Result<StepSummary, StepError> {
        self.run_with_cancel(&CancelToken::new())
    }

    /// Create outputs, list inputs, pair them and dispatch every tuple.
    ///
    /// Precondition failures (missing/empty input directory, uncreatable output directory,
    /// strategy/arity problems) return `Err` with an empty log. Item failures are only logged.
    pub fn run_with_cancel(&mut self, cancel: &CancelToken) -> Result<StepSummary, StepError> {
        self.log.clear();
        info!("--- Running step '{}' ---", self.name);

        self.create_output_dirs()?;
        let listings = list_inputs(&self.name, &self.input_dirs, &self.filter)?;

        let mut generator =
            ArgumentGenerator::new(self.strategy.clone(), self.sample_k, self.seed);
        let args = generator.generate(&self.name, &self.input_dirs, listings)?;

        let per_item = fds_per_item(self.input_dirs.len(), self.output_dirs.len());
        let workers = effective_workers(&self.name, self.workers, per_item);
        let dispatcher = Dispatcher::new(
            &self.name,
            Arc::clone(&self.transform),
            &self.output_dirs,
            &self.options,
            cancel.clone(),
        );
        info!("[{}] processing ({} worker(s))", self.name, workers);
        let result = dispatcher.run(args, workers);
        self.log = result.log;

        let summary = StepSummary::from_log(&self.name, &self.log, result.cancelled);
        info!(
            "--- Step '{}' done: {} succeeded, {} failed or without output ---",
            self.name,
            summary.success,
            summary.error_count()
        );
        if summary.pending > 0 {
            info!("[{}] {} items not run (cancelled)", self.name, summary.pending);
        }
        Ok(summary)
    }

    /// Create every output directory (and parents) once, before dispatch.
    fn create_output_dirs(&self) -> Result<(), StepError> {
        for dir in &self.output_dirs {
            fs::create_dir_all(dir).map_err(|e| StepError::OutputDirectoryError {
                step: self.name.clone(),
                dir: dir.clone(),
                msg: e.to_string(),
            })?;
            debug!("[{}] output -> '{}'", self.name, dir.display());
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Step '{}':", self.name)?;
        writeln!(
            f,
            "  inputs : [{}] (mode: {})",
            dir_names(&self.input_dirs),
            self.strategy.name()
        )?;
        writeln!(f, "  outputs: [{}]", dir_names(&self.output_dirs))?;
        write!(f, "  options: {}", serde_json::Value::Object(self.options.clone()))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("input_dirs", &self.input_dirs)
            .field("output_dirs", &self.output_dirs)
            .field("strategy", &self.strategy)
            .field("fixed_input", &self.fixed_input)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
