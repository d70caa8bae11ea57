//! Error taxonomy: step preconditions and pipeline structure.
//!
//! Per-item failures never show up here; they are folded into the execution log.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a step before any item is processed, or reject its configuration.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{step}': no input directory defined")]
    NoInputDirs { step: String },

    #[error("step '{step}': must define at least one output directory")]
    MissingOutputDirs { step: String },

    #[error("step '{step}': expected {expected} output directories, got {got}")]
    OutputDirCountMismatch {
        step: String,
        expected: usize,
        got: usize,
    },

    #[error("step '{step}': input directory does not exist: {}", .dir.display())]
    DirectoryNotFound { step: String, dir: PathBuf },

    #[error("step '{step}': failed to list {}: {msg}", .dir.display())]
    DirectoryUnreadable {
        step: String,
        dir: PathBuf,
        msg: String,
    },

    #[error("step '{step}': no files found in input directories {}", display_dirs(.dirs))]
    EmptyInputDirectory { step: String, dirs: Vec<PathBuf> },

    #[error("step '{step}': cannot create output directory {}: {msg}", .dir.display())]
    OutputDirectoryError {
        step: String,
        dir: PathBuf,
        msg: String,
    },

    #[error("invalid pairing strategy '{name}'; choose one of: one_input, zip, modulo, sample, custom")]
    InvalidPairingStrategy { name: String },

    #[error("a pairing function is required for the 'custom' strategy")]
    MissingPairingFunction,

    #[error("sample ratio {ratio} is outside [0, 1]")]
    InvalidSampleRatio { ratio: f64 },

    #[error("step '{step}': strategy '{strategy}' requires {required} input directories, got {got}")]
    StrategyArity {
        step: String,
        strategy: &'static str,
        required: &'static str,
        got: usize,
    },

    #[error("step '{step}': sample size {k} exceeds listing of {len} files in {}", .dir.display())]
    SampleSizeExceedsListing {
        step: String,
        k: usize,
        len: usize,
        dir: PathBuf,
    },
}

/// Structural failures raised while building or starting a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("the first step ('{step}') must have input directories defined")]
    MissingInputError { step: String },

    #[error("invalid position {position} to insert step '{step}' (pipeline has {len} steps)")]
    InvalidInsertPosition {
        step: String,
        position: usize,
        len: usize,
    },

    #[error("invalid start index {index}: pipeline has {len} steps")]
    StartIndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Step(#[from] StepError),
}

fn display_dirs(dirs: &[PathBuf]) -> String {
    let parts: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
    format!("[{}]", parts.join(", "))
}
