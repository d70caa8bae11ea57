//! Public types for the pairflow API: call arguments, transform outcomes, log entries and summaries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Free-form options passed verbatim to the transform on every call.
pub type Options = serde_json::Map<String, Value>;

/// Positional arguments for one transform call, in tuple order.
pub type ArgTuple = Vec<Arg>;

/// One positional argument of a transform call.
///
/// Most strategies only produce paths; `sample` appends two per-file flags.
/// Serialises untagged: paths as plain strings, flags as JSON booleans.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Flag(bool),
    Path(PathBuf),
}

impl Arg {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Arg::Path(p) => Some(p.as_path()),
            Arg::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Arg::Flag(b) => Some(*b),
            Arg::Path(_) => None,
        }
    }
}

impl From<PathBuf> for Arg {
    fn from(p: PathBuf) -> Self {
        Arg::Path(p)
    }
}

impl From<&Path> for Arg {
    fn from(p: &Path) -> Self {
        Arg::Path(p.to_path_buf())
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Flag(b)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Path(p) => write!(f, "{}", p.display()),
            Arg::Flag(b) => write!(f, "{b}"),
        }
    }
}

/// Render a tuple as `(a, b, c)` for log lines.
pub fn describe_args(args: &[Arg]) -> String {
    let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// What a transform handed back, decided once at the dispatch boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    Single(PathBuf),
    Multiple(Vec<PathBuf>),
    /// Null, empty string or empty list: nothing to save, not an exception.
    Empty,
    /// Anything else; carries a description of what came back.
    Invalid(String),
}

impl CallOutcome {
    /// Classify a transform's raw return value.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Null => CallOutcome::Empty,
            Value::String(s) if s.is_empty() => CallOutcome::Empty,
            Value::String(s) => CallOutcome::Single(PathBuf::from(s)),
            Value::Array(items) if items.is_empty() => CallOutcome::Empty,
            Value::Array(items) => {
                let mut paths = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => paths.push(PathBuf::from(s)),
                        other => {
                            return CallOutcome::Invalid(format!(
                                "list containing {}",
                                json_type_name(&other)
                            ));
                        }
                    }
                }
                CallOutcome::Multiple(paths)
            }
            other => CallOutcome::Invalid(json_type_name(&other).to_string()),
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Outcome of one argument tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Generated but never executed (run cancelled before it was picked up).
    Pending,
    Success,
    NoOutput,
    TypeError,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Success => "success",
            ItemStatus::NoOutput => "no_output",
            ItemStatus::TypeError => "type_error",
            ItemStatus::Error => "error",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one argument tuple's processing. Same shape as the persisted JSON log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub inputs: ArgTuple,
    pub outputs: Option<Vec<PathBuf>>,
    pub status: ItemStatus,
    pub error_message: Option<String>,
}

impl LogEntry {
    /// Entry for a call that returned (`Ok`) or raised (`Err(message)`).
    pub fn from_call(inputs: ArgTuple, result: Result<CallOutcome, String>) -> Self {
        match result {
            Ok(CallOutcome::Single(p)) => Self::with(inputs, Some(vec![p]), ItemStatus::Success, None),
            Ok(CallOutcome::Multiple(ps)) => Self::with(inputs, Some(ps), ItemStatus::Success, None),
            Ok(CallOutcome::Empty) => Self::with(inputs, None, ItemStatus::NoOutput, None),
            Ok(CallOutcome::Invalid(what)) => Self::with(
                inputs,
                None,
                ItemStatus::TypeError,
                Some(format!(
                    "invalid transform return (got {what}); expected a path, a list of paths or null"
                )),
            ),
            Err(msg) => Self::failed(inputs, msg),
        }
    }

    pub fn failed(inputs: ArgTuple, msg: impl Into<String>) -> Self {
        Self::with(inputs, None, ItemStatus::Error, Some(msg.into()))
    }

    pub fn pending(inputs: ArgTuple) -> Self {
        Self::with(inputs, None, ItemStatus::Pending, None)
    }

    fn with(
        inputs: ArgTuple,
        outputs: Option<Vec<PathBuf>>,
        status: ItemStatus,
        error_message: Option<String>,
    ) -> Self {
        Self {
            inputs,
            outputs,
            status,
            error_message,
        }
    }
}

/// Aggregate counts for one step run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub name: String,
    /// Number of argument tuples generated (= number of log entries).
    pub generated: usize,
    pub success: usize,
    pub no_output: usize,
    pub type_errors: usize,
    pub errors: usize,
    /// Tuples never executed because the run was cancelled.
    pub pending: usize,
    pub cancelled: bool,
}

impl StepSummary {
    pub fn from_log(name: &str, log: &[LogEntry], cancelled: bool) -> Self {
        let mut s = StepSummary {
            name: name.to_string(),
            generated: log.len(),
            cancelled,
            ..Default::default()
        };
        for entry in log {
            match entry.status {
                ItemStatus::Pending => s.pending += 1,
                ItemStatus::Success => s.success += 1,
                ItemStatus::NoOutput => s.no_output += 1,
                ItemStatus::TypeError => s.type_errors += 1,
                ItemStatus::Error => s.errors += 1,
            }
        }
        s
    }

    /// Everything that ran but did not succeed (no output, wrong type, raised).
    pub fn error_count(&self) -> usize {
        self.no_output + self.type_errors + self.errors
    }
}
