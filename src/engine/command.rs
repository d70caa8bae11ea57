//! Transform backed by an external program: one OS process per item.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use crate::engine::dispatch::Transform;
use crate::types::{Arg, Options};
use crate::utils::config::PackagePaths;

/// Runs `program [fixed args...] <inputs...>` for each item.
///
/// Output directories go in `PAIRFLOW_OUTPUT_DIRS` (platform path-list), options as JSON in
/// `PAIRFLOW_OPTIONS`. Stdout is read as JSON; if it is not JSON, each non-empty line is an output path.
/// A non-zero exit fails the item with the program's stderr.
#[derive(Clone, Debug)]
pub struct CommandTransform {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the item inputs.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Transform for CommandTransform {
    fn call(&self, inputs: &[Arg], output_dirs: &[PathBuf], options: &Options) -> Result<Value> {
        let paths = PackagePaths::get();
        let dirs = std::env::join_paths(output_dirs).context("join output directories")?;
        let opts = serde_json::to_string(options).context("serialise options")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for input in inputs {
            match input {
                Arg::Path(p) => cmd.arg(p),
                Arg::Flag(b) => cmd.arg(b.to_string()),
            };
        }
        let out = cmd
            .env(paths.output_dirs_var(), dirs)
            .env(paths.options_var(), opts)
            .output()
            .with_context(|| format!("spawn {}", self.program.display()))?;

        if !out.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(parse_stdout(&String::from_utf8_lossy(&out.stdout)))
    }
}

fn parse_stdout(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return v;
    }
    let mut lines: Vec<Value> = trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| Value::String(l.to_string()))
        .collect();
    if lines.len() == 1 {
        lines.remove(0)
    } else {
        Value::Array(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stdout_json_or_lines() {
        assert_eq!(parse_stdout("  \n"), Value::Null);
        assert_eq!(parse_stdout("[\"/o/a\", \"/o/b\"]"), json!(["/o/a", "/o/b"]));
        assert_eq!(parse_stdout("/o/a.png\n"), json!("/o/a.png"));
        assert_eq!(parse_stdout("/o/a.png\n/o/a.txt\n"), json!(["/o/a.png", "/o/a.txt"]));
        assert_eq!(parse_stdout("null"), Value::Null);
    }

    #[cfg(unix)]
    #[test]
    fn runs_program_per_item() {
        let t = CommandTransform::new("sh")
            .arg("-c")
            .arg("echo \"$PAIRFLOW_OUTPUT_DIRS/$(basename \"$1\")\"")
            .arg("sh");
        let v = t
            .call(
                &[Arg::Path("/in/a.png".into())],
                &[PathBuf::from("/out")],
                &Options::new(),
            )
            .unwrap();
        assert_eq!(v, json!("/out/a.png"));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_error() {
        let t = CommandTransform::new("sh").arg("-c").arg("echo bad >&2; exit 3");
        let err = t.call(&[], &[PathBuf::from("/out")], &Options::new()).unwrap_err();
        assert!(format!("{err:#}").contains("bad"));
    }
}
