//! Execution log persistence: one JSON array per step, written via a temp file and renamed.

use anyhow::{Context, Result};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::types::LogEntry;

/// Temp path next to the final log file.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log.json".to_string());
    path.parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}.tmp"))
}

/// Write `log` as a pretty JSON array to `path`, creating parent directories.
pub fn write_log(path: &Path, log: &[LogEntry]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let temp = temp_path_for(path);
    let file =
        fs::File::create(&temp).with_context(|| format!("create {}", temp.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, log).context("serialise execution log")?;
    writer.flush().context("flush execution log")?;
    drop(writer);
    fs::rename(&temp, path).with_context(|| {
        format!(
            "rename temp log to final path ({} -> {})",
            temp.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Load a log written by [`write_log`].
pub fn read_log(path: &Path) -> Result<Vec<LogEntry>> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse execution log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arg, CallOutcome};
    use tempfile::TempDir;

    #[test]
    fn write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("00_copy.json");
        let log = vec![
            LogEntry::from_call(
                vec![Arg::Path("/in/a.png".into())],
                Ok(CallOutcome::Single("/out/a.png".into())),
            ),
            LogEntry::failed(vec![Arg::Path("/in/b.png".into())], "cannot decode"),
        ];
        write_log(&path, &log).unwrap();
        assert!(!temp_path_for(&path).exists());
        assert_eq!(read_log(&path).unwrap(), log);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[1]["status"], "error");
        assert_eq!(raw[1]["error_message"], "cannot decode");
    }
}
