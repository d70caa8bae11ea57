//! Input listing: one sorted list of regular files per input directory.

use log::{debug, info};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::engine::paths::should_include_in_listing;
use crate::error::StepError;

/// Filters applied while listing an input directory.
#[derive(Clone, Debug, Default)]
pub struct ListingFilter {
    /// Skip `.DS_Store`, `Thumbs.db`, `._*` and similar.
    pub skip_os_hidden: bool,
    /// File-name globs to leave out (e.g. `*.txt`).
    pub exclude: Vec<String>,
}

/// List the regular files directly inside `dir`, sorted by file name.
/// Fails with `DirectoryNotFound` when `dir` is missing or not a directory.
pub fn list_dir(step: &str, dir: &Path, filter: &ListingFilter) -> Result<Vec<PathBuf>, StepError> {
    if !dir.is_dir() {
        return Err(StepError::DirectoryNotFound {
            step: step.to_string(),
            dir: dir.to_path_buf(),
        });
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|e| StepError::DirectoryUnreadable {
            step: step.to_string(),
            dir: dir.to_path_buf(),
            msg: e.to_string(),
        })?;
        // Symlinks count when they point at a regular file.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        let path = entry.into_path();
        if should_include_in_listing(&path, filter.skip_os_hidden, &filter.exclude) {
            files.push(path);
        }
    }
    Ok(files)
}

/// List every input directory, preserving input-directory order.
pub fn list_inputs(
    step: &str,
    dirs: &[PathBuf],
    filter: &ListingFilter,
) -> Result<Vec<Vec<PathBuf>>, StepError> {
    if dirs.is_empty() {
        return Err(StepError::NoInputDirs {
            step: step.to_string(),
        });
    }
    debug!("[{step}] listing {} input directories", dirs.len());
    dirs.iter()
        .map(|dir| {
            let files = list_dir(step, dir, filter)?;
            info!("[{step}] '{}': {} files found", dir.display(), files.len());
            Ok(files)
        })
        .collect()
}
