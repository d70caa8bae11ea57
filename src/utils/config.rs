//! Application configuration constants.
//! Tuning and defaults in one place.

use std::sync::OnceLock;

use crate::utils::fd_limit::max_workers_by_fd_limit;

// ---- Package / file names (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    settings_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                settings_filename: format!(".{pkg}.toml"),
                env_prefix: pkg.to_uppercase(),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Settings file looked up in a pipeline root (e.g. `.pairflow.toml`).
    pub fn settings_filename(&self) -> &str {
        &self.settings_filename
    }

    /// Environment variable carrying output directories to command transforms.
    pub fn output_dirs_var(&self) -> String {
        format!("{}_OUTPUT_DIRS", self.env_prefix)
    }

    /// Environment variable carrying the JSON options to command transforms.
    pub fn options_var(&self) -> String {
        format!("{}_OPTIONS", self.env_prefix)
    }

    /// File name for a persisted step log: `<index>_<step name>.json`.
    pub fn step_log_filename(&self, index: usize, step: &str) -> String {
        let safe: String = step
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{index:02}_{safe}.json")
    }
}

// ---- Worker threads ----

/// Worker pool limits. Use [`WorkerThreadLimits::for_items()`] to fill them from the host.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon).
    pub all_threads: usize,
    /// Cap derived from the file-descriptor limit, when the platform has one.
    pub fd_cap: Option<usize>,
}

impl WorkerThreadLimits {
    /// Limits for items holding `fds_per_item` descriptors each, from
    /// `rayon::current_num_threads()` and the process FD limit.
    pub fn for_items(fds_per_item: usize) -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            fd_cap: max_workers_by_fd_limit(fds_per_item),
        }
    }

    /// Largest pool a step may use.
    pub fn max_workers(&self) -> usize {
        let cap = match self.fd_cap {
            Some(fd) => self.all_threads.min(fd),
            None => self.all_threads,
        };
        cap.max(1)
    }
}

// ---- Pairing ----

/// Fraction of files flagged by each subset of the `sample` strategy.
pub const DEFAULT_SAMPLE_RATIO: f64 = 0.3;

// ---- Steps ----

/// Pairing strategy used when a step does not name one.
pub const DEFAULT_PAIRING: &str = "one_input";

/// Sequential dispatch unless a step asks for more.
pub const DEFAULT_WORKERS: usize = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_log_filename_is_sanitised() {
        let p = PackagePaths::get();
        assert_eq!(p.step_log_filename(3, "crop bbox/v2"), "03_crop_bbox_v2.json");
        assert_eq!(p.settings_filename(), ".pairflow.toml");
        assert_eq!(p.output_dirs_var(), "PAIRFLOW_OUTPUT_DIRS");
    }

    #[test]
    fn max_workers_takes_lowest_cap() {
        let l = WorkerThreadLimits {
            all_threads: 8,
            fd_cap: Some(3),
        };
        assert_eq!(l.max_workers(), 3);
        let l = WorkerThreadLimits {
            all_threads: 8,
            fd_cap: None,
        };
        assert_eq!(l.max_workers(), 8);
        let l = WorkerThreadLimits {
            all_threads: 0,
            fd_cap: None,
        };
        assert_eq!(l.max_workers(), 1);
    }
}
