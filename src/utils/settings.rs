//! Load `.pairflow.toml` from a pipeline root and apply it to step configurations.
//!
//! ```toml
//! [settings]
//! workers = 4
//! seed = 42
//! log_dir = "logs"
//! skip_os_hidden = true
//! exclude = ["*.tmp"]
//!
//! [steps.overlay]
//! workers = 8
//! sample_k = 500
//! options = { min_scale = 0.4, max_scale = 0.9 }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::engine::paths::resolve_dir;
use crate::pipeline::StepConfig;
use crate::utils::config::PackagePaths;

/// Parsed settings file. `[settings]` fills in what a step config leaves unset;
/// `[steps.<name>]` overrides the step of that name.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    steps: HashMap<String, StepSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    workers: Option<usize>,
    seed: Option<u64>,
    log_dir: Option<String>,
    verbose: Option<bool>,
    exclude: Option<Vec<String>>,
    skip_os_hidden: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct StepSection {
    workers: Option<usize>,
    sample_k: Option<usize>,
    seed: Option<u64>,
    options: Option<toml::Table>,
}

/// Load the settings file from `dir` if present. Returns None if missing, unreadable or malformed.
pub fn load_settings(dir: &Path) -> Option<PipelineSettings> {
    let path = dir.join(PackagePaths::get().settings_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_settings(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

pub fn parse_settings(s: &str) -> Result<PipelineSettings, toml::de::Error> {
    toml::from_str(s)
}

/// Overwrite a config field from the file when present.
macro_rules! apply_file_opt {
    ($section:expr, $cfg:expr, $field:ident) => {
        if let Some(v) = $section.$field {
            $cfg.$field = Some(v);
        }
    };
}

impl PipelineSettings {
    pub fn verbose(&self) -> bool {
        self.settings.verbose.unwrap_or(false)
    }

    /// Directory for persisted step logs, resolved against `root` when relative.
    pub fn log_dir(&self, root: Option<&Path>) -> Option<PathBuf> {
        self.settings
            .log_dir
            .as_ref()
            .map(|d| resolve_dir(Path::new(d), root))
    }

    /// Apply file settings to a step configuration before the step is built.
    pub fn apply_to_config(&self, cfg: &mut StepConfig) {
        let global = &self.settings;
        if cfg.workers.is_none() {
            cfg.workers = global.workers;
        }
        if cfg.seed.is_none() {
            cfg.seed = global.seed;
        }
        if let Some(ref v) = global.exclude {
            cfg.filter.exclude.extend(v.iter().cloned());
        }
        if global.skip_os_hidden == Some(true) {
            cfg.filter.skip_os_hidden = true;
        }

        let Some(section) = self.steps.get(&cfg.name) else {
            return;
        };
        apply_file_opt!(section, cfg, workers);
        apply_file_opt!(section, cfg, sample_k);
        apply_file_opt!(section, cfg, seed);
        if let Some(ref table) = section.options {
            for (k, v) in table {
                match serde_json::to_value(v) {
                    Ok(json) => {
                        cfg.options.insert(k.clone(), json);
                    }
                    Err(e) => log::warn!("step '{}': option '{}' ignored: {}", cfg.name, k, e),
                }
            }
        }
    }
}
