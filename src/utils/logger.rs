//! Console logging for pipeline runs.
//!
//! Info lines read `[pairflow] ...`. Warnings and errors also name the module they came from,
//! relative to the crate (`[pairflow WARN engine::pairing] ...`), and debug lines are dimmed.
//! `RUST_LOG` still overrides the levels set here.

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::fmt;
use std::io::Write;

use crate::utils::settings::PipelineSettings;

/// Level for this crate's own records. Dependencies stay at `Warn`.
pub fn crate_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// `verbose` from a pipeline's settings file; quiet when there is none.
pub fn verbose_from(settings: Option<&PipelineSettings>) -> bool {
    settings.is_some_and(PipelineSettings::verbose)
}

/// Install the console logger. Safe to call more than once; only the first call takes effect.
pub fn setup_logging(verbose: bool) {
    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), crate_level(verbose))
        .format(|buf, record| {
            let line = render_line(record.level(), record.target(), record.args());
            writeln!(buf, "{line}")
        })
        .try_init();
}

/// Module path without the crate prefix: `pairflow::engine::dispatch` -> `engine::dispatch`.
fn short_target(target: &str) -> &str {
    let name = env!("CARGO_PKG_NAME");
    match target.strip_prefix(name) {
        Some("") => name,
        Some(rest) => rest.strip_prefix("::").unwrap_or(target),
        None => target,
    }
}

fn render_line(level: Level, target: &str, args: &fmt::Arguments<'_>) -> String {
    let name = env!("CARGO_PKG_NAME").cyan();
    let target = short_target(target);
    match level {
        Level::Error => format!("[{} {} {}] {}", name, "ERROR".red().bold(), target.white(), args),
        Level::Warn => format!("[{} {} {}] {}", name, "WARN".yellow(), target.white(), args),
        Level::Info => format!("[{name}] {args}"),
        Level::Debug | Level::Trace => {
            format!("[{} {}] {}", name, target, args.to_string().dimmed())
        }
    }
}
