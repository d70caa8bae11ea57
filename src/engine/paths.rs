//! Directory resolution and listing filters

use std::path::{Path, PathBuf};

/// Resolve `dir` against `root`: absolute paths are returned unchanged, relative ones are joined under root.
/// Without a root, relative paths stay relative (resolved by the OS against the working directory).
pub fn resolve_dir(dir: &Path, root: Option<&Path>) -> PathBuf {
    match root {
        Some(root) if !dir.is_absolute() => root.join(dir),
        _ => dir.to_path_buf(),
    }
}

/// [`resolve_dir`] over a whole directory list, preserving order.
pub fn resolve_dirs<P: AsRef<Path>>(dirs: &[P], root: Option<&Path>) -> Vec<PathBuf> {
    dirs.iter().map(|d| resolve_dir(d.as_ref(), root)).collect()
}

/// Comma-joined final components, for one-line step descriptions.
pub fn dir_names(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// OS metadata droppings that never belong in a dataset listing.
pub fn is_os_hidden_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(".DS_Store" | ".AppleDouble" | ".LSOverride" | "Thumbs.db" | "ehthumbs.db"
        | "Desktop.ini" | ".directory") => true,
        // macOS resource forks
        Some(name) => name.starts_with("._"),
        None => false,
    }
}

/// Returns true if the file should be part of an input listing.
pub fn should_include_in_listing(path: &Path, skip_os_hidden: bool, exclude: &[String]) -> bool {
    if skip_os_hidden && is_os_hidden_file(path) {
        return false;
    }
    if exclude.is_empty() {
        return true;
    }
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return true,
    };
    !exclude.iter().any(|pattern| glob_match(pattern, name))
}

/// Glob match on a file name (`*` any run, `?` one char). Linear backtracking: only the last
/// `*` is ever retried, so patterns with many stars stay cheap on long names.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // (pattern index after the last `*`, text index it currently absorbs up to)
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi + 1, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((after, absorbed)) => {
                    pi = after;
                    ti = absorbed + 1;
                    star = Some((after, absorbed + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
