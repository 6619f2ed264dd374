//! Filesystem locations and path expansion.

use dirs::home_dir;
use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{(?P<braced>\w+)\}|(?P<plain>\w+))").expect("env var pattern is valid")
});

/// Returns the deliver home directory, or None if the user's home cannot be resolved.
pub fn try_deliver_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("DELIVER_HOME") {
        return Some(expand_path(val));
    }
    home_dir().map(|h| h.join(".deliver"))
}

/// Settings file: `$DELIVER_CONFIG`, else `<home>/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("DELIVER_CONFIG") {
        return Some(expand_path(val));
    }
    try_deliver_home().map(|h| h.join("config.toml"))
}

/// Logs directory: ~/.deliver/logs
pub fn log_dir() -> Option<PathBuf> {
    try_deliver_home().map(|h| h.join("logs"))
}

/// Generate a timestamped build log path for a package inside `dir`.
pub fn build_log_path(dir: &Path, qualified_name: &str) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("build-{qualified_name}-{timestamp}.log"))
}

/// Expand `~`, `$VAR` and `${VAR}`, then normalize the result lexically.
///
/// Unknown variables are left as written.
pub fn expand_path(path: impl AsRef<Path>) -> PathBuf {
    let raw = path.as_ref().to_string_lossy();

    let user_expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match home_dir() {
            Some(home) => format!("{}{rest}", home.display()),
            None => raw.to_string(),
        },
        _ => raw.to_string(),
    };

    let vars_expanded = ENV_VAR.replace_all(&user_expanded, |caps: &Captures<'_>| {
        let name = caps
            .name("braced")
            .or_else(|| caps.name("plain"))
            .map_or("", |m| m.as_str());
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });

    normalize(Path::new(vars_expanded.as_ref()))
}

/// Collapse `.` and `..` components and redundant separators without touching
/// the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !matches!(out.components().next_back(), Some(Component::RootDir)) {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}
