// SPDX-License-Identifier: MIT OR Apache-2.0
//! Microcrate for portable executable discovery in `PATH`.
//!
//! Backends may carry their own `PATH` in an environment overlay, so lookups
//! accept an explicit search path instead of always reading the ambient one.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Locate an executable by name using the ambient `PATH`.
///
/// If `bin` contains path separators, it is treated as a direct path.
pub fn which(bin: &str) -> Option<PathBuf> {
    which_in(bin, std::env::var_os("PATH").as_deref())
}

/// Locate an executable by name using `search_path` instead of the ambient `PATH`.
///
/// Returns `None` when `search_path` is `None` and `bin` is a bare name.
pub fn which_in(bin: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if bin.is_empty() {
        return None;
    }

    let candidate = Path::new(bin);
    if has_path(candidate) {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    std::env::split_paths(search_path?).find_map(|dir| resolve_in_dir(&dir, bin))
}

/// Return `true` when an executable can be resolved from PATH or explicit path.
pub fn command_exists(command: &str) -> bool {
    which(command).is_some()
}

fn has_path(candidate: &Path) -> bool {
    candidate.components().count() > 1
}

fn resolve_in_dir(dir: &Path, command: &str) -> Option<PathBuf> {
    let direct = dir.join(command);
    if is_executable(&direct) {
        return Some(direct);
    }

    if !cfg!(windows) {
        return None;
    }

    [".exe", ".cmd", ".bat", ".com"]
        .into_iter()
        .map(|ext| dir.join(format!("{command}{ext}")))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
