//! Path confinement for tenant roots.
//!
//! Every SFTP-visible path is cleaned lexically and proven to land inside
//! the tenant root before any filesystem call. Canonicalization never
//! resolves symlinks; link placement inside the jail must not be able to
//! move the prefix check. Do not swap `std::path::absolute` for
//! `fs::canonicalize` here.

use std::path::{Path, PathBuf};

use pelican_core::{Error, Result};

/// Clean an SFTP-visible path against `root`.
///
/// Returns the absolute local path and the display path used for audit
/// records (`/` for the root itself, otherwise `/`-separated relative).
///
/// Rejections: a cleaned path that still begins with `..` is
/// `InvalidPath`; an absolutized path outside the root is `PathEscapes`.
pub fn clean(root: &Path, path: &str) -> Result<(PathBuf, String)> {
    let input = if path.is_empty() { "." } else { path };

    // Clients may send backslash separators; normalize before splitting.
    let normalized = input.replace('\\', "/");
    let trimmed = normalized.strip_prefix('/').unwrap_or(&normalized);

    let cleaned = lexical_clean(trimmed)?;

    let joined = root.join(&cleaned);
    let root_abs = std::path::absolute(root)?;
    let abs = std::path::absolute(&joined)?;

    // Component-wise prefix check: equal to the root, or under it with a
    // separator boundary.
    if abs != root_abs && !abs.starts_with(&root_abs) {
        return Err(Error::PathEscapes);
    }

    let display = if cleaned == "." {
        "/".to_string()
    } else {
        format!("/{cleaned}")
    };

    Ok((abs, display))
}

/// Lexically normalize a relative path: drop `.` segments, resolve `..`
/// against prior segments. Any `..` left over would climb above the root.
fn lexical_clean(path: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::InvalidPath);
                }
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(segments.join("/"))
    }
}
