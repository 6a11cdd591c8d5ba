//! Lexical path handling.
//!
//! The filesystem only accepts absolute paths; relative lookups are the
//! caller's business (the shell joins against `PWD` before calling in).
//! Normalization is purely lexical: empty and `.` segments are dropped
//! and `..` pops, which means `a/..` cancels without consulting inodes.

use crate::{FsError, FsResult};

/// Splits an absolute path into normalized segments.
///
/// Fails with [`FsError::InvalidInput`] on relative paths.
pub fn segments(path: &str) -> FsResult<Vec<String>> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidInput);
    }
    let mut out: Vec<String> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(seg.to_string()),
        }
    }
    Ok(out)
}

/// Lexically normalizes an absolute path (`/a/b/../c` → `/a/c`).
pub fn normalize(path: &str) -> FsResult<String> {
    let segs = segments(path)?;
    if segs.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segs.join("/")))
}

/// Joins a possibly-relative path onto an absolute base, then normalizes.
pub fn absolutize(base: &str, path: &str) -> FsResult<String> {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", base, path))
    }
}

/// True when `path` equals `prefix` or sits below it.
///
/// Both sides must already be normalized.
pub fn is_within(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix || path.starts_with(prefix) && path.as_bytes()[prefix.len()] == b'/'
}

/// The parent of a normalized absolute path (`/` is its own parent).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// The final component of a normalized absolute path.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
