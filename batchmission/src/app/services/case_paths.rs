// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Mapping between local case directories and blob names.
//!
//! A case directory `/data/runs/case-1` is staged so that its parent
//! (`/data/runs`) is the blob root: `/data/runs/case-1/sub/b.txt` becomes the
//! blob `case-1/sub/b.txt`. All helpers here are pure and never touch disk.

use std::path::{Component, Path, PathBuf};

use crate::app::errors::{AppError, AppResult};

const MAX_TASK_ID_LEN: usize = 64;

/// Makes `path` absolute against `cwd` and normalizes it syntactically.
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(cwd.join(path))
    }
}

/// Normalize a path syntactically
/// - remove `.`
/// - resolve `..` where possible
/// - keeps an absolute root/prefix if present
pub fn normalize_path(p: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    let mut comps = p.as_ref().components().peekable();
    while let Some(c) = comps.peek() {
        match c {
            Component::Prefix(prefix) => {
                out.push(Path::new(prefix.as_os_str()));
                comps.next();
            }
            Component::RootDir => {
                out.push(Path::new(std::path::MAIN_SEPARATOR_STR));
                comps.next();
            }
            _ => break,
        }
    }

    for comp in comps {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = out.pop();
                if !popped || out.as_os_str().is_empty() {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    out
}

/// Final segment of a normalized case directory.
pub fn case_base_name(dir: &Path) -> AppResult<String> {
    match dir.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => Err(AppError::invalid_argument(format!(
            "'{}' has no directory name to use as a case name",
            dir.display()
        ))),
    }
}

/// Parent directory recorded in the ledger for a case directory.
pub fn case_parent(dir: &Path) -> AppResult<PathBuf> {
    dir.parent().map(Path::to_path_buf).ok_or_else(|| {
        AppError::invalid_argument(format!("'{}' has no parent directory", dir.display()))
    })
}

/// Blob prefix that holds every file of a case.
pub fn case_prefix(case_name: &str) -> String {
    format!("{case_name}/")
}

/// Blob name of `file`, relative to `parent` and joined with `/`.
pub fn blob_name_for(parent: &Path, file: &Path) -> AppResult<String> {
    let rel = file.strip_prefix(parent).map_err(|_| {
        AppError::local(format!(
            "'{}' is not below '{}'",
            file.display(),
            parent.display()
        ))
    })?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|comp| match comp {
            Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(AppError::local(format!(
            "'{}' does not name a file below '{}'",
            file.display(),
            parent.display()
        )));
    }
    Ok(parts.join("/"))
}

/// Local destination of a blob under the recorded parent directory.
///
/// Segments that would escape `parent` (`..`, empty, absolute) are rejected.
pub fn local_path_for_blob(parent: &Path, blob_name: &str) -> AppResult<PathBuf> {
    let mut out = parent.to_path_buf();
    for seg in blob_name.split('/') {
        if seg.is_empty() || seg == "." || seg == ".." {
            return Err(AppError::invalid_argument(format!(
                "blob name '{blob_name}' cannot be mapped to a local path"
            )));
        }
        out.push(seg);
    }
    Ok(out)
}

/// Drops the `restype=container&` query parameter the storage service adds
/// to container URLs; the parameter breaks task resource file resolution.
pub fn strip_restype(url: &str) -> String {
    url.replace("restype=container&", "")
}

/// Case names double as task ids on the batch service.
pub fn validate_task_id(case_name: &str) -> AppResult<()> {
    if case_name.is_empty() || case_name.len() > MAX_TASK_ID_LEN {
        return Err(AppError::invalid_argument(format!(
            "case name '{case_name}' must be 1 to {MAX_TASK_ID_LEN} characters to be used as a task id"
        )));
    }
    if !case_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::invalid_argument(format!(
            "case name '{case_name}' may only contain letters, digits, '-' and '_' to be used as a task id"
        )));
    }
    Ok(())
}
