// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Exclude rules applied to blob names when fetching a case back.
//!
//! Patterns without a `/` match the file name only. Patterns with a `/` match
//! the blob path below the case prefix. A trailing `/` marks a directory
//! pattern, which excludes every blob below a matching directory.

use globset::{GlobBuilder, GlobMatcher};

use crate::app::errors::{AppError, AppResult};

/// Raw solver output that is large and rarely needed locally.
pub const RAW_OUTPUT_PATTERNS: &[&str] = &["*.data", "fort.*", "claw_git_diffs*", "claw_git_status*"];
/// Topography and hydrography rasters that were inputs in the first place.
pub const RASTER_PATTERNS: &[&str] = &["*.asc", "*.prj"];
pub const PYCACHE_PATTERN: &str = "__pycache__/";

/// Patterns behind [`FetchFilter::results_only`], for callers adding their own.
pub fn results_only_patterns() -> Vec<&'static str> {
    let mut patterns: Vec<&'static str> = Vec::new();
    patterns.extend_from_slice(RAW_OUTPUT_PATTERNS);
    patterns.extend_from_slice(RASTER_PATTERNS);
    patterns.push(PYCACHE_PATTERN);
    patterns
}

#[derive(Debug)]
struct ExcludeRule {
    matcher: GlobMatcher,
    only_dir: bool,
    match_basename: bool,
}

#[derive(Debug, Default)]
pub struct FetchFilter {
    rules: Vec<ExcludeRule>,
}

impl FetchFilter {
    /// A filter that keeps every blob.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<S: AsRef<str>>(patterns: &[S]) -> AppResult<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            rules.push(ExcludeRule::compile(pattern.as_ref())?);
        }
        Ok(Self { rules })
    }

    /// Skips raw output, raster inputs and Python caches.
    pub fn results_only() -> AppResult<Self> {
        Self::new(&results_only_patterns())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `rel_name` is the blob name with the case prefix removed.
    pub fn excludes(&self, rel_name: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let segments: Vec<&str> = rel_name.split('/').collect();
        let Some((basename, dirs)) = segments.split_last() else {
            return false;
        };
        self.rules.iter().any(|rule| {
            if rule.only_dir {
                if rule.match_basename {
                    dirs.iter().any(|dir| rule.matcher.is_match(dir))
                } else {
                    (1..=dirs.len()).any(|n| rule.matcher.is_match(dirs[..n].join("/")))
                }
            } else if rule.match_basename {
                rule.matcher.is_match(basename)
            } else {
                rule.matcher.is_match(rel_name)
            }
        })
    }
}

impl ExcludeRule {
    fn compile(raw: &str) -> AppResult<Self> {
        let mut pattern = raw.trim().to_string();
        let only_dir = pattern.ends_with('/');
        while pattern.ends_with('/') {
            pattern.pop();
        }
        let pattern = pattern.trim_start_matches('/').to_string();
        if pattern.is_empty() {
            return Err(AppError::invalid_argument("fetch filter pattern cannot be empty"));
        }
        let match_basename = !pattern.contains('/');
        let matcher = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| {
                AppError::invalid_argument(format!("invalid fetch filter pattern '{raw}': {err}"))
            })?
            .compile_matcher();
        Ok(Self {
            matcher,
            only_dir,
            match_basename,
        })
    }
}
