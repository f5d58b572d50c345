// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::LocalFilesystemPort;

#[derive(Clone, Copy, Default)]
pub struct LocalFilesystem;

#[async_trait]
impl LocalFilesystemPort for LocalFilesystem {
    #[tracing::instrument(name = "fs", level = "debug", skip(self), fields(op = "current_dir"))]
    async fn current_dir(&self) -> AppResult<PathBuf> {
        std::env::current_dir()
            .map_err(|err| AppError::local(format!("failed to resolve current directory: {err}")))
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "is_dir", path = %path.display()))]
    async fn is_dir(&self, path: &Path) -> AppResult<bool> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AppError::local(format!(
                "failed to stat {}: {err}",
                path.display()
            ))),
        }
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, root), fields(op = "list_files", root = %root.display()))]
    async fn list_files(&self, root: &Path) -> AppResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                AppError::local(format!("failed to walk {}: {err}", root.display()))
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "create_dir_all", path = %path.display()))]
    async fn create_dir_all(&self, path: &Path) -> AppResult<()> {
        std::fs::create_dir_all(path)
            .map_err(|err| AppError::local(format!("failed to create {}: {err}", path.display())))
    }
}
