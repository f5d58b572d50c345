// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use crate::app::errors::{AppError, AppResult};
use crate::app::services::case_paths::{
    blob_name_for, case_base_name, case_parent, case_prefix, local_path_for_blob,
};
use crate::app::services::fetch_filter::FetchFilter;
use crate::app::services::ledger::duplicate_case;
use crate::app::types::{FetchOutcome, PurgeOutcome, StagedCase};

use super::{MAX_LIST_RESULTS, MissionController};

impl MissionController {
    /// Uploads a case directory under its base name and records it in the ledger.
    ///
    /// Blob names keep each file's path relative to the directory's parent, so
    /// the base name becomes the blob prefix. If an upload or the ledger flush
    /// fails, blobs uploaded by this call are deleted again.
    #[tracing::instrument(name = "stage", level = "debug", skip(self, local_path), fields(path = %local_path.display()))]
    pub async fn stage_directory(&mut self, local_path: &Path) -> AppResult<StagedCase> {
        let dir = self.resolve_case_dir(local_path).await?;
        let case_name = case_base_name(&dir)?;
        if let Some(existing) = self.ledger.parent_of(&case_name) {
            tracing::error!(
                "a case with the base name {} already exists in the container",
                case_name
            );
            return Err(duplicate_case(&case_name, existing));
        }
        self.active_session()?;
        if !self.local_fs.is_dir(&dir).await? {
            return Err(AppError::invalid_argument(format!(
                "case folder '{}' not found",
                dir.display()
            )));
        }

        let parent = case_parent(&dir)?;
        let files = self.local_fs.list_files(&dir).await?;
        tracing::info!("uploading directory {} ({} files)", dir.display(), files.len());

        let mut uploaded = Vec::with_capacity(files.len());
        if let Err(err) = self.upload_files(&parent, &files, &mut uploaded).await {
            self.discard_blobs(&uploaded).await;
            return Err(err);
        }

        self.ledger.insert(&case_name, &parent)?;
        if let Err(err) = self.flush_ledger().await {
            self.ledger.remove(&case_name);
            self.discard_blobs(&uploaded).await;
            return Err(err.with_context(format!("recording case {case_name}")));
        }
        tracing::info!("done uploading directory {}", dir.display());

        Ok(StagedCase {
            case_name,
            parent,
            blobs: uploaded,
        })
    }

    /// Downloads every blob of a staged case back below its recorded parent.
    pub async fn fetch_directory(
        &mut self,
        local_path: &Path,
        ignore_missing: bool,
    ) -> AppResult<FetchOutcome> {
        self.fetch_directory_with(local_path, ignore_missing, &FetchFilter::none())
            .await
    }

    /// Like [`Self::fetch_directory`], skipping blobs excluded by `filter`.
    #[tracing::instrument(name = "fetch", level = "debug", skip(self, local_path, filter), fields(path = %local_path.display()))]
    pub async fn fetch_directory_with(
        &mut self,
        local_path: &Path,
        ignore_missing: bool,
        filter: &FetchFilter,
    ) -> AppResult<FetchOutcome> {
        let dir = self.resolve_case_dir(local_path).await?;
        let case_name = case_base_name(&dir)?;
        let Some(parent) = self.ledger.parent_of(&case_name).map(Path::to_path_buf) else {
            self.missing_case(&case_name, ignore_missing)?;
            return Ok(FetchOutcome::Skipped);
        };
        self.active_session()?;

        tracing::info!("downloading directory {}", case_name);
        let container = &self.descriptor.container_name;
        let prefix = case_prefix(&case_name);
        let blobs = self
            .storage
            .list_blobs(container, Some(&prefix), MAX_LIST_RESULTS)
            .await?;

        let mut files = Vec::with_capacity(blobs.len());
        let mut skipped = 0;
        for blob in blobs {
            let rel_name = blob.name.strip_prefix(&prefix).unwrap_or(&blob.name);
            if filter.excludes(rel_name) {
                skipped += 1;
                continue;
            }
            let target = local_path_for_blob(&parent, &blob.name)?;
            if let Some(target_dir) = target.parent() {
                self.local_fs.create_dir_all(target_dir).await?;
            }
            tracing::debug!("downloading file {}", target.display());
            self.storage
                .download_blob(container, &blob.name, &target)
                .await?;
            files.push(target);
        }
        tracing::info!(
            "done downloading directory {} ({} files, {} skipped)",
            case_name,
            files.len(),
            skipped
        );
        self.downloaded.insert(case_name.clone());

        Ok(FetchOutcome::Fetched {
            case_name,
            files,
            skipped,
        })
    }

    /// Deletes every blob of a staged case and drops it from the ledger.
    ///
    /// Not transactional: an interruption after the blob deletes but before the
    /// ledger flush leaves the entry behind, and purging again finishes the job.
    #[tracing::instrument(name = "purge", level = "debug", skip(self, local_path), fields(path = %local_path.display()))]
    pub async fn purge_directory(
        &mut self,
        local_path: &Path,
        ignore_missing: bool,
    ) -> AppResult<PurgeOutcome> {
        let dir = self.resolve_case_dir(local_path).await?;
        let case_name = case_base_name(&dir)?;
        if !self.ledger.contains(&case_name) {
            self.missing_case(&case_name, ignore_missing)?;
            return Ok(PurgeOutcome::Skipped);
        }
        self.active_session()?;

        tracing::info!("deleting {} from container", case_name);
        let container = &self.descriptor.container_name;
        let blobs = self
            .storage
            .list_blobs(container, Some(&case_prefix(&case_name)), MAX_LIST_RESULTS)
            .await?;
        for blob in &blobs {
            tracing::debug!("deleting file {}", blob.name);
            self.storage.delete_blob(container, &blob.name).await?;
        }

        self.ledger.remove(&case_name);
        self.flush_ledger().await?;
        tracing::info!("done deleting directory {}", case_name);

        Ok(PurgeOutcome::Purged {
            case_name,
            deleted: blobs.len(),
        })
    }

    async fn upload_files(
        &self,
        parent: &Path,
        files: &[PathBuf],
        uploaded: &mut Vec<String>,
    ) -> AppResult<()> {
        let container = &self.descriptor.container_name;
        for file in files {
            let blob_name = blob_name_for(parent, file)?;
            tracing::debug!("uploading file {}", file.display());
            self.storage.upload_blob(container, &blob_name, file).await?;
            uploaded.push(blob_name);
        }
        Ok(())
    }

    async fn discard_blobs(&self, blob_names: &[String]) {
        let container = &self.descriptor.container_name;
        for name in blob_names {
            if let Err(err) = self.storage.delete_blob(container, name).await {
                tracing::warn!("failed to remove partially staged blob {}: {}", name, err);
            }
        }
    }

    fn missing_case(&self, case_name: &str, ignore_missing: bool) -> AppResult<()> {
        if ignore_missing {
            tracing::warn!(
                "directory {} is not in container {}; skip",
                case_name,
                self.descriptor.container_name
            );
            return Ok(());
        }
        tracing::error!(
            "directory {} is not in container {}",
            case_name,
            self.descriptor.container_name
        );
        Err(AppError::not_found(format!(
            "case '{case_name}' is not staged in container {}",
            self.descriptor.container_name
        )))
    }
}
