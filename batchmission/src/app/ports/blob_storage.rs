// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::app::errors::AppResult;
use crate::app::types::{BlobItem, ContainerPermissions};

#[async_trait]
/// Blob storage boundary scoped by container name.
/// Errors carry a structured kind: `AlreadyExists` and `BeingDeleted` for
/// container conflicts, `NotFound` for missing containers or blobs, and
/// `Backend` for everything else.
pub trait BlobStoragePort: Send + Sync {
    async fn container_exists(&self, container: &str) -> AppResult<bool>;

    /// Returns `Ok(false)` when the container exists and `fail_on_exist` is unset.
    async fn create_container(&self, container: &str, fail_on_exist: bool) -> AppResult<bool>;

    /// Returns `Ok(false)` when the container is missing and `fail_not_exist` is unset.
    async fn delete_container(&self, container: &str, fail_not_exist: bool) -> AppResult<bool>;

    fn generate_container_sas(
        &self,
        container: &str,
        permissions: ContainerPermissions,
        start: OffsetDateTime,
        expiry: OffsetDateTime,
    ) -> AppResult<String>;

    fn container_url(&self, container: &str, token: &str) -> String;

    async fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
        max_results: usize,
    ) -> AppResult<Vec<BlobItem>>;

    async fn blob_exists(&self, container: &str, name: &str) -> AppResult<bool>;
    async fn upload_blob(&self, container: &str, name: &str, local_file: &Path) -> AppResult<()>;
    async fn upload_blob_bytes(&self, container: &str, name: &str, data: Vec<u8>)
    -> AppResult<()>;
    async fn download_blob(&self, container: &str, name: &str, local_file: &Path)
    -> AppResult<()>;
    async fn download_blob_bytes(&self, container: &str, name: &str) -> AppResult<Vec<u8>>;
    async fn delete_blob(&self, container: &str, name: &str) -> AppResult<()>;
}
