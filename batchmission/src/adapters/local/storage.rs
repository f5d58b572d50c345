// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use walkdir::WalkDir;

use super::io_error;
use crate::app::errors::{AppError, AppResult};
use crate::app::ports::BlobStoragePort;
use crate::app::types::{BlobItem, ContainerPermissions};

const DEFAULT_ACCOUNT_KEY: &[u8] = b"batchmission-local-account";
const SAS_VERSION: &str = "local";

/// Blob store whose containers are directories below `root/containers`.
///
/// A blob name maps to a relative file path, so `a` and `a/b` cannot coexist
/// in one container.
#[derive(Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    account_key: Vec<u8>,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            account_key: DEFAULT_ACCOUNT_KEY.to_vec(),
        }
    }

    #[cfg(test)]
    pub fn with_account_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.account_key = key.into();
        self
    }

    fn container_dir(&self, container: &str) -> AppResult<PathBuf> {
        validate_container_name(container)?;
        Ok(self.root.join("containers").join(container))
    }

    fn existing_container_dir(&self, container: &str) -> AppResult<PathBuf> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(AppError::not_found(format!(
                "The specified container does not exist: {container}"
            )));
        }
        Ok(dir)
    }

    fn blob_path(&self, container: &str, name: &str) -> AppResult<PathBuf> {
        let mut path = self.existing_container_dir(container)?;
        for seg in name.split('/') {
            if seg.is_empty() || seg == "." || seg == ".." {
                return Err(AppError::invalid_argument(format!(
                    "invalid blob name '{name}'"
                )));
            }
            path.push(seg);
        }
        Ok(path)
    }

    fn signature(&self, container: &str, permissions: &str, start: &str, expiry: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.account_key);
        for part in [container, permissions, start, expiry] {
            hasher.update(b"\n");
            hasher.update(part.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

fn validate_container_name(container: &str) -> AppResult<()> {
    let valid_len = (3..=63).contains(&container.len());
    let valid_chars = container
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_len || !valid_chars || container.starts_with('-') || container.contains("--") {
        return Err(AppError::invalid_argument(format!(
            "invalid container name '{container}'"
        )));
    }
    Ok(())
}

fn format_sas_time(ts: OffsetDateTime) -> AppResult<String> {
    ts.format(&Rfc3339)
        .map_err(|err| AppError::local(format!("failed to format SAS timestamp: {err}")))
}

#[async_trait]
impl BlobStoragePort for LocalBlobStore {
    async fn container_exists(&self, container: &str) -> AppResult<bool> {
        Ok(self.container_dir(container)?.is_dir())
    }

    #[tracing::instrument(name = "blob", level = "debug", skip(self), fields(op = "create_container"))]
    async fn create_container(&self, container: &str, fail_on_exist: bool) -> AppResult<bool> {
        let dir = self.container_dir(container)?;
        if dir.is_dir() {
            if fail_on_exist {
                return Err(AppError::already_exists(format!(
                    "The specified container already exists: {container}"
                )));
            }
            return Ok(false);
        }
        std::fs::create_dir_all(&dir).map_err(|err| io_error("create", &dir, err))?;
        Ok(true)
    }

    #[tracing::instrument(name = "blob", level = "debug", skip(self), fields(op = "delete_container"))]
    async fn delete_container(&self, container: &str, fail_not_exist: bool) -> AppResult<bool> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            if fail_not_exist {
                return Err(AppError::not_found(format!(
                    "The specified container does not exist: {container}"
                )));
            }
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir).map_err(|err| io_error("remove", &dir, err))?;
        Ok(true)
    }

    fn generate_container_sas(
        &self,
        container: &str,
        permissions: ContainerPermissions,
        start: OffsetDateTime,
        expiry: OffsetDateTime,
    ) -> AppResult<String> {
        if expiry <= start {
            return Err(AppError::invalid_argument(
                "SAS expiry must be later than its start",
            ));
        }
        let perms = permissions.as_sas_str();
        let st = format_sas_time(start)?;
        let se = format_sas_time(expiry)?;
        let sig = self.signature(container, &perms, &st, &se);
        Ok(format!("sv={SAS_VERSION}&sp={perms}&st={st}&se={se}&sig={sig}"))
    }

    fn container_url(&self, container: &str, token: &str) -> String {
        let dir = self.root.join("containers").join(container);
        format!("file://{}?restype=container&{token}", dir.display())
    }

    #[tracing::instrument(name = "blob", level = "debug", skip(self), fields(op = "list_blobs"))]
    async fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
        max_results: usize,
    ) -> AppResult<Vec<BlobItem>> {
        let dir = self.existing_container_dir(container)?;
        let mut items = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                AppError::backend(format!("failed to list {}: {err}", dir.display()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let name = rel
                .iter()
                .map(|seg| seg.to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if prefix.is_some_and(|p| !name.starts_with(p)) {
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|err| AppError::backend(format!("failed to stat blob {name}: {err}")))?;
            let last_modified = meta
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
            items.push(BlobItem {
                name,
                content_length: meta.len(),
                last_modified,
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items.truncate(max_results);
        Ok(items)
    }

    async fn blob_exists(&self, container: &str, name: &str) -> AppResult<bool> {
        Ok(self.blob_path(container, name)?.is_file())
    }

    #[tracing::instrument(name = "blob", level = "debug", skip(self, local_file), fields(op = "upload_blob"))]
    async fn upload_blob(&self, container: &str, name: &str, local_file: &Path) -> AppResult<()> {
        let target = self.blob_path(container, name)?;
        create_parent(&target)?;
        std::fs::copy(local_file, &target).map_err(|err| io_error("upload", local_file, err))?;
        Ok(())
    }

    #[tracing::instrument(name = "blob", level = "debug", skip(self, data), fields(op = "upload_blob_bytes", len = data.len()))]
    async fn upload_blob_bytes(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
    ) -> AppResult<()> {
        let target = self.blob_path(container, name)?;
        create_parent(&target)?;
        std::fs::write(&target, data).map_err(|err| io_error("write", &target, err))
    }

    #[tracing::instrument(name = "blob", level = "debug", skip(self, local_file), fields(op = "download_blob"))]
    async fn download_blob(
        &self,
        container: &str,
        name: &str,
        local_file: &Path,
    ) -> AppResult<()> {
        let source = self.blob_path(container, name)?;
        std::fs::copy(&source, local_file).map_err(|err| io_error("download", &source, err))?;
        Ok(())
    }

    async fn download_blob_bytes(&self, container: &str, name: &str) -> AppResult<Vec<u8>> {
        let source = self.blob_path(container, name)?;
        std::fs::read(&source).map_err(|err| io_error("read", &source, err))
    }

    #[tracing::instrument(name = "blob", level = "debug", skip(self), fields(op = "delete_blob"))]
    async fn delete_blob(&self, container: &str, name: &str) -> AppResult<()> {
        let path = self.blob_path(container, name)?;
        std::fs::remove_file(&path).map_err(|err| io_error("delete", &path, err))?;
        prune_empty_dirs(&path, &self.existing_container_dir(container)?);
        Ok(())
    }
}

fn create_parent(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| io_error("create", parent, err))?;
    }
    Ok(())
}

// blob stores have no directories; drop the ones a delete left empty
fn prune_empty_dirs(deleted: &Path, container_dir: &Path) {
    let mut dir = deleted.parent();
    while let Some(current) = dir {
        if current == container_dir || std::fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::errors::AppErrorKind;
    use tempfile::TempDir;
    use time::macros::datetime;

    #[tokio::test]
    async fn create_twice_reports_already_exists() {
        let tmp = TempDir::new().expect("tempdir");
        let store = LocalBlobStore::new(tmp.path());
        assert!(store.create_container("m-container", true).await.expect("create"));
        let err = store
            .create_container("m-container", true)
            .await
            .expect_err("duplicate");
        assert_eq!(err.kind(), AppErrorKind::AlreadyExists);
        assert!(!store.create_container("m-container", false).await.expect("lenient"));
    }

    #[tokio::test]
    async fn delete_missing_container_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let store = LocalBlobStore::new(tmp.path());
        let err = store
            .delete_container("gone-container", true)
            .await
            .expect_err("missing");
        assert_eq!(err.kind(), AppErrorKind::NotFound);
        assert!(!store.delete_container("gone-container", false).await.expect("lenient"));
    }

    #[tokio::test]
    async fn list_filters_by_prefix_and_prunes_on_delete() {
        let tmp = TempDir::new().expect("tempdir");
        let store = LocalBlobStore::new(tmp.path());
        store.create_container("m-container", true).await.expect("create");
        for name in ["c1/a.txt", "c1/sub/b.txt", "c10/x.txt", "ledger.dat"] {
            store
                .upload_blob_bytes("m-container", name, name.as_bytes().to_vec())
                .await
                .expect("upload");
        }

        let names: Vec<_> = store
            .list_blobs("m-container", Some("c1/"), 100)
            .await
            .expect("list")
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["c1/a.txt", "c1/sub/b.txt"]);
        assert_eq!(store.list_blobs("m-container", None, 2).await.expect("list").len(), 2);

        store.delete_blob("m-container", "c1/sub/b.txt").await.expect("delete");
        assert!(!tmp.path().join("containers/m-container/c1/sub").exists());
        assert!(tmp.path().join("containers/m-container/c1/a.txt").exists());
    }

    #[tokio::test]
    async fn missing_blob_download_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let store = LocalBlobStore::new(tmp.path());
        store.create_container("m-container", true).await.expect("create");
        let err = store
            .download_blob_bytes("m-container", "nope")
            .await
            .expect_err("missing");
        assert_eq!(err.kind(), AppErrorKind::NotFound);
        let err = store
            .upload_blob_bytes("m-container", "../escape", Vec::new())
            .await
            .expect_err("escape");
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);
    }

    #[test]
    fn sas_token_is_signed_and_windowed() {
        let store = LocalBlobStore::new("/backend");
        let start = datetime!(2026-01-01 0:00 UTC);
        let expiry = datetime!(2026-01-02 0:00 UTC);
        let token = store
            .generate_container_sas("m-container", ContainerPermissions::all(), start, expiry)
            .expect("sas");
        assert!(token.starts_with("sv=local&sp=rwdl&st=2026-01-01T00:00:00Z&se=2026-01-02T00:00:00Z&sig="));

        let rekeyed = LocalBlobStore::new("/backend").with_account_key("other");
        let other = rekeyed
            .generate_container_sas("m-container", ContainerPermissions::all(), start, expiry)
            .expect("sas");
        assert_ne!(token, other);

        assert!(
            store
                .generate_container_sas("m-container", ContainerPermissions::all(), expiry, start)
                .is_err()
        );
        let url = store.container_url("m-container", &token);
        assert!(url.contains("?restype=container&sv=local"));
    }

    #[test]
    fn container_names_follow_blob_rules() {
        assert!(validate_container_name("flood-study-container").is_ok());
        assert!(validate_container_name("Upper").is_err());
        assert!(validate_container_name("ab").is_err());
        assert!(validate_container_name("a--b").is_err());
    }
}
