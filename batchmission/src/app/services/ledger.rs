// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Record of which case directories are staged in a mission container.
//!
//! The ledger maps a case base name to the absolute parent directory it was
//! staged from. Its serialized form is a JSON object stored wholesale as the
//! `uploaded_dirs.dat` blob next to the data it describes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};

pub const LEDGER_BLOB_NAME: &str = "uploaded_dirs.dat";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadLedger {
    entries: BTreeMap<String, PathBuf>,
}

impl UploadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, case_name: &str) -> bool {
        self.entries.contains_key(case_name)
    }

    pub fn parent_of(&self, case_name: &str) -> Option<&Path> {
        self.entries.get(case_name).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, parent)| (name.as_str(), parent.as_path()))
    }

    /// Adds a case; a second case with the same base name is a conflict.
    pub fn insert(&mut self, case_name: &str, parent: &Path) -> AppResult<()> {
        if let Some(existing) = self.entries.get(case_name) {
            return Err(duplicate_case(case_name, existing));
        }
        self.entries
            .insert(case_name.to_string(), parent.to_path_buf());
        Ok(())
    }

    pub fn remove(&mut self, case_name: &str) -> Option<PathBuf> {
        self.entries.remove(case_name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|err| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::LEDGER_CORRUPT,
                format!("failed to serialize upload ledger: {err}"),
            )
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::LEDGER_CORRUPT,
                format!("failed to parse {LEDGER_BLOB_NAME}: {err}"),
            )
        })
    }
}

pub fn duplicate_case(case_name: &str, existing_parent: &Path) -> AppError {
    AppError::with_message(
        AppErrorKind::Conflict,
        codes::DUPLICATE_CASE,
        format!(
            "a case named '{case_name}' is already staged from '{}'; case names must be unique within a mission",
            existing_parent.display()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicate_base_names() {
        let mut ledger = UploadLedger::new();
        ledger.insert("c1", Path::new("/a")).unwrap();
        let err = ledger.insert("c1", Path::new("/b")).unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Conflict);
        assert_eq!(err.code(), codes::DUPLICATE_CASE);
        assert_eq!(ledger.parent_of("c1"), Some(Path::new("/a")));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn serialized_form_is_a_flat_json_object() {
        let mut ledger = UploadLedger::new();
        ledger.insert("c2", Path::new("/runs/b")).unwrap();
        ledger.insert("c1", Path::new("/runs/a")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&ledger.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"c1": "/runs/a", "c2": "/runs/b"})
        );
        let restored = UploadLedger::from_bytes(&ledger.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, ledger);
    }

    #[test]
    fn corrupt_bytes_are_reported() {
        let err = UploadLedger::from_bytes(b"\x80\x04pickle").unwrap_err();
        assert_eq!(err.code(), codes::LEDGER_CORRUPT);
    }

    #[test]
    fn remove_returns_recorded_parent() {
        let mut ledger = UploadLedger::new();
        ledger.insert("c1", Path::new("/a")).unwrap();
        assert_eq!(ledger.remove("c1"), Some(PathBuf::from("/a")));
        assert!(ledger.remove("c1").is_none());
        assert!(ledger.is_empty());
    }
}
