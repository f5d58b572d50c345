// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Filesystem emulation of the batch and blob services.
//!
//! Both adapters keep their state below a single backend directory so a
//! mission can be provisioned, staged and inspected without cloud access.

mod compute;
mod storage;

pub use compute::LocalBatchService;
pub use storage::LocalBlobStore;

use std::path::Path;

use crate::app::errors::AppError;

fn io_error(action: &str, path: &Path, err: std::io::Error) -> AppError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return AppError::not_found(format!("failed to {action} {}: {err}", path.display()));
    }
    AppError::backend(format!("failed to {action} {}: {err}", path.display()))
}
