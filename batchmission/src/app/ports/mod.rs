// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod blob_storage;
pub mod clock;
pub mod compute;
pub mod local_fs;

pub use blob_storage::BlobStoragePort;
pub use clock::ClockPort;
pub use compute::ComputePort;
pub use local_fs::LocalFilesystemPort;
