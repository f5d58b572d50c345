// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Mission lifecycle controller.
//!
//! `MissionController` owns one mission's descriptor, upload ledger and
//! container session. Every mutating operation takes `&mut self`, so a
//! controller is the single writer of its ledger. The operations are split by
//! concern: pool and job provisioning, container lifecycle and ledger
//! persistence, directory staging, task submission and watching tasks finish.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::monitor::MissionMonitor;
use crate::app::ports::{BlobStoragePort, ClockPort, ComputePort, LocalFilesystemPort};
use crate::app::services::case_paths::{absolutize, normalize_path};
use crate::app::services::ledger::UploadLedger;
use crate::app::types::{ContainerSession, ControllerPolicy, MissionDescriptor};

mod completion;
mod job;
mod pool;
mod staging;
mod storage;
mod tasks;


/// Upper bound on blobs listed under one case prefix.
pub const MAX_LIST_RESULTS: usize = 50_000;

pub struct MissionController {
    descriptor: MissionDescriptor,
    compute: Arc<dyn ComputePort>,
    storage: Arc<dyn BlobStoragePort>,
    local_fs: Arc<dyn LocalFilesystemPort>,
    clock: Arc<dyn ClockPort>,
    policy: ControllerPolicy,
    cancel: Option<watch::Receiver<bool>>,
    ledger: UploadLedger,
    session: Option<ContainerSession>,
    downloaded: BTreeSet<String>,
}

impl MissionController {
    pub fn new(
        descriptor: MissionDescriptor,
        compute: Arc<dyn ComputePort>,
        storage: Arc<dyn BlobStoragePort>,
        local_fs: Arc<dyn LocalFilesystemPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            descriptor,
            compute,
            storage,
            local_fs,
            clock,
            policy: ControllerPolicy::default(),
            cancel: None,
            ledger: UploadLedger::new(),
            session: None,
            downloaded: BTreeSet::new(),
        }
    }

    pub fn with_policy(mut self, policy: ControllerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Waits abort with `AppErrorKind::Cancelled` once `true` is sent.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn descriptor(&self) -> &MissionDescriptor {
        &self.descriptor
    }

    pub fn policy(&self) -> &ControllerPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &UploadLedger {
        &self.ledger
    }

    pub fn session(&self) -> Option<&ContainerSession> {
        self.session.as_ref()
    }

    /// Cases fetched by this controller so far.
    pub fn downloaded(&self) -> &BTreeSet<String> {
        &self.downloaded
    }

    fn monitor(&self) -> MissionMonitor {
        MissionMonitor::new(
            self.descriptor.clone(),
            self.compute.clone(),
            self.storage.clone(),
            self.clock.clone(),
        )
    }

    async fn resolve_case_dir(&self, path: &Path) -> AppResult<PathBuf> {
        if path.is_absolute() {
            return Ok(normalize_path(path));
        }
        let cwd = self.local_fs.current_dir().await?;
        Ok(absolutize(path, &cwd))
    }

    /// Sleeps for `interval` unless the cancellation channel fires first.
    async fn pause(&self, interval: Duration, waiting_for: &str) -> AppResult<()> {
        let deadline = Instant::now() + interval;
        let Some(cancel) = self.cancel.as_ref() else {
            sleep_until(deadline).await;
            return Ok(());
        };
        let mut cancel = cancel.clone();
        loop {
            if *cancel.borrow_and_update() {
                return Err(AppError::with_message(
                    AppErrorKind::Cancelled,
                    codes::CANCELED,
                    format!("canceled while waiting for {waiting_for}"),
                ));
            }
            tokio::select! {
                _ = sleep_until(deadline) => return Ok(()),
                changed = cancel.changed() => {
                    if changed.is_err() {
                        // sender dropped, nothing can cancel this wait any more
                        sleep_until(deadline).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}
