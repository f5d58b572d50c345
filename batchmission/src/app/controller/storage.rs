// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::case_paths::strip_restype;
use crate::app::services::ledger::{LEDGER_BLOB_NAME, UploadLedger};
use crate::app::types::{ContainerOutcome, ContainerPermissions, ContainerSession};

use super::MissionController;

impl MissionController {
    /// Creates the mission container, recovering the ledger when it already exists,
    /// and issues the container session.
    #[tracing::instrument(name = "container", level = "debug", skip(self), fields(container = %self.descriptor.container_name))]
    pub async fn ensure_container(&mut self) -> AppResult<ContainerOutcome> {
        let container = self.descriptor.container_name.clone();
        tracing::info!("creating container {}", container);
        let outcome = match self.storage.create_container(&container, true).await {
            Ok(_) => self.fresh_container(),
            Err(err) => match err.kind() {
                AppErrorKind::AlreadyExists => self.recover_existing_container(&container).await?,
                AppErrorKind::BeingDeleted => self.retry_container_creation(&container).await?,
                _ => return Err(err),
            },
        };
        tracing::info!("container {} created/exists", container);
        self.issue_session()?;
        Ok(outcome)
    }

    /// Opens an existing mission container without creating it, recovering the
    /// ledger and issuing a session. Returns the number of recovered cases.
    #[tracing::instrument(name = "container", level = "debug", skip(self), fields(container = %self.descriptor.container_name))]
    pub async fn attach_container(&mut self) -> AppResult<usize> {
        let container = &self.descriptor.container_name;
        if !self.storage.container_exists(container).await? {
            return Err(AppError::not_found(format!(
                "container {container} does not exist; start the mission first"
            )));
        }
        let recovered_cases = self.reload_ledger().await?;
        self.issue_session()?;
        Ok(recovered_cases)
    }

    /// Deletes the mission container. A missing container is an error.
    pub async fn delete_container(&mut self) -> AppResult<()> {
        let container = &self.descriptor.container_name;
        tracing::info!("issuing deletion to container {}", container);
        self.storage.delete_container(container, true).await?;
        self.session = None;
        self.ledger.clear();
        tracing::info!("deletion issued to container {}", container);
        Ok(())
    }

    /// Replaces the in-memory ledger with the copy stored in the container.
    /// A missing ledger blob yields an empty ledger.
    pub async fn reload_ledger(&mut self) -> AppResult<usize> {
        let container = &self.descriptor.container_name;
        if !self.storage.blob_exists(container, LEDGER_BLOB_NAME).await? {
            self.ledger = UploadLedger::new();
            return Ok(0);
        }
        tracing::info!("downloading {} to recover staged cases", LEDGER_BLOB_NAME);
        let bytes = self
            .storage
            .download_blob_bytes(container, LEDGER_BLOB_NAME)
            .await?;
        self.ledger = UploadLedger::from_bytes(&bytes)?;
        tracing::info!("recovered {} staged cases", self.ledger.len());
        Ok(self.ledger.len())
    }

    /// Overwrites the stored ledger blob with the in-memory ledger.
    pub async fn flush_ledger(&self) -> AppResult<()> {
        let bytes = self.ledger.to_bytes()?;
        tracing::debug!("uploading {} ({} bytes)", LEDGER_BLOB_NAME, bytes.len());
        self.storage
            .upload_blob_bytes(&self.descriptor.container_name, LEDGER_BLOB_NAME, bytes)
            .await
    }

    /// Session for blob operations, re-issued when close to expiry.
    pub(super) fn active_session(&mut self) -> AppResult<ContainerSession> {
        let Some(session) = self.session.as_ref() else {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::NO_CONTAINER_SESSION,
                format!(
                    "container {} has no session; ensure the container first",
                    self.descriptor.container_name
                ),
            ));
        };
        if session.remaining(self.clock.now_utc()) > self.policy.sas_renew_margin {
            return Ok(session.clone());
        }
        tracing::info!(
            "container session for {} expires at {}; renewing",
            self.descriptor.container_name,
            session.expires_at
        );
        self.issue_session()
    }

    fn fresh_container(&mut self) -> ContainerOutcome {
        // nothing can be staged in a container that did not exist
        self.ledger.clear();
        ContainerOutcome::Created
    }

    async fn recover_existing_container(&mut self, container: &str) -> AppResult<ContainerOutcome> {
        tracing::info!("container {} already exists; skip creation", container);
        // an existing container without a ledger blob holds no staged cases
        let recovered_cases = self.reload_ledger().await?;
        Ok(ContainerOutcome::Existing { recovered_cases })
    }

    async fn retry_container_creation(&mut self, container: &str) -> AppResult<ContainerOutcome> {
        let attempts = self.policy.container_retry_attempts;
        let interval = self.policy.container_retry_interval;
        for attempt in 1..=attempts {
            tracing::warn!(
                "container {} is undergoing deletion; retry {}/{} in {}s",
                container,
                attempt,
                attempts,
                interval.as_secs()
            );
            self.pause(interval, "container deletion").await?;
            match self.storage.create_container(container, true).await {
                Ok(_) => return Ok(self.fresh_container()),
                Err(err) => match err.kind() {
                    AppErrorKind::BeingDeleted => continue,
                    AppErrorKind::AlreadyExists => {
                        return self.recover_existing_container(container).await;
                    }
                    _ => return Err(err),
                },
            }
        }
        tracing::error!("retry timeout; re-creating container {} failed", container);
        Err(AppError::with_message(
            AppErrorKind::Timeout,
            codes::TIMEOUT,
            format!(
                "container {container} has been undergoing deletion for over {} seconds; check its status manually",
                interval.as_secs() * u64::from(attempts)
            ),
        ))
    }

    fn issue_session(&mut self) -> AppResult<ContainerSession> {
        let container = &self.descriptor.container_name;
        let starts_at = self.clock.now_utc();
        let expires_at = starts_at
            .checked_add(self.policy.sas_validity)
            .ok_or_else(|| {
                AppError::with_message(
                    AppErrorKind::InvalidArgument,
                    codes::INVALID_ARGUMENT,
                    format!(
                        "container session validity of {} overflows the clock",
                        self.policy.sas_validity
                    ),
                )
            })?;
        let token = self.storage.generate_container_sas(
            container,
            ContainerPermissions::all(),
            starts_at,
            expires_at,
        )?;
        let container_url = strip_restype(&self.storage.container_url(container, &token));
        tracing::info!("SAS token and URL for {} obtained", container);
        let session = ContainerSession {
            container_url,
            token,
            starts_at,
            expires_at,
        };
        self.session = Some(session.clone());
        Ok(session)
    }
}
