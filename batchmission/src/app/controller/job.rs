// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::{AppError, AppResult};
use crate::app::types::JobSpec;

use super::MissionController;

/// Message some batch backends return instead of a structured conflict code.
const JOB_EXISTS_MESSAGE_PREFIX: &str = "The specified job already exists";

impl MissionController {
    /// Creates the job bound to the mission pool; an existing job counts as success.
    pub async fn ensure_job(&self) -> AppResult<()> {
        let spec = JobSpec {
            id: self.descriptor.job_name.clone(),
            pool_id: self.descriptor.pool_name.clone(),
        };
        tracing::info!("issuing creation to job {}", spec.id);
        match self.compute.add_job(&spec).await {
            Ok(()) => {
                tracing::info!("creation command issued to job {}", spec.id);
                Ok(())
            }
            Err(err) if job_already_exists(&err) => {
                tracing::info!("job {} already exists; skip creation", spec.id);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn delete_job(&self) -> AppResult<()> {
        tracing::info!("issuing deletion to job {}", self.descriptor.job_name);
        self.compute.delete_job(&self.descriptor.job_name).await?;
        tracing::info!("deletion command issued to job {}", self.descriptor.job_name);
        Ok(())
    }
}

fn job_already_exists(err: &AppError) -> bool {
    err.is_already_exists() || err.message().starts_with(JOB_EXISTS_MESSAGE_PREFIX)
}
