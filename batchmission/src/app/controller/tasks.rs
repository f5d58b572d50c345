// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use crate::app::errors::{AppError, AppErrorKind, AppResult};
use crate::app::services::case_paths::{case_base_name, validate_task_id};
use crate::app::services::task_builder::build_task_spec;
use crate::app::types::{CaseSubmission, LaunchOptions, SubmissionOutcome, TaskSpec};

use super::MissionController;

impl MissionController {
    /// Stages a case directory and adds a task for it to the mission job.
    #[tracing::instrument(name = "submit", level = "debug", skip(self, local_path), fields(path = %local_path.display()))]
    pub async fn submit_task(&mut self, local_path: &Path) -> AppResult<TaskSpec> {
        let dir = self.resolve_case_dir(local_path).await?;
        validate_task_id(&case_base_name(&dir)?)?;

        let staged = self.stage_directory(&dir).await?;
        let session = self.active_session()?;
        let spec = build_task_spec(
            &staged.case_name,
            &session.container_url,
            &self.descriptor.task_template,
        );

        tracing::info!("adding task {} to job {}", spec.id, self.descriptor.job_name);
        self.compute.add_task(&self.descriptor.job_name, &spec).await?;
        tracing::info!("task {} added", spec.id);
        Ok(spec)
    }

    /// Submits a batch of case directories, skipping the ones `options` allows.
    pub async fn submit_cases(
        &mut self,
        case_dirs: &[PathBuf],
        options: LaunchOptions,
    ) -> AppResult<Vec<CaseSubmission>> {
        let mut submissions = Vec::with_capacity(case_dirs.len());
        for case_dir in case_dirs {
            let dir = self.resolve_case_dir(case_dir).await?;
            let case_name = case_base_name(&dir)?;

            let outcome = if !self.local_fs.is_dir(&dir).await? {
                if !options.ignore_local_missing {
                    return Err(AppError::invalid_argument(format!(
                        "case folder '{}' not found",
                        dir.display()
                    )));
                }
                tracing::warn!("case folder {} not found; skip", dir.display());
                SubmissionOutcome::SkippedMissingLocal
            } else if options.skip_staged && self.ledger.contains(&case_name) {
                tracing::info!("case {} already staged; skip", case_name);
                SubmissionOutcome::SkippedStaged
            } else {
                self.submit_task(&dir).await?;
                SubmissionOutcome::Submitted
            };
            submissions.push(CaseSubmission { case_name, outcome });
        }
        Ok(submissions)
    }

    /// Removes the container, the job and the pool, in that order.
    pub async fn teardown(&mut self) -> AppResult<()> {
        if self
            .storage
            .container_exists(&self.descriptor.container_name)
            .await?
        {
            self.delete_container().await?;
        } else {
            tracing::info!(
                "container {} does not exist; skip deletion",
                self.descriptor.container_name
            );
            self.session = None;
            self.ledger.clear();
        }

        match self.delete_job().await {
            Ok(()) => {}
            Err(err) if err.kind() == AppErrorKind::NotFound => {
                tracing::info!("job {} does not exist; skip deletion", self.descriptor.job_name);
            }
            Err(err) => return Err(err),
        }

        self.delete_pool().await?;
        Ok(())
    }
}
