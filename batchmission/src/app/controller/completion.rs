// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeSet;

use crate::app::errors::AppResult;
use crate::app::services::fetch_filter::FetchFilter;
use crate::app::types::{FetchOutcome, TaskState, WatchOptions, WatchSummary};

use super::MissionController;

impl MissionController {
    /// Polls the mission job every `options.cycle` until no task is unfinished.
    ///
    /// Each cycle fetches the cases whose tasks completed or failed since the
    /// last one, at most once per case, and optionally resizes the pool to the
    /// unfinished task count. Cancellation aborts between cycles.
    #[tracing::instrument(name = "watch", level = "debug", skip(self, filter), fields(job = %self.descriptor.job_name))]
    pub async fn watch_until_done(
        &mut self,
        options: WatchOptions,
        filter: &FetchFilter,
    ) -> AppResult<WatchSummary> {
        let monitor = self.monitor();
        let mut summary = WatchSummary::default();
        let mut finished = BTreeSet::new();
        loop {
            summary.cycles += 1;
            let states = monitor.task_states().await?;
            let mut unfinished = 0usize;
            for (task_id, state) in &states {
                match state {
                    TaskState::Completed | TaskState::Failed => {
                        if !finished.insert(task_id.clone()) {
                            continue;
                        }
                        if *state == TaskState::Failed {
                            tracing::warn!("task {} failed", task_id);
                            summary.failed.push(task_id.clone());
                        }
                        if !options.download || self.downloaded.contains(task_id) {
                            continue;
                        }
                        tracing::info!("task {} {}; downloading", task_id, state.as_str());
                        if self.fetch_finished_case(task_id, filter).await? {
                            summary.downloaded.push(task_id.clone());
                        }
                    }
                    TaskState::Active | TaskState::Preparing | TaskState::Running => {
                        unfinished += 1
                    }
                }
            }

            if unfinished == 0 {
                tracing::info!(
                    "all {} tasks of job {} finished",
                    states.len(),
                    self.descriptor.job_name
                );
                return Ok(summary);
            }

            if let Some(max_nodes) = options.max_nodes {
                let target = u32::try_from(unfinished).unwrap_or(u32::MAX).min(max_nodes);
                self.resize_pool(target).await?;
            }
            tracing::debug!("{} tasks unfinished; polling again", unfinished);
            self.pause(options.cycle, "tasks to finish").await?;
        }
    }

    /// Fetches a finished task's case from where it was staged.
    async fn fetch_finished_case(
        &mut self,
        case_name: &str,
        filter: &FetchFilter,
    ) -> AppResult<bool> {
        let Some(parent) = self.ledger.parent_of(case_name).map(|p| p.to_path_buf()) else {
            tracing::warn!("task {} has no staged case; nothing to download", case_name);
            // not staged by this mission, so never worth another look
            self.downloaded.insert(case_name.to_string());
            return Ok(false);
        };
        let outcome = self
            .fetch_directory_with(&parent.join(case_name), true, filter)
            .await?;
        Ok(matches!(outcome, FetchOutcome::Fetched { .. }))
    }
}
