// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use tokio::time::Instant;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::types::{AllocationState, DeallocationOption, PoolInfo, PoolOutcome, ResizeRequest};

use super::MissionController;

impl MissionController {
    /// Creates the pool, or converges an existing one to the descriptor's node count.
    ///
    /// Creation returns once the request is accepted; nodes are not awaited.
    #[tracing::instrument(name = "pool", level = "debug", skip(self), fields(pool = %self.descriptor.pool_name))]
    pub async fn ensure_pool(&self) -> AppResult<PoolOutcome> {
        let pool_id = &self.descriptor.pool_name;
        if !self.compute.pool_exists(pool_id).await? {
            tracing::info!("issuing creation to pool {}", pool_id);
            match self.compute.add_pool(&self.descriptor.pool_spec()).await {
                Ok(()) => {
                    tracing::info!("creation command issued to pool {}", pool_id);
                    return Ok(PoolOutcome::Created);
                }
                Err(err) if err.is_already_exists() => {
                    tracing::info!("pool {} appeared concurrently; converging instead", pool_id);
                }
                Err(err) => return Err(err),
            }
        }
        self.converge_pool(self.descriptor.node_count).await
    }

    pub async fn pool_exists(&self) -> AppResult<bool> {
        self.compute.pool_exists(&self.descriptor.pool_name).await
    }

    /// Resizes an existing pool to `target` dedicated nodes.
    pub async fn resize_pool(&self, target: u32) -> AppResult<PoolOutcome> {
        let pool_id = &self.descriptor.pool_name;
        if !self.compute.pool_exists(pool_id).await? {
            return Err(AppError::not_found(format!("pool {pool_id} does not exist")));
        }
        self.converge_pool(target).await
    }

    /// Shrinks or grows the pool to match the unfinished task count, capped at `max_nodes`.
    pub async fn adapt_pool_size(&self, max_nodes: u32) -> AppResult<PoolOutcome> {
        let overview = self.monitor().task_overview().await?;
        let unfinished = u32::try_from(overview.unfinished()).unwrap_or(u32::MAX);
        let target = unfinished.min(max_nodes);
        tracing::info!(
            "adapting pool {} to {} nodes ({} unfinished tasks, cap {})",
            self.descriptor.pool_name,
            target,
            unfinished,
            max_nodes
        );
        self.resize_pool(target).await
    }

    /// Issues deletion when the pool exists; returns whether a request was sent.
    pub async fn delete_pool(&self) -> AppResult<bool> {
        let pool_id = &self.descriptor.pool_name;
        if !self.compute.pool_exists(pool_id).await? {
            tracing::info!("pool {} does not exist; skip deletion", pool_id);
            return Ok(false);
        }
        self.compute.delete_pool(pool_id).await?;
        tracing::info!("deletion command issued to pool {}", pool_id);
        Ok(true)
    }

    async fn converge_pool(&self, target: u32) -> AppResult<PoolOutcome> {
        let pool_id = &self.descriptor.pool_name;
        let info = self.compute.get_pool(pool_id).await?;
        if info.target_dedicated_nodes == target {
            tracing::info!("pool {} already targets {} nodes; skip", pool_id, target);
            return Ok(PoolOutcome::Unchanged);
        }

        let from = info.target_dedicated_nodes;
        if info.allocation_state == AllocationState::Resizing {
            tracing::info!("pool {} is resizing; stopping the current resize", pool_id);
            self.compute.stop_resize(pool_id).await?;
            self.wait_for_steady(pool_id).await?;
        }

        self.compute
            .resize_pool(
                pool_id,
                &ResizeRequest {
                    target_dedicated_nodes: target,
                    deallocation: DeallocationOption::Requeue,
                },
            )
            .await?;
        tracing::info!("resize command issued to pool {} ({} -> {})", pool_id, from, target);
        Ok(PoolOutcome::Resized { from, to: target })
    }

    async fn wait_for_steady(&self, pool_id: &str) -> AppResult<PoolInfo> {
        let start = Instant::now();
        loop {
            self.pause(self.policy.pool_poll_interval, "pool steady state")
                .await?;
            let info = self.compute.get_pool(pool_id).await?;
            if info.allocation_state == AllocationState::Steady {
                return Ok(info);
            }
            if start.elapsed() >= self.policy.pool_steady_timeout {
                return Err(AppError::with_message(
                    AppErrorKind::Timeout,
                    codes::TIMEOUT,
                    format!(
                        "pool {pool_id} did not reach a steady allocation state within {} seconds",
                        self.policy.pool_steady_timeout.as_secs()
                    ),
                ));
            }
            tracing::debug!(
                "pool {} still {}; polling again",
                pool_id,
                info.allocation_state.as_str()
            );
        }
    }
}
