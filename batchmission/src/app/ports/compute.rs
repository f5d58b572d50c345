// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{
    JobInfo, JobSpec, NodeInfo, PoolInfo, PoolSpec, ResizeRequest, TaskInfo, TaskSpec,
};

#[async_trait]
/// Batch compute service boundary: pools, jobs and tasks.
/// Creation calls report a duplicate with `AppErrorKind::AlreadyExists`;
/// lookups of unknown ids report `AppErrorKind::NotFound`.
pub trait ComputePort: Send + Sync {
    async fn pool_exists(&self, pool_id: &str) -> AppResult<bool>;
    async fn get_pool(&self, pool_id: &str) -> AppResult<PoolInfo>;
    async fn add_pool(&self, spec: &PoolSpec) -> AppResult<()>;
    async fn resize_pool(&self, pool_id: &str, request: &ResizeRequest) -> AppResult<()>;
    async fn stop_resize(&self, pool_id: &str) -> AppResult<()>;
    async fn delete_pool(&self, pool_id: &str) -> AppResult<()>;
    async fn list_nodes(&self, pool_id: &str) -> AppResult<Vec<NodeInfo>>;

    async fn add_job(&self, spec: &JobSpec) -> AppResult<()>;
    async fn get_job(&self, job_id: &str) -> AppResult<JobInfo>;
    async fn delete_job(&self, job_id: &str) -> AppResult<()>;

    async fn add_task(&self, job_id: &str, task: &TaskSpec) -> AppResult<()>;
    async fn list_tasks(&self, job_id: &str) -> AppResult<Vec<TaskInfo>>;
}
