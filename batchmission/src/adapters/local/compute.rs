// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::io_error;
use crate::app::errors::{AppError, AppResult};
use crate::app::ports::ComputePort;
use crate::app::types::{
    AllocationState, JobInfo, JobSpec, JobState, NodeInfo, NodeState, PoolInfo, PoolSpec,
    PoolState, ResizeRequest, TaskInfo, TaskSpec, TaskState,
};

const STATE_FILE: &str = "batch-state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PoolRecord {
    spec: PoolSpec,
    state: PoolState,
    allocation_state: AllocationState,
    target_dedicated_nodes: u32,
    current_dedicated_nodes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRecord {
    spec: TaskSpec,
    state: TaskState,
    #[serde(default)]
    failure_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    pool_id: String,
    state: JobState,
    #[serde(default)]
    tasks: BTreeMap<String, TaskRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BatchState {
    #[serde(default)]
    pools: BTreeMap<String, PoolRecord>,
    #[serde(default)]
    jobs: BTreeMap<String, JobRecord>,
}

/// Batch service emulator persisting pools, jobs and tasks in a JSON file.
///
/// Resizes settle immediately and tasks are only recorded, never run.
pub struct LocalBatchService {
    root: PathBuf,
    lock: Mutex<()>,
}

impl LocalBatchService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    fn load(&self) -> AppResult<BatchState> {
        let path = self.state_path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BatchState::default());
            }
            Err(err) => return Err(io_error("read", &path, err)),
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            AppError::backend(format!("corrupt batch state {}: {err}", path.display()))
        })
    }

    fn save(&self, state: &BatchState) -> AppResult<()> {
        let path = self.state_path();
        std::fs::create_dir_all(&self.root).map_err(|err| io_error("create", &self.root, err))?;
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|err| AppError::backend(format!("failed to encode batch state: {err}")))?;
        std::fs::write(&path, bytes).map_err(|err| io_error("write", &path, err))
    }

    fn read<T>(&self, f: impl FnOnce(&BatchState) -> AppResult<T>) -> AppResult<T> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        f(&self.load()?)
    }

    fn update<T>(&self, f: impl FnOnce(&mut BatchState) -> AppResult<T>) -> AppResult<T> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }
}

fn poisoned() -> AppError {
    AppError::local("batch state lock poisoned")
}

fn pool_not_found(pool_id: &str) -> AppError {
    AppError::not_found(format!("The specified pool does not exist: {pool_id}"))
}

fn job_not_found(job_id: &str) -> AppError {
    AppError::not_found(format!("The specified job does not exist: {job_id}"))
}

#[async_trait]
impl ComputePort for LocalBatchService {
    async fn pool_exists(&self, pool_id: &str) -> AppResult<bool> {
        self.read(|state| Ok(state.pools.contains_key(pool_id)))
    }

    async fn get_pool(&self, pool_id: &str) -> AppResult<PoolInfo> {
        self.read(|state| {
            let pool = state.pools.get(pool_id).ok_or_else(|| pool_not_found(pool_id))?;
            Ok(PoolInfo {
                id: pool_id.to_string(),
                state: pool.state,
                allocation_state: pool.allocation_state,
                target_dedicated_nodes: pool.target_dedicated_nodes,
                current_dedicated_nodes: pool.current_dedicated_nodes,
            })
        })
    }

    #[tracing::instrument(name = "batch", level = "debug", skip(self, spec), fields(op = "add_pool", pool = %spec.id))]
    async fn add_pool(&self, spec: &PoolSpec) -> AppResult<()> {
        self.update(|state| {
            if state.pools.contains_key(&spec.id) {
                return Err(AppError::already_exists(format!(
                    "The specified pool already exists: {}",
                    spec.id
                )));
            }
            state.pools.insert(
                spec.id.clone(),
                PoolRecord {
                    spec: spec.clone(),
                    state: PoolState::Active,
                    allocation_state: AllocationState::Steady,
                    target_dedicated_nodes: spec.target_dedicated_nodes,
                    current_dedicated_nodes: spec.target_dedicated_nodes,
                },
            );
            Ok(())
        })
    }

    #[tracing::instrument(name = "batch", level = "debug", skip(self, request), fields(op = "resize_pool", target = request.target_dedicated_nodes))]
    async fn resize_pool(&self, pool_id: &str, request: &ResizeRequest) -> AppResult<()> {
        self.update(|state| {
            let pool = state
                .pools
                .get_mut(pool_id)
                .ok_or_else(|| pool_not_found(pool_id))?;
            pool.target_dedicated_nodes = request.target_dedicated_nodes;
            pool.current_dedicated_nodes = request.target_dedicated_nodes;
            pool.allocation_state = AllocationState::Steady;
            Ok(())
        })
    }

    async fn stop_resize(&self, pool_id: &str) -> AppResult<()> {
        self.update(|state| {
            let pool = state
                .pools
                .get_mut(pool_id)
                .ok_or_else(|| pool_not_found(pool_id))?;
            pool.allocation_state = AllocationState::Steady;
            Ok(())
        })
    }

    #[tracing::instrument(name = "batch", level = "debug", skip(self), fields(op = "delete_pool"))]
    async fn delete_pool(&self, pool_id: &str) -> AppResult<()> {
        self.update(|state| {
            state
                .pools
                .remove(pool_id)
                .map(|_| ())
                .ok_or_else(|| pool_not_found(pool_id))
        })
    }

    async fn list_nodes(&self, pool_id: &str) -> AppResult<Vec<NodeInfo>> {
        self.read(|state| {
            let pool = state.pools.get(pool_id).ok_or_else(|| pool_not_found(pool_id))?;
            let busy = state
                .jobs
                .values()
                .filter(|job| job.pool_id == pool_id)
                .flat_map(|job| job.tasks.values())
                .filter(|task| task.state == TaskState::Running)
                .count();
            Ok((0..pool.current_dedicated_nodes as usize)
                .map(|idx| NodeInfo {
                    id: format!("{pool_id}-node-{idx}"),
                    state: if idx < busy {
                        NodeState::Running
                    } else {
                        NodeState::Idle
                    },
                })
                .collect())
        })
    }

    #[tracing::instrument(name = "batch", level = "debug", skip(self, spec), fields(op = "add_job", job = %spec.id))]
    async fn add_job(&self, spec: &JobSpec) -> AppResult<()> {
        self.update(|state| {
            if state.jobs.contains_key(&spec.id) {
                return Err(AppError::already_exists(format!(
                    "The specified job already exists: {}",
                    spec.id
                )));
            }
            state.jobs.insert(
                spec.id.clone(),
                JobRecord {
                    pool_id: spec.pool_id.clone(),
                    state: JobState::Active,
                    tasks: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    async fn get_job(&self, job_id: &str) -> AppResult<JobInfo> {
        self.read(|state| {
            let job = state.jobs.get(job_id).ok_or_else(|| job_not_found(job_id))?;
            Ok(JobInfo {
                id: job_id.to_string(),
                pool_id: job.pool_id.clone(),
                state: job.state,
            })
        })
    }

    #[tracing::instrument(name = "batch", level = "debug", skip(self), fields(op = "delete_job"))]
    async fn delete_job(&self, job_id: &str) -> AppResult<()> {
        self.update(|state| {
            state
                .jobs
                .remove(job_id)
                .map(|_| ())
                .ok_or_else(|| job_not_found(job_id))
        })
    }

    #[tracing::instrument(name = "batch", level = "debug", skip(self, task), fields(op = "add_task", task = %task.id))]
    async fn add_task(&self, job_id: &str, task: &TaskSpec) -> AppResult<()> {
        self.update(|state| {
            let job = state.jobs.get_mut(job_id).ok_or_else(|| job_not_found(job_id))?;
            if job.tasks.contains_key(&task.id) {
                return Err(AppError::already_exists(format!(
                    "The specified task already exists: {}",
                    task.id
                )));
            }
            job.tasks.insert(
                task.id.clone(),
                TaskRecord {
                    spec: task.clone(),
                    state: TaskState::Active,
                    failure_info: None,
                },
            );
            Ok(())
        })
    }

    async fn list_tasks(&self, job_id: &str) -> AppResult<Vec<TaskInfo>> {
        self.read(|state| {
            let job = state.jobs.get(job_id).ok_or_else(|| job_not_found(job_id))?;
            Ok(job
                .tasks
                .iter()
                .map(|(id, task)| TaskInfo {
                    id: id.clone(),
                    state: task.state,
                    failure_info: task.failure_info.clone(),
                })
                .collect())
        })
    }
}
