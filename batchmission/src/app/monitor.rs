// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Read-only view of a mission's pool, job, tasks and container.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::errors::{AppErrorKind, AppResult};
use crate::app::ports::{BlobStoragePort, ClockPort, ComputePort};
use crate::app::types::{
    AllocationState, JobState, MissionDescriptor, NodeState, PoolState, TaskState,
};

use super::controller::MAX_LIST_RESULTS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeOverview {
    pub total: usize,
    pub running: usize,
    pub idle: usize,
    pub error: usize,
    pub other: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOverview {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskOverview {
    /// Tasks that still need a node: queued, preparing or running.
    pub fn unfinished(&self) -> usize {
        self.total
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }
}

/// Aggregate of the blobs below one top-level prefix of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSummary {
    pub name: String,
    pub blobs: usize,
    pub total_bytes: u64,
    pub last_modified: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionReport {
    pub mission: String,
    pub generated_at: OffsetDateTime,
    pub pool: Option<(PoolState, AllocationState)>,
    pub nodes: NodeOverview,
    pub job: Option<JobState>,
    pub tasks: TaskOverview,
    pub container_available: bool,
    pub dirs: Vec<DirSummary>,
}

pub struct MissionMonitor {
    descriptor: MissionDescriptor,
    compute: Arc<dyn ComputePort>,
    storage: Arc<dyn BlobStoragePort>,
    clock: Arc<dyn ClockPort>,
}

impl MissionMonitor {
    pub fn new(
        descriptor: MissionDescriptor,
        compute: Arc<dyn ComputePort>,
        storage: Arc<dyn BlobStoragePort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            descriptor,
            compute,
            storage,
            clock,
        }
    }

    /// `None` when the pool does not exist.
    pub async fn pool_status(&self) -> AppResult<Option<(PoolState, AllocationState)>> {
        let pool_id = &self.descriptor.pool_name;
        if !self.compute.pool_exists(pool_id).await? {
            return Ok(None);
        }
        let info = self.compute.get_pool(pool_id).await?;
        Ok(Some((info.state, info.allocation_state)))
    }

    pub async fn node_overview(&self) -> AppResult<NodeOverview> {
        let pool_id = &self.descriptor.pool_name;
        if !self.compute.pool_exists(pool_id).await? {
            return Ok(NodeOverview::default());
        }
        let nodes = self.compute.list_nodes(pool_id).await?;
        let mut overview = NodeOverview {
            total: nodes.len(),
            ..NodeOverview::default()
        };
        for node in &nodes {
            match node.state {
                NodeState::Running => overview.running += 1,
                NodeState::Idle => overview.idle += 1,
                NodeState::Unusable | NodeState::StartTaskFailed | NodeState::Offline => {
                    overview.error += 1
                }
                NodeState::Creating | NodeState::Starting | NodeState::LeavingPool => {
                    overview.other += 1
                }
            }
        }
        Ok(overview)
    }

    /// `None` when the job does not exist.
    pub async fn job_status(&self) -> AppResult<Option<JobState>> {
        match self.compute.get_job(&self.descriptor.job_name).await {
            Ok(job) => Ok(Some(job.state)),
            Err(err) if err.kind() == AppErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// State of every task in the mission job, keyed by task id.
    pub async fn task_states(&self) -> AppResult<BTreeMap<String, TaskState>> {
        let tasks = match self.compute.list_tasks(&self.descriptor.job_name).await {
            Ok(tasks) => tasks,
            Err(err) if err.kind() == AppErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err),
        };
        Ok(tasks
            .iter()
            .map(|task| (task.id.clone(), task.effective_state()))
            .collect())
    }

    pub async fn task_overview(&self) -> AppResult<TaskOverview> {
        let states = self.task_states().await?;
        let mut overview = TaskOverview {
            total: states.len(),
            ..TaskOverview::default()
        };
        for state in states.values() {
            match state {
                TaskState::Running => overview.running += 1,
                TaskState::Completed => overview.completed += 1,
                TaskState::Failed => overview.failed += 1,
                TaskState::Active | TaskState::Preparing => {}
            }
        }
        Ok(overview)
    }

    pub async fn container_status(&self) -> AppResult<bool> {
        self.storage
            .container_exists(&self.descriptor.container_name)
            .await
    }

    /// Top-level directories of the container, sorted by name.
    pub async fn container_dirs(&self) -> AppResult<Vec<DirSummary>> {
        let container = &self.descriptor.container_name;
        if !self.storage.container_exists(container).await? {
            return Ok(Vec::new());
        }
        let blobs = self
            .storage
            .list_blobs(container, None, MAX_LIST_RESULTS)
            .await?;

        let mut dirs: BTreeMap<String, DirSummary> = BTreeMap::new();
        for blob in blobs {
            // root-level blobs (the ledger among them) belong to no directory
            let Some((dir, _)) = blob.name.split_once('/') else {
                continue;
            };
            let entry = dirs.entry(dir.to_string()).or_insert_with(|| DirSummary {
                name: dir.to_string(),
                blobs: 0,
                total_bytes: 0,
                last_modified: OffsetDateTime::UNIX_EPOCH,
            });
            entry.blobs += 1;
            entry.total_bytes += blob.content_length;
            entry.last_modified = entry.last_modified.max(blob.last_modified);
        }
        Ok(dirs.into_values().collect())
    }

    pub async fn report(&self) -> AppResult<MissionReport> {
        Ok(MissionReport {
            mission: self.descriptor.name.clone(),
            generated_at: self.clock.now_utc(),
            pool: self.pool_status().await?,
            nodes: self.node_overview().await?,
            job: self.job_status().await?,
            tasks: self.task_overview().await?,
            container_available: self.container_status().await?,
            dirs: self.container_dirs().await?,
        })
    }
}

fn format_time(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

impl fmt::Display for MissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mission: {} (as of {})", self.mission, format_time(self.generated_at))?;
        match self.pool {
            Some((state, allocation)) => {
                writeln!(f, "Pool: {} ({})", state.as_str(), allocation.as_str())?
            }
            None => writeln!(f, "Pool: not exist")?,
        }
        writeln!(
            f,
            "Nodes: total {}, running {}, idle {}, error {}, other {}",
            self.nodes.total, self.nodes.running, self.nodes.idle, self.nodes.error, self.nodes.other
        )?;
        match self.job {
            Some(state) => writeln!(f, "Job: {}", state.as_str())?,
            None => writeln!(f, "Job: not exist")?,
        }
        writeln!(
            f,
            "Tasks: total {}, running {}, completed {}, failed {}",
            self.tasks.total, self.tasks.running, self.tasks.completed, self.tasks.failed
        )?;
        if !self.container_available {
            return write!(f, "Container: not exist");
        }
        write!(f, "Container: available, {} directories", self.dirs.len())?;
        for dir in &self.dirs {
            write!(
                f,
                "\n  {}: {:.1} MB in {} files, last modified {}",
                dir.name,
                dir.total_bytes as f64 / (1024.0 * 1024.0),
                dir.blobs,
                format_time(dir.last_modified)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::{LocalBatchService, LocalBlobStore};
    use crate::adapters::time::SystemClock;
    use crate::app::services::ledger::LEDGER_BLOB_NAME;
    use crate::app::types::{JobSpec, TaskContainerSettings, TaskSpec};
    use tempfile::TempDir;

    fn task(id: &str) -> TaskSpec {
        TaskSpec {
            id: id.to_string(),
            command_line: "true".to_string(),
            container_settings: TaskContainerSettings {
                image_name: "img".to_string(),
                run_options: String::new(),
            },
            resource_files: Vec::new(),
            output_files: Vec::new(),
        }
    }

    fn monitor(root: &TempDir) -> (MissionMonitor, Arc<LocalBatchService>, Arc<LocalBlobStore>) {
        let descriptor = MissionDescriptor::new("mon", 2).expect("descriptor");
        let compute = Arc::new(LocalBatchService::new(root.path().join("batch")));
        let storage = Arc::new(LocalBlobStore::new(root.path().join("blobs")));
        let monitor = MissionMonitor::new(
            descriptor,
            compute.clone(),
            storage.clone(),
            Arc::new(SystemClock),
        );
        (monitor, compute, storage)
    }

    #[test]
    fn unfinished_excludes_completed_and_failed() {
        let overview = TaskOverview {
            total: 7,
            running: 2,
            completed: 3,
            failed: 1,
        };
        assert_eq!(overview.unfinished(), 3);
    }

    #[tokio::test]
    async fn missing_resources_report_not_exist() {
        let tmp = TempDir::new().expect("tempdir");
        let (monitor, _, _) = monitor(&tmp);
        let report = monitor.report().await.expect("report");
        assert_eq!(report.pool, None);
        assert_eq!(report.job, None);
        assert_eq!(report.tasks, TaskOverview::default());
        assert!(!report.container_available);
        let rendered = report.to_string();
        assert!(rendered.contains("Pool: not exist"));
        assert!(rendered.contains("Container: not exist"));
    }

    #[tokio::test]
    async fn tasks_and_dirs_are_summarized() {
        let tmp = TempDir::new().expect("tempdir");
        let (monitor, compute, storage) = monitor(&tmp);
        compute
            .add_job(&JobSpec {
                id: "mon-job".to_string(),
                pool_id: "mon-pool".to_string(),
            })
            .await
            .expect("job");
        compute.add_task("mon-job", &task("c1")).await.expect("c1");
        compute.add_task("mon-job", &task("c2")).await.expect("c2");

        storage
            .create_container("mon-container", true)
            .await
            .expect("container");
        for (name, data) in [
            ("c1/a.txt", b"abc".to_vec()),
            ("c1/sub/b.txt", b"de".to_vec()),
            ("c2/x.txt", b"f".to_vec()),
            (LEDGER_BLOB_NAME, b"{}".to_vec()),
        ] {
            storage
                .upload_blob_bytes("mon-container", name, data)
                .await
                .expect("upload");
        }

        let overview = monitor.task_overview().await.expect("tasks");
        assert_eq!(overview.total, 2);
        assert_eq!(overview.unfinished(), 2);
        assert_eq!(monitor.job_status().await.expect("job"), Some(JobState::Active));

        let dirs = monitor.container_dirs().await.expect("dirs");
        let names: Vec<_> = dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["c1", "c2"]);
        assert_eq!(dirs[0].blobs, 2);
        assert_eq!(dirs[0].total_bytes, 5);
        assert_eq!(dirs[1].total_bytes, 1);
    }
}
