// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::app::errors::{AppError, AppResult};

pub const DEFAULT_VM_SIZE: &str = "STANDARD_H8";
pub const DEFAULT_CONTAINER_IMAGE: &str = "barbagroup/landspill:bionic";
pub const DEFAULT_NODE_AGENT_SKU: &str = "batch.node.ubuntu 16.04";
pub const DEFAULT_TASK_WORKDIR: &str = "/home/landspill/geoclaw-landspill-cases";

/// Marketplace image the pool nodes boot from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl Default for ImageReference {
    fn default() -> Self {
        Self {
            publisher: "microsoft-azure-batch".to_string(),
            offer: "ubuntu-server-container".to_string(),
            sku: "16-04-lts".to_string(),
            version: "latest".to_string(),
        }
    }
}

/// How a case task runs inside its container.
///
/// `pipeline` holds the simulate, post-process and render stages, in order.
/// Each stage receives the case name as its final argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTemplate {
    pub image: String,
    pub working_dir: String,
    pub pipeline: Vec<String>,
}

impl Default for TaskTemplate {
    fn default() -> Self {
        Self {
            image: DEFAULT_CONTAINER_IMAGE.to_string(),
            working_dir: DEFAULT_TASK_WORKDIR.to_string(),
            pipeline: vec![
                "python run.py".to_string(),
                "python createnc.py".to_string(),
                "python plotdepths.py --border".to_string(),
            ],
        }
    }
}

/// Identifies the pool, job and container triple of one mission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionDescriptor {
    pub name: String,
    pub pool_name: String,
    pub job_name: String,
    pub container_name: String,
    pub node_count: u32,
    pub vm_size: String,
    pub image: ImageReference,
    pub node_agent_sku_id: String,
    pub container_image: String,
    pub task_template: TaskTemplate,
}

impl MissionDescriptor {
    /// Builds a descriptor whose resource names derive from `name`.
    pub fn new(name: &str, node_count: u32) -> AppResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::invalid_argument("mission name must not be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::invalid_argument(format!(
                "mission name '{name}' may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            pool_name: format!("{name}-pool"),
            job_name: format!("{name}-job"),
            // blob containers only accept lower-case names
            container_name: format!("{}-container", name.to_ascii_lowercase().replace('_', "-")),
            node_count,
            vm_size: DEFAULT_VM_SIZE.to_string(),
            image: ImageReference::default(),
            node_agent_sku_id: DEFAULT_NODE_AGENT_SKU.to_string(),
            container_image: DEFAULT_CONTAINER_IMAGE.to_string(),
            task_template: TaskTemplate::default(),
        })
    }

    pub fn pool_spec(&self) -> PoolSpec {
        PoolSpec {
            id: self.pool_name.clone(),
            vm_size: self.vm_size.clone(),
            target_dedicated_nodes: self.node_count,
            image: self.image.clone(),
            node_agent_sku_id: self.node_agent_sku_id.clone(),
            container_image_names: vec![self.container_image.clone()],
        }
    }
}

impl std::fmt::Display for MissionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "VM type: {}", self.vm_size)?;
        writeln!(f, "Number of nodes: {}", self.node_count)?;
        writeln!(f, "Pool name: {}", self.pool_name)?;
        writeln!(f, "Job name: {}", self.job_name)?;
        write!(f, "Storage container name: {}", self.container_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub id: String,
    pub vm_size: String,
    pub target_dedicated_nodes: u32,
    pub image: ImageReference,
    pub node_agent_sku_id: String,
    pub container_image_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Active,
    Deleting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Steady,
    Resizing,
    Stopping,
}

impl PoolState {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolState::Active => "active",
            PoolState::Deleting => "deleting",
        }
    }
}

impl AllocationState {
    pub fn as_str(self) -> &'static str {
        match self {
            AllocationState::Steady => "steady",
            AllocationState::Resizing => "resizing",
            AllocationState::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub id: String,
    pub state: PoolState,
    pub allocation_state: AllocationState,
    pub target_dedicated_nodes: u32,
    pub current_dedicated_nodes: u32,
}

/// What happens to tasks running on nodes removed by a shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeallocationOption {
    Requeue,
    Terminate,
    TaskCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub target_dedicated_nodes: u32,
    pub deallocation: DeallocationOption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Creating,
    Starting,
    Idle,
    Running,
    Unusable,
    StartTaskFailed,
    Offline,
    LeavingPool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub state: NodeState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub id: String,
    pub pool_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Active,
    Disabled,
    Terminating,
    Completed,
    Deleting,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Active => "active",
            JobState::Disabled => "disabled",
            JobState::Terminating => "terminating",
            JobState::Completed => "completed",
            JobState::Deleting => "deleting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub pool_id: String,
    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContainerSettings {
    pub image_name: String,
    pub run_options: String,
}

/// Input staged onto the node before the task starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFile {
    pub storage_container_url: String,
    pub blob_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadCondition {
    TaskSuccess,
    TaskFailure,
    TaskCompletion,
}

/// Files copied back into the container when the task ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub file_pattern: String,
    pub container_url: String,
    pub path: String,
    pub upload_condition: UploadCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub command_line: String,
    pub container_settings: TaskContainerSettings,
    pub resource_files: Vec<ResourceFile>,
    pub output_files: Vec<OutputFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Active,
    Preparing,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Active => "active",
            TaskState::Preparing => "preparing",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,
    pub failure_info: Option<String>,
}

impl TaskInfo {
    /// Backends report a failed task as completed with failure details.
    pub fn effective_state(&self) -> TaskState {
        match self.state {
            TaskState::Completed if self.failure_info.is_some() => TaskState::Failed,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerPermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl ContainerPermissions {
    pub const fn all() -> Self {
        Self {
            read: true,
            write: true,
            delete: true,
            list: true,
        }
    }

    /// Permission letters in canonical SAS order.
    pub fn as_sas_str(&self) -> String {
        let mut out = String::with_capacity(4);
        if self.read {
            out.push('r');
        }
        if self.write {
            out.push('w');
        }
        if self.delete {
            out.push('d');
        }
        if self.list {
            out.push('l');
        }
        out
    }
}

/// Container URL plus the time-bounded credential it was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSession {
    pub container_url: String,
    pub token: String,
    pub starts_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl ContainerSession {
    pub fn remaining(&self, now: OffsetDateTime) -> time::Duration {
        self.expires_at - now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    pub content_length: u64,
    pub last_modified: OffsetDateTime,
}

/// Timing knobs for the two retried conditions and the credential window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerPolicy {
    pub pool_poll_interval: Duration,
    pub pool_steady_timeout: Duration,
    pub container_retry_interval: Duration,
    pub container_retry_attempts: u32,
    pub sas_validity: time::Duration,
    pub sas_renew_margin: time::Duration,
}

impl Default for ControllerPolicy {
    fn default() -> Self {
        Self {
            pool_poll_interval: Duration::from_secs(2),
            pool_steady_timeout: Duration::from_secs(600),
            container_retry_interval: Duration::from_secs(5),
            container_retry_attempts: 120,
            sas_validity: time::Duration::hours(24),
            sas_renew_margin: time::Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    Created,
    Resized { from: u32, to: u32 },
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOutcome {
    Created,
    Existing { recovered_cases: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCase {
    pub case_name: String,
    pub parent: PathBuf,
    pub blobs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched {
        case_name: String,
        files: Vec<PathBuf>,
        skipped: usize,
    },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
    Purged { case_name: String, deleted: usize },
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchOptions {
    pub ignore_local_missing: bool,
    pub skip_staged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted,
    SkippedMissingLocal,
    SkippedStaged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseSubmission {
    pub case_name: String,
    pub outcome: SubmissionOutcome,
}

/// How [`crate::app::controller::MissionController::watch_until_done`] polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub cycle: Duration,
    /// Resize the pool to `min(unfinished, max_nodes)` every cycle.
    pub max_nodes: Option<u32>,
    pub download: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(10),
            max_nodes: None,
            download: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub cycles: usize,
    /// Cases fetched by this watch, in the order they were fetched.
    pub downloaded: Vec<String>,
    pub failed: Vec<String>,
}
