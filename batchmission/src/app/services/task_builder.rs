// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::services::case_paths::case_prefix;
use crate::app::types::{
    OutputFile, ResourceFile, TaskContainerSettings, TaskSpec, TaskTemplate, UploadCondition,
};

const TASK_WORKING_DIR_VAR: &str = "$AZ_BATCH_TASK_WORKING_DIR";
const TASK_DIR_VAR: &str = "$AZ_BATCH_TASK_DIR";

/// Command that copies staged input in, runs the pipeline and copies results out.
pub fn build_command_line(case_name: &str, template: &TaskTemplate) -> String {
    let mut steps = Vec::with_capacity(template.pipeline.len() + 2);
    steps.push(format!("cp -r {TASK_WORKING_DIR_VAR}/{case_name} ./"));
    for stage in &template.pipeline {
        steps.push(format!("{stage} {case_name}"));
    }
    steps.push(format!("cp -r ./{case_name} {TASK_WORKING_DIR_VAR}"));
    format!("/bin/bash -c \"{}\"", steps.join(" && "))
}

pub fn build_task_spec(case_name: &str, container_url: &str, template: &TaskTemplate) -> TaskSpec {
    let output = |file_pattern: String| OutputFile {
        file_pattern,
        container_url: container_url.to_string(),
        path: case_name.to_string(),
        upload_condition: UploadCondition::TaskCompletion,
    };

    TaskSpec {
        id: case_name.to_string(),
        command_line: build_command_line(case_name, template),
        container_settings: TaskContainerSettings {
            image_name: template.image.clone(),
            run_options: format!("--rm --workdir {}", template.working_dir),
        },
        resource_files: vec![ResourceFile {
            storage_container_url: container_url.to_string(),
            blob_prefix: case_prefix(case_name),
        }],
        output_files: vec![
            output(format!("{case_name}/**/*")),
            output(format!("{TASK_DIR_VAR}/std*.txt")),
        ],
    }
}
