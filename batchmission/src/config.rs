// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::app::types::{ControllerPolicy, MissionDescriptor};

const APP_DIR_NAME: &str = "batchmission";
const CONFIG_FILE_NAME: &str = "batchmission.toml";
const CONFIG_ENV_VAR: &str = "BATCHMISSION_CONFIG_PATH";
const BACKEND_DIR_NAME: &str = "backend";
const DEFAULT_MISSION_NAME: &str = "landspill";
const DEFAULT_NODE_COUNT: u32 = 1;
const MAX_SAS_VALIDITY_HOURS: i64 = 8760;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    mission_name: Option<String>,
    node_count: Option<u32>,
    vm_size: Option<String>,
    container_image: Option<String>,
    backend_dir: Option<String>,
    verbose: Option<bool>,
    #[serde(default)]
    timing: TimingConfig,
}

/// Waits and credential windows; unset keys keep the controller defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimingConfig {
    pool_poll_interval_secs: Option<u64>,
    pool_steady_timeout_secs: Option<u64>,
    container_retry_interval_secs: Option<u64>,
    container_retry_attempts: Option<u32>,
    sas_validity_hours: Option<i64>,
    sas_renew_margin_mins: Option<i64>,
}

#[derive(Debug)]
pub struct Config {
    pub mission_name: String,
    pub node_count: u32,
    pub vm_size: Option<String>,
    pub container_image: Option<String>,
    pub backend_dir: PathBuf,
    pub verbose: bool,
    pub policy: ControllerPolicy,
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Descriptor for the configured mission with any shape overrides applied.
    pub fn descriptor(&self) -> Result<MissionDescriptor> {
        let mut descriptor = MissionDescriptor::new(&self.mission_name, self.node_count)
            .with_context(|| format!("invalid mission name '{}'", self.mission_name))?;
        if let Some(vm_size) = &self.vm_size {
            descriptor.vm_size = vm_size.clone();
        }
        if let Some(image) = &self.container_image {
            descriptor.container_image = image.clone();
            descriptor.task_template.image = image.clone();
        }
        Ok(descriptor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub mission_name: ConfigValue<String>,
    pub node_count: ConfigValue<u32>,
    pub backend_dir: ConfigValue<PathBuf>,
    pub verbose: ConfigValue<bool>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub mission_name: Option<String>,
    pub node_count: Option<u32>,
    pub backend_dir: Option<PathBuf>,
    pub verbose: Option<bool>,
}

/// Picks the override, then the file value, then the default.
fn layered<T>(over: Option<T>, file: Option<T>, default: impl FnOnce() -> T) -> (T, ConfigSource) {
    match (over, file) {
        (Some(value), _) => (value, ConfigSource::Override),
        (None, Some(value)) => (value, ConfigSource::ConfigFile),
        (None, None) => (default(), ConfigSource::Default),
    }
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path.as_deref().is_some_and(Path::exists);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let config_dir = config_path.as_deref().and_then(Path::parent);

    let (mission_name, mission_source) = layered(
        overrides.mission_name,
        file_config.mission_name,
        || DEFAULT_MISSION_NAME.to_string(),
    );
    let (node_count, node_count_source) =
        layered(overrides.node_count, file_config.node_count, || DEFAULT_NODE_COUNT);
    let (verbose, verbose_source) = layered(overrides.verbose, file_config.verbose, || false);

    let (backend_dir, backend_source) = match overrides.backend_dir {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.backend_dir {
            Some(raw) => (resolve_path(&raw, config_dir), ConfigSource::ConfigFile),
            None => (
                default_backend_dir().with_context(|| {
                    "failed to resolve default backend directory; specify --backend-dir or set backend_dir in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let policy = build_policy(&file_config.timing)?;

    let config = Config {
        mission_name,
        node_count,
        vm_size: file_config.vm_size,
        container_image: file_config.container_image,
        backend_dir,
        verbose,
        policy,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        mission_name: ConfigValue {
            value: config.mission_name.clone(),
            source: mission_source,
        },
        node_count: ConfigValue {
            value: config.node_count,
            source: node_count_source,
        },
        backend_dir: ConfigValue {
            value: config.backend_dir.clone(),
            source: backend_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
    };

    Ok(LoadResult { config, report })
}

fn build_policy(timing: &TimingConfig) -> Result<ControllerPolicy> {
    let mut policy = ControllerPolicy::default();
    if let Some(secs) = timing.pool_poll_interval_secs {
        if secs == 0 {
            anyhow::bail!("timing.pool_poll_interval_secs must be at least 1");
        }
        policy.pool_poll_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = timing.pool_steady_timeout_secs {
        policy.pool_steady_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = timing.container_retry_interval_secs {
        policy.container_retry_interval = Duration::from_secs(secs);
    }
    if let Some(attempts) = timing.container_retry_attempts {
        policy.container_retry_attempts = attempts;
    }
    if let Some(hours) = timing.sas_validity_hours {
        if !(1..=MAX_SAS_VALIDITY_HOURS).contains(&hours) {
            anyhow::bail!(
                "timing.sas_validity_hours must be between 1 and {MAX_SAS_VALIDITY_HOURS}"
            );
        }
        policy.sas_validity = time::Duration::hours(hours);
    }
    if let Some(mins) = timing.sas_renew_margin_mins {
        if !(0..=MAX_SAS_VALIDITY_HOURS * 60).contains(&mins) {
            anyhow::bail!(
                "timing.sas_renew_margin_mins must be between 0 and {}",
                MAX_SAS_VALIDITY_HOURS * 60
            );
        }
        policy.sas_renew_margin = time::Duration::minutes(mins);
    }
    if policy.sas_renew_margin >= policy.sas_validity {
        anyhow::bail!("the SAS renew margin must be shorter than the SAS validity");
    }
    Ok(policy)
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(shellexpand::tilde(raw).as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let raw = path.to_string_lossy().to_string();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) if value.is_empty() => anyhow::bail!("{CONFIG_ENV_VAR} is set but empty"),
        Some(value) => Ok(Some(PathBuf::from(value))),
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_backend_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(BACKEND_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn clear(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                match &self.prev {
                    Some(value) => std::env::set_var(self.key, value),
                    None => std::env::remove_var(self.key),
                }
            }
        }
    }

    fn write_config(dir: &TempDir, body: &str) -> (PathBuf, PathBuf) {
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, body).unwrap();
        (config_dir, config_path)
    }

    #[test]
    fn missing_required_config_file_errors() {
        let dir = TempDir::new().unwrap();
        let err = read_config_file(&dir.path().join("missing.toml"), true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
        let cfg = read_config_file(&dir.path().join("missing.toml"), false).unwrap();
        assert!(cfg.mission_name.is_none());
    }

    #[test]
    fn file_values_resolve_relative_to_config_dir() {
        let dir = TempDir::new().unwrap();
        let (config_dir, config_path) = write_config(
            &dir,
            "mission_name = \"flood\"\nnode_count = 3\nbackend_dir = \"state\"\nvm_size = \"STANDARD_H16\"\n",
        );

        let LoadResult { config, report } =
            load_with_report(Some(config_path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.mission_name, "flood");
        assert_eq!(config.node_count, 3);
        assert_eq!(config.backend_dir, config_dir.join("state"));
        assert_eq!(config.config_path, Some(config_path));
        assert_eq!(report.node_count.source, ConfigSource::ConfigFile);
        assert_eq!(report.verbose.source, ConfigSource::Default);

        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.pool_name, "flood-pool");
        assert_eq!(descriptor.vm_size, "STANDARD_H16");
    }

    #[test]
    fn cli_overrides_take_precedence_per_field() {
        let dir = TempDir::new().unwrap();
        let (config_dir, config_path) = write_config(
            &dir,
            "mission_name = \"flood\"\nnode_count = 3\nbackend_dir = \"state\"\nverbose = false\n",
        );

        let LoadResult { config, report } = load_with_report(
            Some(config_path),
            Overrides {
                mission_name: None,
                node_count: Some(8),
                backend_dir: None,
                verbose: Some(true),
            },
        )
        .unwrap();
        assert_eq!(config.mission_name, "flood");
        assert_eq!(config.node_count, 8);
        assert!(config.verbose);
        assert_eq!(config.backend_dir, config_dir.join("state"));
        assert_eq!(report.node_count.source, ConfigSource::Override);
        assert_eq!(report.mission_name.source, ConfigSource::ConfigFile);
    }

    #[test]
    fn timing_section_overrides_policy() {
        let dir = TempDir::new().unwrap();
        let (_, config_path) = write_config(
            &dir,
            "backend_dir = \"state\"\n[timing]\npool_poll_interval_secs = 7\ncontainer_retry_attempts = 3\nsas_validity_hours = 4\n",
        );

        let config = load_with_report(Some(config_path), Overrides::default())
            .unwrap()
            .config;
        assert_eq!(config.policy.pool_poll_interval, Duration::from_secs(7));
        assert_eq!(config.policy.container_retry_attempts, 3);
        assert_eq!(config.policy.sas_validity, time::Duration::hours(4));
        assert_eq!(
            config.policy.pool_steady_timeout,
            ControllerPolicy::default().pool_steady_timeout
        );
    }

    #[test]
    fn inconsistent_sas_window_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, config_path) = write_config(
            &dir,
            "backend_dir = \"state\"\n[timing]\nsas_validity_hours = 1\nsas_renew_margin_mins = 90\n",
        );
        let err = load_with_report(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("renew margin"));
    }

    #[test]
    fn oversized_sas_window_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, config_path) = write_config(
            &dir,
            "backend_dir = \"state\"\n[timing]\nsas_validity_hours = 9223372036854775807\n",
        );
        let err = load_with_report(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("sas_validity_hours"));

        let (_, config_path) = write_config(
            &dir,
            "backend_dir = \"state\"\n[timing]\nsas_renew_margin_mins = -5\n",
        );
        let err = load_with_report(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("sas_renew_margin_mins"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, config_path) = write_config(&dir, "node_cout = 3\n");
        assert!(load_with_report(Some(config_path), Overrides::default()).is_err());
    }

    #[test]
    fn env_config_path_used_when_no_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let (_, config_path) = write_config(&dir, "backend_dir = \"state\"\nnode_count = 5\n");
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, config_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(None, Overrides::default()).unwrap();
        assert_eq!(config.node_count, 5);
        assert_eq!(report.config_path_source, Some(ConfigSource::Env));
    }

    #[test]
    fn cli_config_path_takes_precedence_over_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("env.toml");
        let cli_path = dir.path().join("cli.toml");
        fs::write(&env_path, "backend_dir = \"state\"\nnode_count = 5\n").unwrap();
        fs::write(&cli_path, "backend_dir = \"state\"\nnode_count = 6\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, env_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(Some(cli_path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.node_count, 6);
        assert_eq!(config.config_path, Some(cli_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Override));
    }
}
