// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use batchmission::adapters::cli::{self, Command, FetchArgs, PurgeArgs, StartArgs, WaitArgs};
use batchmission::adapters::fs::LocalFilesystem;
use batchmission::adapters::local::{LocalBatchService, LocalBlobStore};
use batchmission::adapters::time::SystemClock;
use batchmission::app::controller::MissionController;
use batchmission::app::monitor::MissionMonitor;
use batchmission::app::services::fetch_filter::{self, FetchFilter};
use batchmission::app::types::{
    FetchOutcome, LaunchOptions, MissionDescriptor, PoolOutcome, PurgeOutcome, SubmissionOutcome,
    WatchOptions,
};
use batchmission::{config, logging};

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => tracing::info!(
            "config path: {} (source={}, present={})",
            path.display(),
            source.as_str(),
            report.config_file_present
        ),
        (Some(path), None) => tracing::info!(
            "config path: {} (present={})",
            path.display(),
            report.config_file_present
        ),
        (None, _) => tracing::info!("config path: (none)"),
    }
    tracing::info!(
        "config mission_name: {} (source={})",
        report.mission_name.value,
        report.mission_name.source.as_str()
    );
    tracing::info!(
        "config node_count: {} (source={})",
        report.node_count.value,
        report.node_count.source.as_str()
    );
    tracing::info!(
        "config backend_dir: {} (source={})",
        report.backend_dir.value.display(),
        report.backend_dir.source.as_str()
    );
    tracing::debug!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
}

struct Backend {
    compute: Arc<LocalBatchService>,
    storage: Arc<LocalBlobStore>,
    clock: Arc<SystemClock>,
}

impl Backend {
    fn open(config: &config::Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.backend_dir).with_context(|| {
            format!(
                "failed to create backend directory {}",
                config.backend_dir.display()
            )
        })?;
        Ok(Self {
            compute: Arc::new(LocalBatchService::new(config.backend_dir.join("batch"))),
            storage: Arc::new(LocalBlobStore::new(config.backend_dir.join("storage"))),
            clock: Arc::new(SystemClock),
        })
    }

    fn controller(
        &self,
        descriptor: MissionDescriptor,
        config: &config::Config,
        cancel: watch::Receiver<bool>,
    ) -> MissionController {
        MissionController::new(
            descriptor,
            self.compute.clone(),
            self.storage.clone(),
            Arc::new(LocalFilesystem),
            self.clock.clone(),
        )
        .with_policy(config.policy)
        .with_cancellation(cancel)
    }

    fn monitor(&self, descriptor: MissionDescriptor) -> MissionMonitor {
        MissionMonitor::new(
            descriptor,
            self.compute.clone(),
            self.storage.clone(),
            self.clock.clone(),
        )
    }
}

fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current wait");
            let _ = cancel_tx.send(true);
        }
    });
    cancel_rx
}

fn report_pool(outcome: PoolOutcome, pool_name: &str) {
    match outcome {
        PoolOutcome::Created => println!("pool {pool_name}: created"),
        PoolOutcome::Resized { from, to } => println!("pool {pool_name}: resized {from} -> {to}"),
        PoolOutcome::Unchanged => println!("pool {pool_name}: unchanged"),
    }
}

/// Read and cleanup commands must not bring a torn-down container back.
async fn attach(controller: &mut MissionController) -> anyhow::Result<()> {
    let container = controller.descriptor().container_name.clone();
    controller
        .attach_container()
        .await
        .with_context(|| format!("mission container {container} is not available"))?;
    Ok(())
}

async fn start(controller: &mut MissionController, args: StartArgs) -> anyhow::Result<()> {
    let pool_name = controller.descriptor().pool_name.clone();
    // without --resize an existing pool keeps whatever size it has
    let pool_exists = controller.pool_exists().await?;
    if !pool_exists || args.resize {
        report_pool(controller.ensure_pool().await?, &pool_name);
    } else {
        println!("pool {pool_name}: exists, size kept");
    }
    controller.ensure_job().await?;
    controller.ensure_container().await?;

    let options = LaunchOptions {
        ignore_local_missing: !args.fail_on_missing,
        skip_staged: !args.resubmit,
    };
    for submission in controller.submit_cases(&args.cases, options).await? {
        let label = match submission.outcome {
            SubmissionOutcome::Submitted => "submitted",
            SubmissionOutcome::SkippedMissingLocal => "skipped (folder not found)",
            SubmissionOutcome::SkippedStaged => "skipped (already staged)",
        };
        println!("{}: {label}", submission.case_name);
    }
    Ok(())
}

fn fetch_filter_from(skip_raw: bool, exclude: Vec<String>) -> anyhow::Result<FetchFilter> {
    let mut patterns: Vec<String> = if skip_raw {
        fetch_filter::results_only_patterns()
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };
    patterns.extend(exclude);
    Ok(FetchFilter::new(&patterns)?)
}

async fn fetch(controller: &mut MissionController, args: FetchArgs) -> anyhow::Result<()> {
    let filter = fetch_filter_from(args.skip_raw, args.exclude)?;
    attach(controller).await?;
    for dir in &args.dirs {
        match controller
            .fetch_directory_with(dir, !args.strict, &filter)
            .await?
        {
            FetchOutcome::Fetched {
                case_name,
                files,
                skipped,
            } => println!(
                "{case_name}: fetched {} files ({skipped} excluded)",
                files.len()
            ),
            FetchOutcome::Skipped => println!("{}: not staged, skipped", dir.display()),
        }
    }
    Ok(())
}

async fn purge(controller: &mut MissionController, args: PurgeArgs) -> anyhow::Result<()> {
    attach(controller).await?;
    for dir in &args.dirs {
        match controller.purge_directory(dir, !args.strict).await? {
            PurgeOutcome::Purged { case_name, deleted } => {
                println!("{case_name}: deleted {deleted} blobs")
            }
            PurgeOutcome::Skipped => println!("{}: not staged, skipped", dir.display()),
        }
    }
    Ok(())
}

async fn wait(controller: &mut MissionController, args: WaitArgs) -> anyhow::Result<()> {
    let filter = fetch_filter_from(args.skip_raw, args.exclude)?;
    attach(controller).await?;
    let options = WatchOptions {
        cycle: Duration::from_secs(args.cycle_secs),
        max_nodes: args.max_nodes,
        download: !args.no_download,
    };
    let summary = controller.watch_until_done(options, &filter).await?;
    for case_name in &summary.downloaded {
        println!("{case_name}: downloaded");
    }
    for case_name in &summary.failed {
        println!("{case_name}: task failed");
    }
    println!("all tasks finished after {} polls", summary.cycles);
    Ok(())
}

async fn stage(controller: &mut MissionController, dir: PathBuf) -> anyhow::Result<()> {
    controller.ensure_container().await?;
    let staged = controller.stage_directory(&dir).await?;
    println!(
        "{}: staged {} files from {}",
        staged.case_name,
        staged.blobs.len(),
        staged.parent.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            mission_name: opts.mission,
            node_count: opts.nodes,
            backend_dir: opts.backend_dir,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);

    let descriptor = config.descriptor()?;
    let backend = Backend::open(&config)?;
    let mut controller = backend.controller(descriptor.clone(), &config, cancel_on_ctrl_c());

    match opts.command {
        Command::Start(args) => start(&mut controller, args).await?,
        Command::Stage { dir } => stage(&mut controller, dir).await?,
        Command::Fetch(args) => fetch(&mut controller, args).await?,
        Command::Purge(args) => purge(&mut controller, args).await?,
        Command::Wait(args) => wait(&mut controller, args).await?,
        Command::Resize { nodes } => report_pool(
            controller.resize_pool(nodes).await?,
            &descriptor.pool_name,
        ),
        Command::Adapt { max_nodes } => report_pool(
            controller.adapt_pool_size(max_nodes).await?,
            &descriptor.pool_name,
        ),
        Command::Status => println!("{}", backend.monitor(descriptor).report().await?),
        Command::Teardown => {
            controller.teardown().await?;
            println!("mission {} torn down", descriptor.name);
        }
    }
    Ok(())
}
