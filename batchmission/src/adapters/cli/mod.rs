// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "batchmission",
    version,
    about = "Provision a batch mission, stage simulation cases and collect their results",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < BATCHMISSION_CONFIG_PATH < command-line flags.\n\
Paths in the config file are resolved relative to the config file directory; paths passed as flags are resolved relative to the current working directory."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, BATCHMISSION_CONFIG_PATH or the default config file location is used."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        value_name = "NAME",
        help = "Mission name; pool, job and container names derive from it. Overrides `mission_name` from the config file."
    )]
    pub mission: Option<String>,
    #[arg(
        short = 'n',
        long,
        global = true,
        value_name = "COUNT",
        help = "Dedicated node count of the mission pool. Overrides `node_count` from the config file."
    )]
    pub nodes: Option<u32>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Directory holding the local batch and storage backend state. Overrides `backend_dir` from the config file."
    )]
    pub backend_dir: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging and include logs from dependencies. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Provision pool, job and container, then submit the given cases.
    Start(StartArgs),
    /// Upload one case directory without submitting a task.
    Stage {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Download staged cases back to where they were staged from.
    Fetch(FetchArgs),
    /// Delete staged cases from the mission container.
    Purge(PurgeArgs),
    /// Poll tasks until all finish, downloading each finished case once.
    Wait(WaitArgs),
    /// Resize the mission pool.
    Resize {
        #[arg(value_name = "NODES")]
        nodes: u32,
    },
    /// Resize the pool to the number of unfinished tasks.
    Adapt {
        #[arg(long, value_name = "COUNT")]
        max_nodes: u32,
    },
    /// Print pool, job, task and container status.
    Status,
    /// Delete the container, the job and the pool.
    Teardown,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StartArgs {
    #[arg(value_name = "CASE")]
    pub cases: Vec<PathBuf>,
    #[arg(long, help = "Resize an existing pool to the configured node count.")]
    pub resize: bool,
    #[arg(long, help = "Fail instead of skipping case folders that do not exist.")]
    pub fail_on_missing: bool,
    #[arg(long, help = "Submit cases even when they are already staged.")]
    pub resubmit: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct FetchArgs {
    #[arg(value_name = "DIR", required = true)]
    pub dirs: Vec<PathBuf>,
    #[arg(long, help = "Fail on cases that are not staged instead of skipping them.")]
    pub strict: bool,
    #[arg(long, help = "Skip raw solver output, raster inputs and Python caches.")]
    pub skip_raw: bool,
    #[arg(long, value_name = "GLOB", help = "Additional exclude pattern; may be repeated.")]
    pub exclude: Vec<String>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct WaitArgs {
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between polls."
    )]
    pub cycle_secs: u64,
    #[arg(
        long,
        value_name = "COUNT",
        help = "Resize the pool to the unfinished task count, capped at COUNT, every cycle."
    )]
    pub max_nodes: Option<u32>,
    #[arg(long, help = "Only wait; do not download finished cases.")]
    pub no_download: bool,
    #[arg(long, help = "Skip raw solver output, raster inputs and Python caches.")]
    pub skip_raw: bool,
    #[arg(long, value_name = "GLOB", help = "Additional exclude pattern; may be repeated.")]
    pub exclude: Vec<String>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PurgeArgs {
    #[arg(value_name = "DIR", required = true)]
    pub dirs: Vec<PathBuf>,
    #[arg(long, help = "Fail on cases that are not staged instead of skipping them.")]
    pub strict: bool,
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

pub fn cli_command() -> clap::Command {
    Opts::command()
}

fn parsed_from_matches(matches: &ArgMatches) -> Result<ParsedOpts, clap::Error> {
    // only an explicit flag may override the config file
    let verbose_override = matches.get_flag("verbose").then_some(true);
    let opts = Opts::from_arg_matches(matches)?;
    Ok(ParsedOpts {
        opts,
        verbose_override,
    })
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    parsed_from_matches(&matches).unwrap_or_else(|err| err.exit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ParsedOpts {
        let matches = cli_command()
            .try_get_matches_from(args)
            .expect("valid arguments");
        parsed_from_matches(&matches).expect("parsed")
    }

    #[test]
    fn command_definition_is_consistent() {
        cli_command().debug_assert();
    }

    #[test]
    fn start_collects_cases_and_flags() {
        let parsed = parse(&["batchmission", "-m", "flood", "start", "c1", "c2", "--resize"]);
        assert_eq!(parsed.opts.mission.as_deref(), Some("flood"));
        assert_eq!(parsed.verbose_override, None);
        assert_eq!(
            parsed.opts.command,
            Command::Start(StartArgs {
                cases: vec![PathBuf::from("c1"), PathBuf::from("c2")],
                resize: true,
                fail_on_missing: false,
                resubmit: false,
            })
        );
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let parsed = parse(&["batchmission", "fetch", "c1", "--skip-raw", "-v", "--nodes", "4"]);
        assert_eq!(parsed.verbose_override, Some(true));
        assert_eq!(parsed.opts.nodes, Some(4));
        match parsed.opts.command {
            Command::Fetch(args) => {
                assert!(args.skip_raw);
                assert!(!args.strict);
                assert_eq!(args.dirs, vec![PathBuf::from("c1")]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn purge_requires_a_directory() {
        assert!(
            cli_command()
                .try_get_matches_from(["batchmission", "purge"])
                .is_err()
        );
    }

    #[test]
    fn wait_defaults_to_downloading_every_ten_seconds() {
        let parsed = parse(&["batchmission", "wait", "--max-nodes", "8"]);
        assert_eq!(
            parsed.opts.command,
            Command::Wait(WaitArgs {
                cycle_secs: 10,
                max_nodes: Some(8),
                no_download: false,
                skip_raw: false,
                exclude: Vec::new(),
            })
        );
        assert!(
            cli_command()
                .try_get_matches_from(["batchmission", "wait", "--cycle-secs", "0"])
                .is_err()
        );
    }

    #[test]
    fn adapt_takes_a_cap() {
        let parsed = parse(&["batchmission", "adapt", "--max-nodes", "6"]);
        assert_eq!(parsed.opts.command, Command::Adapt { max_nodes: 6 });
    }
}
