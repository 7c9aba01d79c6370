// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories_next::ProjectDirs;
use structopt::StructOpt;

use crate::HyperionConfig;

/// Package identifier, where the default configuration is defined.
/// If the user does not start the orchestrator with the `--config-dir`
/// it will default to read from the default location depending on the OS.
pub const PACKAGE_ID: [&str; 3] = ["network", "helios", "hyperion-orchestrator"];

/// The Hyperion Orchestrator Command-line tool
///
/// Start the orchestrator from a config directory:
///
/// $ hyperion-orchestrator -vvv -c <CONFIG_DIR_PATH>
#[derive(Debug, StructOpt)]
#[structopt(name = "Hyperion Orchestrator")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: Option<PathBuf>,
    /// Print logs as JSON lines.
    #[structopt(long)]
    pub json_logs: bool,
    /// One-shot commands, the orchestrator runs when none is given.
    #[structopt(subcommand)]
    pub command: Option<Command>,
}

/// One-shot commands.
#[derive(Debug, StructOpt)]
pub enum Command {
    /// Registers the configured EVM key as the orchestrator of the
    /// validator, then exits.
    SetOrchestratorAddress {
        /// Home account that will sign claims and confirms, defaults to
        /// the account of the home key.
        #[structopt(long)]
        orchestrator: Option<String>,
    },
}

/// Loads the configuration from the given directory.
///
/// Returns `Ok(HyperionConfig)` on success, or `Err(anyhow::Error)` on failure.
///
/// # Arguments
///
/// * `config_dir` - An optional `PathBuf` representing the directory that contains the configuration.
pub fn load_config<P>(
    config_dir: Option<P>,
) -> Result<HyperionConfig, anyhow::Error>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for hyperion orchestrator");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let v = crate::utils::load(path)?;
    tracing::trace!("Config loaded..");
    Ok(v)
}

/// Sets up the logger for the orchestrator, based on the verbosity level
/// passed in.
///
/// `log_level`, when set, is used as an `EnvFilter` directive for the
/// orchestrator crates instead of the level derived from `verbosity`.
pub fn setup_logger(
    verbosity: i32,
    json: bool,
    log_level: Option<&str>,
) -> anyhow::Result<()> {
    use tracing::Level;
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let directive = match log_level {
        Some(l) if l.contains('=') => l.to_owned(),
        Some(l) => format!("hyperion={l}"),
        None => format!("hyperion={level}"),
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(
            directive
                .parse()
                .with_context(|| format!("invalid log level {directive}"))?,
        );
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter);
    let init = if json {
        logger
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init()
    } else {
        logger.pretty().try_init()
    };
    init.map_err(|e| anyhow::anyhow!(e))
}
