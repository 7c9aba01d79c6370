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

use config::{Config, File};
use hyperion_orchestrator_utils::{Error, Result};

use crate::{HyperionConfig, KeyringBackend};

/// Prefix of the environment variables merged over the config files.
pub const ENV_PREFIX: &str = "HYPERION_";
/// Separates nested keys in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// A helper function that will search for all config files in the given
/// directory and return them as a vec of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(Error::from))
        .collect()
}

/// Maps `HYPERION_HOME__CHAIN_ID=..` to the `home.chain-id` key.
fn env_key(var: &str) -> Option<String> {
    let rest = var.strip_prefix(ENV_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    let key = rest
        .split(ENV_SEPARATOR)
        .map(|part| part.to_ascii_lowercase().replace('_', "-"))
        .collect::<Vec<_>>()
        .join(".");
    Some(key)
}

/// Try to parse the [`HyperionConfig`] from the given config file(s) and
/// the `HYPERION_*` environment variables.
pub fn parse_from_files(files: &[PathBuf]) -> Result<HyperionConfig> {
    parse_with_env(files, std::env::vars())
}

fn parse_with_env<I>(files: &[PathBuf], env: I) -> Result<HyperionConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of HYPERION).
    for (var, value) in env {
        if let Some(key) = env_key(&var) {
            tracing::trace!("Overriding {} from {}", key, var);
            builder = builder.set_override(key, value)?;
        }
    }
    let cfg = builder.build()?;
    let config: std::result::Result<
        HyperionConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and the environment.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(path: P) -> Result<HyperionConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration before
/// anything gets connected.
pub fn postloading_process(config: HyperionConfig) -> Result<HyperionConfig> {
    tracing::trace!("Checking configration sanity ...");
    verify(&config)?;
    Ok(config)
}

/// Rejects configurations the orchestrator cannot run with.
pub fn verify(config: &HyperionConfig) -> Result<()> {
    let home = &config.home;
    if home.keyring_backend == KeyringBackend::Ledger {
        return Err(Error::SigningUnavailable(
            "the ledger keyring backend needs a human to approve every \
             signature"
                .into(),
        ));
    }
    if config.evm.use_ledger {
        return Err(Error::SigningUnavailable(
            "ledger signers need a human to approve every signature".into(),
        ));
    }
    let home_has_key = home.private_key.is_some()
        || (home.key_name.is_some()
            && home.keyring_dir.is_some()
            && home.keyring_backend != KeyringBackend::Memory);
    if !home_has_key {
        tracing::error!(
            "home chain key missing: set home.private-key or \
             home.keyring-dir and home.key-name"
        );
        return Err(Error::MissingSecrets);
    }
    let evm = &config.evm;
    let evm_has_key = evm.private_key.is_some()
        || (evm.keystore_dir.is_some() && evm.key_name.is_some());
    if !evm_has_key {
        tracing::error!(
            "evm key missing: set evm.private-key or evm.keystore-dir and \
             evm.key-name"
        );
        return Err(Error::MissingSecrets);
    }
    let orch = &config.orchestrator;
    if orch.hyperion_id == 0 {
        return Err(Error::InvalidConfig(
            "orchestrator.hyperion-id must be set".into(),
        ));
    }
    if !(orch.min_batch_fee_usd >= 0.0) {
        return Err(Error::InvalidConfig(
            "orchestrator.min-batch-fee-usd must not be negative".into(),
        ));
    }
    if evm.max_blocks_per_step == 0 {
        return Err(Error::InvalidConfig(
            "evm.max-blocks-per-step must be positive".into(),
        ));
    }
    if !(evm.gas_price_adjustment > 0.0) {
        return Err(Error::InvalidConfig(
            "evm.gas-price-adjustment must be positive".into(),
        ));
    }
    let periods = [
        orch.oracle_period,
        orch.signer_period,
        orch.batch_request_period,
        orch.relay_valset_period,
        orch.relay_batch_period,
    ];
    if periods.contains(&0) {
        return Err(Error::InvalidConfig(
            "loop periods must be positive".into(),
        ));
    }
    if orch.max_retries == 0 {
        return Err(Error::InvalidConfig(
            "orchestrator.max-retries must be positive".into(),
        ));
    }
    Ok(())
}
