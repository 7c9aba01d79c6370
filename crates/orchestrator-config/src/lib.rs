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

#![warn(missing_docs)]

//! # Orchestrator Configuration Module
//!
//! A module for configuring the orchestrator.
//!
//! The configuration is split in four sections:
//! * `home`: the Helios chain, its endpoints and the orchestrator key there.
//! * `evm`: the counterparty EVM chain, its endpoints, gas limits and key.
//! * `orchestrator`: which duties run and how.
//! * `telemetry`: metrics endpoint and log level.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the optional settings
pub mod defaults;
/// Loading and validating configuration
pub mod utils;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hyperion_orchestrator_types::private_key::PrivateKey;
use hyperion_orchestrator_types::rpc_url::RpcUrl;
use serde::{Deserialize, Serialize};

/// HyperionConfig is the configuration of the orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HyperionConfig {
    /// The home (Cosmos) chain.
    pub home: HomeChainConfig,
    /// The counterparty EVM chain.
    pub evm: EvmChainConfig,
    /// Which loops run and how they behave.
    pub orchestrator: OrchestratorConfig,
    /// Metrics and logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Where the home-chain key lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyringBackend {
    /// A passphrase protected keystore file `<keyring-dir>/<key-name>.json`.
    #[default]
    File,
    /// The OS credential store.
    Os,
    /// Like `file`, with an empty passphrase.
    Test,
    /// Only the inline `private-key`.
    Memory,
    /// A Ledger device. Rejected, it cannot sign unattended.
    Ledger,
}

/// The price of one unit of gas on the home chain, like `500000000ahelios`.
#[derive(Debug, Clone, PartialEq)]
pub struct GasPrice {
    /// Amount of `denom` per unit of gas.
    pub amount: f64,
    /// Fee denomination.
    pub denom: String,
}

impl FromStr for GasPrice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("gas price {s:?} has no denom"))?;
        let (amount, denom) = s.split_at(split);
        let amount = amount
            .parse::<f64>()
            .map_err(|e| format!("gas price {s:?}: {e}"))?;
        Ok(Self {
            amount,
            denom: denom.to_owned(),
        })
    }
}

impl<'de> Deserialize<'de> for GasPrice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// HomeChainConfig configures the connection to the Helios chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HomeChainConfig {
    /// Cosmos chain id, like `helios-1`.
    pub chain_id: String,
    /// Base url of the REST (LCD) API used for queries.
    #[serde(alias = "rest-endpoint")]
    pub grpc_endpoint: RpcUrl,
    /// Tendermint RPC url used to broadcast transactions.
    pub tendermint_rpc: RpcUrl,
    /// Gas price paid for every transaction.
    #[serde(default = "defaults::home_gas_price")]
    pub gas_price: GasPrice,
    /// Gas limit of every transaction.
    #[serde(default = "defaults::home_gas_limit")]
    pub gas_limit: u64,
    /// Bech32 prefix of accounts.
    #[serde(default = "defaults::account_prefix")]
    pub account_prefix: String,
    /// Directory of the keyring.
    pub keyring_dir: Option<PathBuf>,
    /// Backend of the keyring.
    #[serde(default)]
    pub keyring_backend: KeyringBackend,
    /// Application name of the keyring.
    #[serde(default = "defaults::keyring_app")]
    pub keyring_app: String,
    /// Name of the key inside the keyring.
    pub key_name: Option<String>,
    /// Passphrase of the keyring.
    pub passphrase: Option<String>,
    /// Inline private key, takes precedence over the keyring.
    pub private_key: Option<PrivateKey>,
    /// Validator operator address, when it differs from the one derived
    /// from the orchestrator registration.
    pub validator_address: Option<String>,
    /// Seconds to wait for a broadcast transaction to be committed.
    #[serde(default = "defaults::broadcast_timeout")]
    pub broadcast_timeout: u64,
}

impl HomeChainConfig {
    /// [`Self::broadcast_timeout`] as a [`Duration`].
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.broadcast_timeout)
    }
}

/// EvmChainConfig configures the connection to the counterparty chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// EVM chain id.
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: RpcUrl,
    /// Websocket endpoint. Accepted and ignored, logs are polled over
    /// `rpc_url`.
    pub ws_url: Option<RpcUrl>,
    /// Maximum gas price (in wei) the orchestrator will pay.
    #[serde(default = "defaults::max_gas_price")]
    pub max_gas_price: u64,
    /// Multiplier applied to the gas price suggested by the node.
    #[serde(default = "defaults::gas_price_adjustment")]
    pub gas_price_adjustment: f64,
    /// Seconds to wait for a submitted transaction to be mined.
    #[serde(default = "defaults::pending_tx_wait_duration")]
    pub pending_tx_wait_duration: u64,
    /// Directory of the JSON keystore.
    pub keystore_dir: Option<PathBuf>,
    /// Name of the key inside the keystore directory.
    pub key_name: Option<String>,
    /// Passphrase of the keystore.
    pub passphrase: Option<String>,
    /// Inline private key, takes precedence over the keystore.
    pub private_key: Option<PrivateKey>,
    /// Sign with a Ledger device. Rejected, it cannot sign unattended.
    #[serde(default)]
    pub use_ledger: bool,
    /// Blocks to wait before an event is considered final.
    #[serde(default = "defaults::confirmations")]
    pub confirmations: u64,
    /// Maximum range of blocks queried at once for events.
    #[serde(default = "defaults::max_blocks_per_step")]
    pub max_blocks_per_step: u64,
    /// CoinGecko coin id of the native token, used to price gas.
    #[serde(default = "defaults::native_token_id")]
    pub native_token_id: String,
    /// CoinGecko asset platform of the chain.
    #[serde(default = "defaults::coingecko_platform")]
    pub coingecko_platform: String,
}

impl EvmChainConfig {
    /// [`Self::pending_tx_wait_duration`] as a [`Duration`].
    pub fn pending_tx_wait_duration(&self) -> Duration {
        Duration::from_secs(self.pending_tx_wait_duration)
    }
}

/// OrchestratorConfig selects the duties of the orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrchestratorConfig {
    /// Relay signed valsets to the EVM chain.
    #[serde(default)]
    pub relay_valsets: bool,
    /// Relay signed batches to the EVM chain.
    #[serde(default)]
    pub relay_batches: bool,
    /// Seconds a valset must exist before this orchestrator relays it.
    #[serde(default)]
    pub relay_valset_offset: u64,
    /// Seconds a batch must exist before this orchestrator relays it.
    #[serde(default)]
    pub relay_batch_offset: u64,
    /// Minimum value (in USD) of the fees of a batch.
    #[serde(default)]
    pub min_batch_fee_usd: f64,
    /// Base url of the CoinGecko API.
    #[serde(default = "defaults::coingecko_api")]
    pub coingecko_api: RpcUrl,
    /// Id of the counterparty chain in the hyperion module.
    pub hyperion_id: u64,
    /// Seconds between two ticks of the event oracle.
    #[serde(default = "defaults::loop_period")]
    pub oracle_period: u64,
    /// Seconds between two ticks of the signer.
    #[serde(default = "defaults::loop_period")]
    pub signer_period: u64,
    /// Seconds between two ticks of the batch requester.
    #[serde(default = "defaults::loop_period")]
    pub batch_request_period: u64,
    /// Seconds between two attempts to relay a valset.
    #[serde(default = "defaults::loop_period")]
    pub relay_valset_period: u64,
    /// Seconds between two attempts to relay batches.
    #[serde(default = "defaults::loop_period")]
    pub relay_batch_period: u64,
    /// Attempts of a failing tick before the loop gives up.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: usize,
    /// Seconds the loops get to stop after a shutdown signal.
    #[serde(default = "defaults::shutdown_grace_period")]
    pub shutdown_grace_period: u64,
}

impl OrchestratorConfig {
    /// Valset relay offset as a [`Duration`].
    pub fn relay_valset_offset(&self) -> Duration {
        Duration::from_secs(self.relay_valset_offset)
    }

    /// Batch relay offset as a [`Duration`].
    pub fn relay_batch_offset(&self) -> Duration {
        Duration::from_secs(self.relay_batch_offset)
    }
}

/// TelemetryConfig configures metrics and logs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    /// Address of the `/metrics` endpoint, disabled when unset.
    pub stats_addr: Option<SocketAddr>,
    /// Log level or `EnvFilter` directive, overrides the `-v` flags.
    pub log_level: Option<String>,
}
