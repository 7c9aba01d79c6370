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
//! # Orchestrator Context Module
//!
//! Builds the clients, signers and price oracle of the orchestrator from its
//! configuration, and carries the shutdown signal of the process.
use std::sync::Arc;
use std::time::Duration;

use cosmrs::rpc::HttpClient;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider, RetryClient};
use ethers::signers::LocalWallet;
use ethers::types::Address;
use tokio::sync::broadcast;

use hyperion_evm_gateway::{EthersEvmGateway, GasPolicy};
use hyperion_home_gateway::{
    Broadcaster, CosmosHomeGateway, GasSettings, RestClient,
};
use hyperion_orchestrator_config::HyperionConfig;
use hyperion_orchestrator_utils::metric::Metrics;
use hyperion_orchestrator_utils::Result;
use hyperion_price_oracle_backends::{CoinGeckoBackend, PriceOracle};

mod ethers_retry_policy;
/// Loading of the orchestrator keys.
pub mod keyring;

pub use ethers_retry_policy::HyperionHttpRetryPolicy;

/// Provider of the counterparty chain, retrying rate limited requests.
pub type EvmProvider = Provider<RetryClient<Http>>;
/// [`EvmProvider`] signing with the orchestrator EVM key.
pub type EvmClient = SignerMiddleware<EvmProvider, LocalWallet>;

/// Requests retried by the EVM provider before the error reaches the loops.
const EVM_RPC_MAX_RETRIES: u32 = 5;
/// First backoff of the EVM provider, in milliseconds.
const EVM_RPC_INITIAL_BACKOFF_MS: u64 = 500;
/// Timeout of every REST and JSON-RPC request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// OrchestratorContext contains the configuration and shutdown signal of the
/// orchestrator.
#[derive(Clone)]
pub struct OrchestratorContext {
    /// The configuration of the orchestrator.
    pub config: HyperionConfig,
    /// Broadcasts a shutdown signal to all running loops.
    ///
    /// When a graceful shutdown is initiated, a `()` value is sent via the
    /// broadcast::Sender. Each loop receives it, stops at its next await
    /// point and completes its task.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics of the orchestrator.
    pub metrics: Arc<Metrics>,
}

impl OrchestratorContext {
    /// Creates a new OrchestratorContext.
    pub fn new(config: HyperionConfig) -> Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed loops.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
    }

    /// The key signing EVM transactions and confirms.
    pub fn evm_wallet(&self) -> Result<LocalWallet> {
        keyring::evm_wallet(&self.config.evm)
    }

    /// The key signing home chain transactions.
    pub fn home_wallet(&self) -> Result<LocalWallet> {
        keyring::home_wallet(&self.config.home)
    }

    /// Returns a provider of the counterparty chain.
    pub fn evm_provider(&self) -> Result<EvmProvider> {
        let http = Http::new_with_client(
            self.config.evm.rpc_url.as_url().clone(),
            self.http_client()?,
        );
        let client = RetryClient::new(
            http,
            HyperionHttpRetryPolicy::boxed(),
            EVM_RPC_MAX_RETRIES,
            EVM_RPC_INITIAL_BACKOFF_MS,
        );
        Ok(Provider::new(client).interval(Duration::from_secs(2)))
    }

    /// Returns a provider signing with the orchestrator EVM key.
    pub fn evm_client(&self) -> Result<Arc<EvmClient>> {
        let provider = self.evm_provider()?;
        let wallet = self.evm_wallet()?;
        Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
    }

    /// Returns the gateway to the bridge contract at `bridge`.
    pub fn evm_gateway(
        &self,
        bridge: Address,
    ) -> Result<EthersEvmGateway<EvmClient>> {
        let evm = &self.config.evm;
        let gas = GasPolicy {
            max_gas_price: evm.max_gas_price.into(),
            adjustment: evm.gas_price_adjustment,
            pending_tx_wait: evm.pending_tx_wait_duration(),
        };
        Ok(EthersEvmGateway::new(
            self.evm_client()?,
            bridge,
            gas,
            evm.max_blocks_per_step,
        ))
    }

    /// Returns the REST client of the home chain.
    pub fn home_rest(&self) -> Result<RestClient> {
        Ok(RestClient::new(
            self.config.home.grpc_endpoint.as_url().clone(),
            self.http_client()?,
        ))
    }

    /// Returns the gateway to the hyperion module of the home chain.
    pub fn home_gateway(&self) -> Result<CosmosHomeGateway> {
        let home = &self.config.home;
        let rest = self.home_rest()?;
        let rpc = HttpClient::new(home.tendermint_rpc.as_url().as_str())?;
        let gas = GasSettings {
            gas_limit: home.gas_limit,
            gas_price: home.gas_price.amount,
            denom: home.gas_price.denom.clone(),
        };
        let broadcaster = Broadcaster::new(
            rpc.clone(),
            rest.clone(),
            self.home_wallet()?,
            &home.account_prefix,
            &home.chain_id,
            gas,
            home.broadcast_timeout(),
        )?;
        Ok(CosmosHomeGateway::new(
            rest,
            rpc,
            broadcaster,
            self.config.orchestrator.hyperion_id,
        ))
    }

    /// Returns a price oracle backed by CoinGecko.
    pub fn price_oracle(&self) -> Result<PriceOracle> {
        let backend = CoinGeckoBackend::builder()
            .base_url(self.config.orchestrator.coingecko_api.as_url().clone())
            .platform(self.config.evm.coingecko_platform.clone())
            .client(self.http_client()?)
            .build();
        Ok(PriceOracle::builder().backend(Arc::new(backend)).build())
    }
}

/// Listens for the shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the loops
/// should stop.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }

        // Only one value is ever sent, and a closed channel means the
        // sender is gone, both count as a shutdown.
        let _ = self.notify.recv().await;

        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_the_shutdown() {
        let (tx, _) = broadcast::channel(2);
        let mut a = Shutdown::new(tx.subscribe());
        let mut b = Shutdown::new(tx.subscribe());
        tx.send(()).unwrap();
        a.recv().await;
        b.recv().await;
        assert!(a.is_shutdown() && b.is_shutdown());
        // already received, returns at once
        a.recv().await;
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let (tx, rx) = broadcast::channel::<()>(2);
        let mut shutdown = Shutdown::new(rx);
        drop(tx);
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }
}
