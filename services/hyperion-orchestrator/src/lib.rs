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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Hyperion Orchestrator
//!
//! The orchestrator keeps the Hyperion bridge between the Helios chain and
//! an EVM chain running. Every validator of Helios runs one.
//!
//! ## Overview
//!
//! The duties of an orchestrator are split in independent loops:
//!
//!   1. Claiming the events of the bridge contract on Helios (oracle).
//!   2. Signing the valsets and batches created by Helios (signer).
//!   3. Asking Helios to batch profitable transfers (batch requester).
//!   4. Submitting signed valsets and batches to the contract (relayers).
//!
//! The first two only run when the configured EVM key is registered as the
//! orchestrator of a validator. Without it the process only requests and
//! relays, which anybody can do.
//!
//! A loop that keeps failing stops the whole process, so that the operator
//! notices it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use hyperion_evm_gateway::EvmChain;
use hyperion_home_gateway::HomeChain;
use hyperion_orchestrator_config::HyperionConfig;
use hyperion_orchestrator_context::OrchestratorContext;
use hyperion_orchestrator_loops::{
    run_loop, BatchRelayer, BatchRequester, EventOracle, OrchestratorLoop,
    Signer, ValsetRelayer,
};
use hyperion_orchestrator_types::{Params, PersonalSigner};
use hyperion_orchestrator_utils::{probe, Error, Result};
use hyperion_price_oracle_backends::PriceOracle;

/// The `/metrics` endpoint.
pub mod service;

/// How long both chains get to answer at startup.
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(60);
/// Delay between two readiness probes.
const READINESS_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// What the orchestrator is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// The EVM key is the orchestrator of this validator.
    Validator(String),
    /// No validator registered the EVM key.
    Relayer,
}

/// The loops of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duty {
    /// [`EventOracle`]
    Oracle,
    /// [`Signer`]
    Signer,
    /// [`BatchRequester`]
    BatchRequester,
    /// [`ValsetRelayer`]
    ValsetRelayer,
    /// [`BatchRelayer`]
    BatchRelayer,
}

/// The loops to run in `mode`.
pub fn duties(config: &HyperionConfig, mode: &Mode) -> Vec<Duty> {
    let mut duties = Vec::new();
    if matches!(mode, Mode::Validator(_)) {
        duties.push(Duty::Oracle);
        duties.push(Duty::Signer);
    }
    duties.push(Duty::BatchRequester);
    if config.orchestrator.relay_valsets {
        duties.push(Duty::ValsetRelayer);
    }
    if config.orchestrator.relay_batches {
        duties.push(Duty::BatchRelayer);
    }
    duties
}

/// The clients shared by every loop.
#[derive(Clone)]
pub struct Clients {
    /// The hyperion module of Helios.
    pub home: Arc<dyn HomeChain>,
    /// The bridge contract.
    pub evm: Arc<dyn EvmChain>,
    /// The EVM key signing confirms.
    pub signer: Arc<dyn PersonalSigner>,
    /// Prices of tokens and of gas.
    pub oracle: PriceOracle,
}

/// Polls `probe` until it succeeds, at most `timeout`.
pub async fn await_ready<F, Fut>(
    endpoint: &str,
    timeout: Duration,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let ready = async {
        loop {
            match probe().await {
                Ok(()) => {
                    tracing::debug!(%endpoint, "ready");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "not ready yet");
                }
            }
            tokio::time::sleep(READINESS_PROBE_INTERVAL).await;
        }
    };
    tokio::time::timeout(timeout, ready).await.map_err(|_| {
        Error::ConnectionTimeout {
            endpoint: endpoint.to_owned(),
        }
    })
}

/// Reads the parameters of our counterparty chain and checks them against
/// the configuration and the EVM node.
pub async fn load_params(
    config: &HyperionConfig,
    home: &dyn HomeChain,
    evm: &dyn EvmChain,
) -> Result<Params> {
    let params = home.params().await?;
    if params.hyperion_id != config.orchestrator.hyperion_id {
        return Err(Error::InvalidConfig(format!(
            "home chain serves hyperion id {}, configured {}",
            params.hyperion_id, config.orchestrator.hyperion_id
        )));
    }
    let chain_id = evm.chain_id().await?;
    if chain_id != config.evm.chain_id || chain_id != params.bridge_chain_id {
        return Err(Error::InvalidConfig(format!(
            "evm node is on chain {chain_id}, configured {}, bridged {}",
            config.evm.chain_id, params.bridge_chain_id
        )));
    }
    tracing::info!(
        hyperion_id = params.hyperion_id,
        bridge = ?params.bridge_contract_address,
        tokens = params.token_denoms.len(),
        "loaded bridge parameters",
    );
    Ok(params)
}

/// Finds the validator our EVM key orchestrates.
pub async fn detect_mode(
    config: &HyperionConfig,
    home: &dyn HomeChain,
    signer: &dyn PersonalSigner,
) -> Result<Mode> {
    let registered = home.validator_address_from_eth(signer.address()).await?;
    let mode =
        resolve_mode(registered, config.home.validator_address.as_deref())?;
    match &mode {
        Mode::Validator(validator) => {
            tracing::info!(%validator, "running as a validator orchestrator")
        }
        Mode::Relayer => tracing::warn!(
            eth = ?signer.address(),
            "evm key is not registered by any validator, only relaying",
        ),
    }
    Ok(mode)
}

/// Reconciles the validator registered for our key with the configured one.
fn resolve_mode(
    registered: Option<String>,
    configured: Option<&str>,
) -> Result<Mode> {
    match (registered, configured) {
        (Some(registered), Some(configured)) if registered != configured => {
            Err(Error::InvalidConfig(format!(
                "validator-address {configured} does not match {registered}, \
                 the validator registered for our evm key"
            )))
        }
        (Some(validator), _) => Ok(Mode::Validator(validator)),
        (None, _) => Ok(Mode::Relayer),
    }
}

/// The loops of a process, each one returning its tag and how it stopped.
pub type Loops = JoinSet<(&'static str, Result<()>)>;

fn spawn<L>(loops: &mut Loops, ctx: &OrchestratorContext, job: L)
where
    L: OrchestratorLoop + 'static,
{
    let shutdown = ctx.shutdown_signal();
    let metrics = ctx.metrics.clone();
    let max_retries = ctx.config.orchestrator.max_retries;
    loops.spawn(async move {
        let result = run_loop(&job, shutdown, max_retries, &metrics).await;
        (L::TAG, result)
    });
}

/// Starts the loops of `mode` on background tasks.
pub fn ignite(
    ctx: &OrchestratorContext,
    clients: &Clients,
    params: &Params,
    mode: &Mode,
) -> Loops {
    let config = &ctx.config;
    let orch = &config.orchestrator;
    let period = Duration::from_secs;
    let validator = match mode {
        Mode::Validator(v) => v.clone(),
        Mode::Relayer => String::new(),
    };
    let mut loops = JoinSet::new();
    for duty in duties(config, mode) {
        tracing::debug!(?duty, "starting loop");
        match duty {
            Duty::Oracle => spawn(
                &mut loops,
                ctx,
                EventOracle::builder()
                    .home(clients.home.clone())
                    .evm(clients.evm.clone())
                    .metrics(ctx.metrics.clone())
                    .validator(validator.clone())
                    .confirmations(config.evm.confirmations)
                    .max_blocks_per_step(config.evm.max_blocks_per_step)
                    .period(period(orch.oracle_period))
                    .build(),
            ),
            Duty::Signer => spawn(
                &mut loops,
                ctx,
                Signer::builder()
                    .home(clients.home.clone())
                    .signer(clients.signer.clone())
                    .metrics(ctx.metrics.clone())
                    .validator(validator.clone())
                    .hyperion_id(orch.hyperion_id)
                    .period(period(orch.signer_period))
                    .build(),
            ),
            Duty::BatchRequester => spawn(
                &mut loops,
                ctx,
                BatchRequester::builder()
                    .home(clients.home.clone())
                    .oracle(clients.oracle.clone())
                    .metrics(ctx.metrics.clone())
                    .params(params.clone())
                    .min_batch_fee_usd(orch.min_batch_fee_usd)
                    .period(period(orch.batch_request_period))
                    .build(),
            ),
            Duty::ValsetRelayer => spawn(
                &mut loops,
                ctx,
                ValsetRelayer::builder()
                    .home(clients.home.clone())
                    .evm(clients.evm.clone())
                    .metrics(ctx.metrics.clone())
                    .hyperion_id(orch.hyperion_id)
                    .offset(orch.relay_valset_offset())
                    .period(period(orch.relay_valset_period))
                    .build(),
            ),
            Duty::BatchRelayer => spawn(
                &mut loops,
                ctx,
                BatchRelayer::builder()
                    .home(clients.home.clone())
                    .evm(clients.evm.clone())
                    .oracle(clients.oracle.clone())
                    .metrics(ctx.metrics.clone())
                    .hyperion_id(orch.hyperion_id)
                    .native_token_id(config.evm.native_token_id.clone())
                    .offset(orch.relay_batch_offset())
                    .period(period(orch.relay_batch_period))
                    .build(),
            ),
        }
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        loops = loops.len(),
        started = true,
    );
    loops
}

/// How the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Every loop stopped after a shutdown signal.
    Clean,
    /// A loop gave up.
    LoopFailed,
    /// Loops were still busy when the grace period ended.
    Abandoned,
}

impl Exit {
    /// Process exit code.
    pub fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::LoopFailed => 1,
            Self::Abandoned => 2,
        }
    }
}

/// Drives `loops` until one of them fails or `signal` resolves, then stops
/// all of them, waiting at most `grace` for them to finish.
pub async fn supervise<S>(
    ctx: &OrchestratorContext,
    mut loops: Loops,
    signal: S,
    grace: Duration,
) -> Exit
where
    S: Future<Output = ()>,
{
    tokio::pin!(signal);
    let mut exit = Exit::Clean;
    loop {
        tokio::select! {
            _ = &mut signal => break,
            joined = loops.join_next() => match joined {
                None => break,
                Some(Ok((tag, Ok(())))) => {
                    tracing::info!(%tag, "loop stopped");
                }
                Some(Ok((tag, Err(e)))) => {
                    tracing::error!(%tag, error = %e, "loop failed, stopping");
                    exit = Exit::LoopFailed;
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "loop task panicked, stopping");
                    exit = Exit::LoopFailed;
                    break;
                }
            },
        }
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        shutdown = true,
    );
    ctx.shutdown();
    let drain = async {
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok((tag, Ok(()))) => tracing::debug!(%tag, "loop stopped"),
                Ok((tag, Err(e))) => {
                    tracing::warn!(%tag, error = %e, "loop stopped with error")
                }
                Err(e) => tracing::warn!(error = %e, "loop task panicked"),
            }
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        tracing::warn!(
            remaining = loops.len(),
            "grace period over, abandoning loops"
        );
        loops.abort_all();
        if exit == Exit::Clean {
            exit = Exit::Abandoned;
        }
    }
    exit
}
