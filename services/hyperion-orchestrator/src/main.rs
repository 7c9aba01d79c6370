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


//! Hyperion Orchestrator Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix;

use hyperion_evm_gateway::EvmChain;
use hyperion_home_gateway::HomeChain;
use hyperion_orchestrator::service::build_axum_services;
use hyperion_orchestrator::{
    await_ready, detect_mode, ignite, load_params, supervise, Clients,
    READINESS_TIMEOUT,
};
use hyperion_orchestrator_config::cli::{
    load_config, setup_logger, Command, Opts,
};
use hyperion_orchestrator_context::OrchestratorContext;
use hyperion_orchestrator_types::PersonalSigner;

/// The main entry point for the orchestrator.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    let dotenv = dotenv::dotenv();
    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;
    setup_logger(
        args.verbose,
        args.json_logs,
        config.telemetry.log_level.as_deref(),
    )?;
    match dotenv {
        Ok(path) => tracing::trace!("Loaded {}", path.display()),
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }

    let ctx = OrchestratorContext::new(config)?;
    let home = Arc::new(ctx.home_gateway()?);
    let signer = Arc::new(ctx.evm_wallet()?);

    if let Some(Command::SetOrchestratorAddress { orchestrator }) =
        args.command
    {
        let orchestrator =
            orchestrator.unwrap_or_else(|| home.orchestrator_address());
        let eth = signer.address();
        home.update_orchestrator_addresses(eth, &orchestrator).await?;
        tracing::info!(?eth, %orchestrator, "registered orchestrator keys");
        return Ok(());
    }

    await_ready("home chain", READINESS_TIMEOUT, || home.ready()).await?;
    let params = home.params().await?;
    let evm = Arc::new(ctx.evm_gateway(params.bridge_contract_address)?);
    let chain = evm.as_ref();
    await_ready("evm chain", READINESS_TIMEOUT, || async move {
        chain.latest_height().await.map(drop)
    })
    .await?;
    let params = load_params(&ctx.config, home.as_ref(), evm.as_ref()).await?;
    let mode = detect_mode(&ctx.config, home.as_ref(), signer.as_ref()).await?;
    let clients = Clients {
        home,
        evm,
        signer,
        oracle: ctx.price_oracle()?,
    };

    if let Some(addr) = ctx.config.telemetry.stats_addr {
        let metrics = ctx.metrics.clone();
        let shutdown = ctx.shutdown_signal();
        tokio::spawn(async move {
            if let Err(e) = build_axum_services(addr, metrics, shutdown).await
            {
                tracing::error!(error = %e, "metrics server stopped");
            }
        });
    }

    // start all loops, this does not block.
    let loops = ignite(&ctx, &clients, &params, &mode);

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let signal = async {
        tokio::select! {
            _ = ctrlc_signal.recv() => {
                tracing::warn!("Interrupted (Ctrl+C) ...");
            },
            _ = termination_signal.recv() => {
                tracing::warn!("Got Terminate signal ...");
            },
            _ = quit_signal.recv() => {
                tracing::warn!("Quitting ...");
            },
        }
    };
    let grace =
        Duration::from_secs(ctx.config.orchestrator.shutdown_grace_period);
    let exit = supervise(&ctx, loops, signal, grace).await;
    tracing::info!(?exit, "Exit ..");
    std::process::exit(exit.code())
}
