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
//! # Orchestrator Loops
//!
//! The duties of an orchestrator, each one an [`OrchestratorLoop`] driven
//! by [`run_loop`]:
//!
//! * [`EventOracle`] claims the events of the bridge contract on the home
//!   chain.
//! * [`Signer`] signs the valsets and batches created by the home chain.
//! * [`BatchRequester`] asks the home chain to batch profitable transfers.
//! * [`ValsetRelayer`] and [`BatchRelayer`] submit signed artefacts to the
//!   bridge contract.

use std::time::Duration;

use hyperion_orchestrator_utils::Result;

mod batch_requester;
mod oracle;
mod relayer;
mod scheduler;
mod signer;

#[cfg(test)]
mod test_utils;

pub use batch_requester::BatchRequester;
pub use oracle::EventOracle;
pub use relayer::{BatchRelayer, ValsetRelayer};
pub use scheduler::run_loop;
pub use signer::Signer;

/// A duty executed periodically by [`run_loop`].
#[async_trait::async_trait]
pub trait OrchestratorLoop: Send + Sync {
    /// A Helper tag used to identify the loop in logs and metrics.
    const TAG: &'static str;

    /// Target time between the start of two ticks.
    fn period(&self) -> Duration;

    /// Runs the duty once.
    async fn tick(&self) -> Result<()>;
}
