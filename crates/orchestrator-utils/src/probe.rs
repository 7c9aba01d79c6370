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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "hyperion_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Orchestrator changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// A loop moved to another state.
    #[display(fmt = "loop_state")]
    LoopState,
    /// Orchestrator sync state on the EVM chain.
    #[display(fmt = "sync")]
    Sync,
    /// Claims submitted by the event oracle.
    #[display(fmt = "oracle")]
    Oracle,
    /// Valset and batch confirmations produced by the signer.
    #[display(fmt = "signer")]
    Signer,
    /// Batch creation requests.
    #[display(fmt = "batch_request")]
    BatchRequest,
    /// Valset updates and batches relayed to the EVM chain.
    #[display(fmt = "relayer")]
    Relayer,
    /// When the orchestrator will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
