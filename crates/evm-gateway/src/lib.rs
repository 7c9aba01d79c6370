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

//! # EVM Chain Gateway
//!
//! Reads events and state of the bridge contract on the counterparty chain
//! and submits valset updates and batches to it.

use ethers::types::{Address, H256, U256};
use hyperion_orchestrator_types::{
    BatchConfirm, BridgeEvent, OutgoingTxBatch, Valset, ValsetConfirm,
};
use hyperion_orchestrator_utils::Result;

pub mod contract;
mod gateway;

pub use gateway::{EthersEvmGateway, GasPolicy};

/// The bridge contract as seen from the orchestrator.
#[async_trait::async_trait]
pub trait EvmChain: Send + Sync {
    /// Chain id of the connected node.
    async fn chain_id(&self) -> Result<u64>;
    /// Height of the latest block.
    async fn latest_height(&self) -> Result<u64>;
    /// Bridge events emitted in `from..=to`, in log order.
    async fn filter_events(&self, from: u64, to: u64)
        -> Result<Vec<BridgeEvent>>;
    /// Nonce of the valset the contract currently trusts.
    async fn contract_valset_nonce(&self) -> Result<u64>;
    /// Checkpoint of the valset the contract currently trusts.
    async fn contract_last_checkpoint(&self) -> Result<H256>;
    /// Nonce of the last batch of `token` executed by the contract.
    async fn contract_last_batch_nonce(&self, token: Address) -> Result<u64>;
    /// Voting power the contract requires to accept a signed artefact.
    async fn contract_power_threshold(&self) -> Result<u64>;
    /// Gas price submissions would use, already adjusted.
    ///
    /// Fails with `Error::FeeTooHigh` above the configured cap.
    async fn gas_price(&self) -> Result<U256>;
    /// Gas the contract would use to execute `batch`.
    async fn estimate_batch_gas(
        &self,
        current: &Valset,
        batch: &OutgoingTxBatch,
        confirms: &[BatchConfirm],
    ) -> Result<U256>;
    /// Moves the contract from `current` to `new`.
    async fn send_valset_update(
        &self,
        current: &Valset,
        new: &Valset,
        confirms: &[ValsetConfirm],
    ) -> Result<H256>;
    /// Executes `batch`, signed by members of `current`.
    async fn send_batch(
        &self,
        current: &Valset,
        batch: &OutgoingTxBatch,
        confirms: &[BatchConfirm],
    ) -> Result<H256>;
}
