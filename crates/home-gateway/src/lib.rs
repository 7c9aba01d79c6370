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

//! # Home Chain Gateway
//!
//! Everything the orchestrator reads from, or writes to, the hyperion module
//! of the Helios chain goes through the [`HomeChain`] trait.
//!
//! [`CosmosHomeGateway`] implements it with REST queries and transactions
//! broadcast over Tendermint RPC.

use chrono::{DateTime, Utc};
use ethers::types::{Address, Signature};
use hyperion_orchestrator_types::{
    BatchConfirm, BatchFees, BridgeEvent, Erc20DeployedEvent, LastClaimEvent,
    OutgoingTxBatch, Params, SendToCosmosEvent,
    TransactionBatchExecutedEvent, Valset, ValsetConfirm, ValsetUpdatedEvent,
};
use hyperion_orchestrator_utils::Result;

mod cosmos;
pub mod proto;
mod rest;
mod tx;

pub use cosmos::CosmosHomeGateway;
pub use rest::RestClient;
pub use tx::{account_id, Broadcaster, GasSettings};

/// Queries and transactions of the hyperion module, scoped to one
/// counterparty chain.
///
/// Queries answer `Ok(None)` or an empty list when the entity does not
/// exist. Transactions return once committed, or with
/// [`Error::BroadcastTimeout`](hyperion_orchestrator_utils::Error::BroadcastTimeout).
#[async_trait::async_trait]
pub trait HomeChain: Send + Sync {
    /// Succeeds once the node answers and is not syncing.
    async fn ready(&self) -> Result<()>;
    /// Parameters of the counterparty chain.
    async fn params(&self) -> Result<Params>;
    /// The validator set the module would create now.
    async fn current_valset(&self) -> Result<Option<Valset>>;
    /// The valset with the given nonce.
    async fn valset_at(&self, nonce: u64) -> Result<Option<Valset>>;
    /// The most recent valsets, newest first.
    async fn latest_valsets(&self) -> Result<Vec<Valset>>;
    /// Valsets `address` has not confirmed yet.
    async fn oldest_unsigned_valsets(&self, address: &str)
        -> Result<Vec<Valset>>;
    /// Every confirm of the valset `nonce`.
    async fn all_valset_confirms(&self, nonce: u64)
        -> Result<Vec<ValsetConfirm>>;
    /// The oldest batch `address` has not confirmed yet.
    async fn oldest_unsigned_batch(
        &self,
        address: &str,
    ) -> Result<Option<OutgoingTxBatch>>;
    /// Batches waiting to be relayed.
    async fn latest_batches(&self) -> Result<Vec<OutgoingTxBatch>>;
    /// Every confirm of the batch `nonce` of `token`.
    async fn batch_confirms(
        &self,
        nonce: u64,
        token: Address,
    ) -> Result<Vec<BatchConfirm>>;
    /// Fees of the transfers not batched yet, per token.
    async fn unbatched_fees(&self) -> Result<Vec<BatchFees>>;
    /// The last event `address` got accepted.
    async fn last_claim_event_by_addr(
        &self,
        address: &str,
    ) -> Result<LastClaimEvent>;
    /// The validator that registered `eth` as its orchestrator key.
    async fn validator_address_from_eth(
        &self,
        eth: Address,
    ) -> Result<Option<String>>;
    /// Time of the home block at `height`.
    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>>;

    /// Claims a deposit.
    async fn send_deposit_claim(&self, event: &SendToCosmosEvent)
        -> Result<()>;
    /// Claims an executed batch.
    async fn send_withdraw_claim(
        &self,
        event: &TransactionBatchExecutedEvent,
    ) -> Result<()>;
    /// Claims a valset update of the contract.
    async fn send_valset_claim(&self, event: &ValsetUpdatedEvent)
        -> Result<()>;
    /// Claims a token deployment.
    async fn send_erc20_deployed_claim(
        &self,
        event: &Erc20DeployedEvent,
    ) -> Result<()>;
    /// Submits a signature over the checkpoint of `valset`.
    async fn send_valset_confirm(
        &self,
        eth_signer: Address,
        valset: &Valset,
        signature: Signature,
    ) -> Result<()>;
    /// Submits a signature over the hash of `batch`.
    async fn send_batch_confirm(
        &self,
        eth_signer: Address,
        batch: &OutgoingTxBatch,
        signature: Signature,
    ) -> Result<()>;
    /// Asks the module to build a batch of `denom` transfers.
    async fn request_batch(&self, denom: &str) -> Result<()>;
    /// Registers `eth` and `orchestrator` as the keys of our validator.
    async fn update_orchestrator_addresses(
        &self,
        eth: Address,
        orchestrator: &str,
    ) -> Result<()>;

    /// Claims any bridge event.
    async fn send_claim(&self, event: &BridgeEvent) -> Result<()> {
        match event {
            BridgeEvent::Deposit(e) => self.send_deposit_claim(e).await,
            BridgeEvent::Withdraw(e) => self.send_withdraw_claim(e).await,
            BridgeEvent::Erc20Deployed(e) => {
                self.send_erc20_deployed_claim(e).await
            }
            BridgeEvent::ValsetUpdated(e) => self.send_valset_claim(e).await,
        }
    }
}
