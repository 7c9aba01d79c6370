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

//! Types describing the state of the bridge as seen by both chains.

use ethers::types::{Address, U256};

mod event;
mod hash;
pub mod private_key;
pub mod rpc_url;
mod signer;
mod valset;

pub use event::*;
pub use hash::*;
pub use signer::*;
pub use valset::*;

/// A single outbound transfer inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTransferTx {
    pub id: u64,
    /// Bech32 address of the sender on the home chain.
    pub sender: String,
    pub dest_address: Address,
    pub erc20_token: Erc20Token,
    pub erc20_fee: Erc20Token,
}

/// An amount of some ERC20 token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Token {
    pub contract: Address,
    pub amount: U256,
}

/// A batch of outbound transfers of a single token, executed atomically on
/// the EVM chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTxBatch {
    pub batch_nonce: u64,
    /// EVM height from which the batch can no longer be executed.
    pub batch_timeout: u64,
    pub transactions: Vec<OutgoingTransferTx>,
    pub token_contract: Address,
    /// Home block at which the batch was created.
    pub block: u64,
}

impl OutgoingTxBatch {
    /// Sum of the fees paid by all transfers of the batch.
    pub fn total_fees(&self) -> U256 {
        self.transactions
            .iter()
            .fold(U256::zero(), |acc, tx| acc + tx.erc20_fee.amount)
    }

    /// Whether the batch can no longer be executed at `evm_height`.
    pub fn is_timed_out(&self, evm_height: u64) -> bool {
        self.batch_timeout <= evm_height
    }
}

/// The last EVM event a given orchestrator got accepted on the home chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastClaimEvent {
    pub ethereum_event_nonce: u64,
    pub ethereum_event_height: u64,
}

/// Fees waiting in the unbatched pool of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFees {
    pub token: Address,
    pub total_fees: U256,
    pub tx_count: u64,
}

/// Maps an ERC20 contract to its denom on the home chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDenom {
    pub erc20: Address,
    pub denom: String,
}

/// Parameters of one counterparty chain of the hyperion module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    pub hyperion_id: u64,
    pub bridge_contract_address: Address,
    pub bridge_chain_id: u64,
    /// Milliseconds.
    pub average_ethereum_block_time: u64,
    pub token_denoms: Vec<TokenDenom>,
}

impl Params {
    /// Looks up the home-chain denom of an ERC20 contract.
    pub fn denom_for(&self, erc20: Address) -> Option<&str> {
        self.token_denoms
            .iter()
            .find(|t| t.erc20 == erc20)
            .map(|t| t.denom.as_str())
    }
}
