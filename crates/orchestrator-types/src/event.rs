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

use ethers::types::{Address, U256};

use crate::BridgeValidator;

/// Tokens were locked in the bridge contract to be sent to the home chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendToCosmosEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub token_contract: Address,
    pub sender: Address,
    /// Destination as given by the depositor, usually a bech32 address.
    pub destination: String,
    pub amount: U256,
    pub data: String,
}

/// A batch was executed by the bridge contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBatchExecutedEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub batch_nonce: u64,
    pub token_contract: Address,
}

/// The bridge contract deployed an ERC20 representing a home-chain denom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20DeployedEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub cosmos_denom: String,
    pub token_contract: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// The bridge contract accepted a new validator set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValsetUpdatedEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub valset_nonce: u64,
    pub reward_amount: U256,
    pub reward_token: Address,
    pub members: Vec<BridgeValidator>,
}

/// Any event of the bridge contract that has to be claimed on the home
/// chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Deposit(SendToCosmosEvent),
    Withdraw(TransactionBatchExecutedEvent),
    Erc20Deployed(Erc20DeployedEvent),
    ValsetUpdated(ValsetUpdatedEvent),
}

impl BridgeEvent {
    /// The contract-wide nonce of the event.
    pub fn event_nonce(&self) -> u64 {
        match self {
            Self::Deposit(e) => e.event_nonce,
            Self::Withdraw(e) => e.event_nonce,
            Self::Erc20Deployed(e) => e.event_nonce,
            Self::ValsetUpdated(e) => e.event_nonce,
        }
    }

    /// The EVM block the event was emitted in.
    pub fn block_height(&self) -> u64 {
        match self {
            Self::Deposit(e) => e.block_height,
            Self::Withdraw(e) => e.block_height,
            Self::Erc20Deployed(e) => e.block_height,
            Self::ValsetUpdated(e) => e.block_height,
        }
    }

    /// Short name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deposit(_) => "deposit",
            Self::Withdraw(_) => "withdraw",
            Self::Erc20Deployed(_) => "erc20_deployed",
            Self::ValsetUpdated(_) => "valset_updated",
        }
    }
}
