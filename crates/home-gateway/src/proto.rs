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

//! Protobuf messages of the `helios.hyperion.v1` module.

use cosmrs::Any;
use prost::Message;

/// Wraps a message into an [`Any`] with its type url.
pub trait TypeUrl: Message + Sized {
    /// The fully qualified type url of the message.
    const TYPE_URL: &'static str;

    /// Encodes the message as an [`Any`].
    fn to_any(&self) -> Any {
        Any {
            type_url: Self::TYPE_URL.to_owned(),
            value: self.encode_to_vec(),
        }
    }
}

macro_rules! type_url {
    ($ty:ident, $url:literal) => {
        impl TypeUrl for $ty {
            const TYPE_URL: &'static str = $url;
        }
    };
}

/// A compressed secp256k1 key with ethereum style addresses.
#[derive(Clone, PartialEq, Message)]
pub struct EthSecp256k1PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}
type_url!(EthSecp256k1PubKey, "/ethermint.crypto.v1.ethsecp256k1.PubKey");

#[derive(Clone, PartialEq, Message)]
pub struct BridgeValidator {
    #[prost(uint64, tag = "1")]
    pub power: u64,
    #[prost(string, tag = "2")]
    pub ethereum_address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgValsetConfirm {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub orchestrator: String,
    #[prost(string, tag = "3")]
    pub eth_address: String,
    #[prost(string, tag = "4")]
    pub signature: String,
    #[prost(uint64, tag = "5")]
    pub hyperion_id: u64,
}
type_url!(MsgValsetConfirm, "/helios.hyperion.v1.MsgValsetConfirm");

#[derive(Clone, PartialEq, Message)]
pub struct MsgConfirmBatch {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub token_contract: String,
    #[prost(string, tag = "3")]
    pub eth_signer: String,
    #[prost(string, tag = "4")]
    pub orchestrator: String,
    #[prost(string, tag = "5")]
    pub signature: String,
    #[prost(uint64, tag = "6")]
    pub hyperion_id: u64,
}
type_url!(MsgConfirmBatch, "/helios.hyperion.v1.MsgConfirmBatch");

#[derive(Clone, PartialEq, Message)]
pub struct MsgDepositClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(string, tag = "3")]
    pub token_contract: String,
    #[prost(string, tag = "4")]
    pub amount: String,
    #[prost(string, tag = "5")]
    pub ethereum_sender: String,
    #[prost(string, tag = "6")]
    pub cosmos_receiver: String,
    #[prost(string, tag = "7")]
    pub orchestrator: String,
    #[prost(string, tag = "8")]
    pub data: String,
    #[prost(uint64, tag = "9")]
    pub hyperion_id: u64,
}
type_url!(MsgDepositClaim, "/helios.hyperion.v1.MsgDepositClaim");

#[derive(Clone, PartialEq, Message)]
pub struct MsgWithdrawClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(uint64, tag = "3")]
    pub batch_nonce: u64,
    #[prost(string, tag = "4")]
    pub token_contract: String,
    #[prost(string, tag = "5")]
    pub orchestrator: String,
    #[prost(uint64, tag = "6")]
    pub hyperion_id: u64,
}
type_url!(MsgWithdrawClaim, "/helios.hyperion.v1.MsgWithdrawClaim");

#[derive(Clone, PartialEq, Message)]
pub struct MsgErc20DeployedClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(string, tag = "3")]
    pub cosmos_denom: String,
    #[prost(string, tag = "4")]
    pub token_contract: String,
    #[prost(string, tag = "5")]
    pub name: String,
    #[prost(string, tag = "6")]
    pub symbol: String,
    #[prost(uint64, tag = "7")]
    pub decimals: u64,
    #[prost(string, tag = "8")]
    pub orchestrator: String,
    #[prost(uint64, tag = "9")]
    pub hyperion_id: u64,
}
type_url!(MsgErc20DeployedClaim, "/helios.hyperion.v1.MsgERC20DeployedClaim");

#[derive(Clone, PartialEq, Message)]
pub struct MsgValsetUpdatedClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub valset_nonce: u64,
    #[prost(uint64, tag = "3")]
    pub block_height: u64,
    #[prost(message, repeated, tag = "4")]
    pub members: Vec<BridgeValidator>,
    #[prost(string, tag = "5")]
    pub reward_amount: String,
    #[prost(string, tag = "6")]
    pub reward_token: String,
    #[prost(string, tag = "7")]
    pub orchestrator: String,
    #[prost(uint64, tag = "8")]
    pub hyperion_id: u64,
}
type_url!(MsgValsetUpdatedClaim, "/helios.hyperion.v1.MsgValsetUpdatedClaim");

#[derive(Clone, PartialEq, Message)]
pub struct MsgRequestBatch {
    #[prost(string, tag = "1")]
    pub orchestrator: String,
    #[prost(string, tag = "2")]
    pub denom: String,
    #[prost(uint64, tag = "3")]
    pub hyperion_id: u64,
}
type_url!(MsgRequestBatch, "/helios.hyperion.v1.MsgRequestBatch");

#[derive(Clone, PartialEq, Message)]
pub struct MsgSetOrchestratorAddresses {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(string, tag = "2")]
    pub orchestrator: String,
    #[prost(string, tag = "3")]
    pub eth_address: String,
    #[prost(uint64, tag = "4")]
    pub hyperion_id: u64,
}
type_url!(
    MsgSetOrchestratorAddresses,
    "/helios.hyperion.v1.MsgSetOrchestratorAddresses"
);
