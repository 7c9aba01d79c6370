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

//! The two digests the bridge contract verifies signatures against.

use ethers::abi::{self, Token};
use ethers::types::{H256, U256};
use ethers::utils::keccak256;

use crate::{OutgoingTxBatch, Valset};

/// Left-aligned, zero padded `bytes32` of an ASCII method name.
fn method_name(name: &str) -> Token {
    let mut word = [0u8; 32];
    word[..name.len()].copy_from_slice(name.as_bytes());
    Token::FixedBytes(word.to_vec())
}

/// The hyperion id as a big-endian `bytes32` word.
pub fn hyperion_id_word(hyperion_id: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    U256::from(hyperion_id).to_big_endian(&mut word);
    word
}

impl Valset {
    /// The checkpoint stored by the bridge contract for this valset.
    pub fn checkpoint(&self, hyperion_id: u64) -> H256 {
        let validators = self
            .members
            .iter()
            .map(|m| Token::Address(m.ethereum_address))
            .collect();
        let powers = self
            .members
            .iter()
            .map(|m| Token::Uint(m.power.into()))
            .collect();
        let encoded = abi::encode(&[
            Token::FixedBytes(hyperion_id_word(hyperion_id).to_vec()),
            method_name("checkpoint"),
            Token::Uint(self.nonce.into()),
            Token::Array(validators),
            Token::Array(powers),
            Token::Address(self.reward_token),
            Token::Uint(self.reward_amount),
        ]);
        H256(keccak256(encoded))
    }
}

impl OutgoingTxBatch {
    /// The digest signed by orchestrators to approve this batch.
    pub fn hash(&self, hyperion_id: u64) -> H256 {
        let mut amounts = Vec::with_capacity(self.transactions.len());
        let mut destinations = Vec::with_capacity(self.transactions.len());
        let mut fees = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            amounts.push(Token::Uint(tx.erc20_token.amount));
            destinations.push(Token::Address(tx.dest_address));
            fees.push(Token::Uint(tx.erc20_fee.amount));
        }
        let encoded = abi::encode(&[
            Token::FixedBytes(hyperion_id_word(hyperion_id).to_vec()),
            method_name("transactionBatch"),
            Token::Array(amounts),
            Token::Array(destinations),
            Token::Array(fees),
            Token::Uint(self.batch_nonce.into()),
            Token::Address(self.token_contract),
            Token::Uint(self.batch_timeout.into()),
        ]);
        H256(keccak256(encoded))
    }
}
