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

use std::collections::HashSet;

use ethers::types::{Address, RecoveryMessage, Signature, H256, U256};

/// A member of a validator set, as known by the bridge contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeValidator {
    pub power: u64,
    pub ethereum_address: Address,
}

/// An ordered validator set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valset {
    pub nonce: u64,
    pub members: Vec<BridgeValidator>,
    /// Home block at which the valset was created.
    pub height: u64,
    pub reward_amount: U256,
    pub reward_token: Address,
}

impl Valset {
    /// Voting power of `address`, zero when it is not a member.
    pub fn power_of(&self, address: Address) -> u64 {
        self.members
            .iter()
            .find(|m| m.ethereum_address == address)
            .map(|m| m.power)
            .unwrap_or_default()
    }

    /// Sum of the power of all members.
    pub fn total_power(&self) -> u64 {
        self.members.iter().map(|m| m.power).sum()
    }

    /// Sums the power of the members of this set that produced a valid
    /// personal signature over `digest`.
    ///
    /// A signature that does not recover to its claimed signer, a signer
    /// outside of this set, or a repeated signer adds nothing.
    pub fn confirmed_power<'a, I>(&self, digest: H256, confirms: I) -> u64
    where
        I: IntoIterator<Item = (Address, &'a Signature)>,
    {
        let mut seen = HashSet::new();
        confirms
            .into_iter()
            .filter(|(signer, sig)| {
                match sig.recover(RecoveryMessage::Data(
                    digest.as_bytes().to_vec(),
                )) {
                    Ok(recovered) if recovered == *signer => true,
                    Ok(recovered) => {
                        tracing::warn!(
                            %signer,
                            %recovered,
                            "confirm signature recovers to another address",
                        );
                        false
                    }
                    Err(e) => {
                        tracing::warn!(
                            %signer,
                            error = %e,
                            "bad confirm signature"
                        );
                        false
                    }
                }
            })
            .filter(|(signer, _)| seen.insert(*signer))
            .map(|(signer, _)| self.power_of(signer))
            .sum()
    }
}

/// A signature of an orchestrator over a valset checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValsetConfirm {
    pub nonce: u64,
    /// Bech32 address of the orchestrator on the home chain.
    pub orchestrator: String,
    pub eth_address: Address,
    pub signature: Signature,
}

/// A signature of an orchestrator over a batch hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfirm {
    pub nonce: u64,
    pub token_contract: Address,
    pub eth_signer: Address,
    pub orchestrator: String,
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use ethers::signers::{LocalWallet, Signer};

    use super::*;

    fn wallet(seed: u8) -> LocalWallet {
        LocalWallet::from_bytes(&[seed; 32]).unwrap()
    }

    #[tokio::test]
    async fn counts_only_valid_member_signatures() {
        let (a, b, outsider) = (wallet(1), wallet(2), wallet(3));
        let valset = Valset {
            nonce: 1,
            members: vec![
                BridgeValidator {
                    power: 60,
                    ethereum_address: a.address(),
                },
                BridgeValidator {
                    power: 40,
                    ethereum_address: b.address(),
                },
            ],
            height: 1,
            reward_amount: U256::zero(),
            reward_token: Address::zero(),
        };
        let digest = H256::repeat_byte(7);
        let sig_a = a.sign_message(digest.as_bytes()).await.unwrap();
        let sig_b_other = b
            .sign_message(H256::repeat_byte(8).as_bytes())
            .await
            .unwrap();
        let sig_out = outsider.sign_message(digest.as_bytes()).await.unwrap();

        let confirms = vec![
            (a.address(), &sig_a),
            (a.address(), &sig_a),
            (b.address(), &sig_b_other),
            (outsider.address(), &sig_out),
        ];
        assert_eq!(valset.confirmed_power(digest, confirms), 60);
        assert_eq!(valset.total_power(), 100);
    }
}
