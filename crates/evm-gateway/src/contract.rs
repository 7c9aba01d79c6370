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

//! Binding of the bridge contract and conversions from and to its types.

use ethers::abi::RawLog;
use ethers::contract::{abigen, EthEvent};
use ethers::types::{Address, Log, Signature, H256, U256};
use hyperion_orchestrator_types as types;
use hyperion_orchestrator_utils::{Error, Result};

abigen!(
    Hyperion,
    r#"[
        struct ValsetArgs { address[] validators; uint256[] powers; uint256 valsetNonce; uint256 rewardAmount; address rewardToken; }
        function state_lastValsetNonce() external view returns (uint256)
        function state_lastValsetCheckpoint() external view returns (bytes32)
        function state_powerThreshold() external view returns (uint256)
        function lastBatchNonce(address erc20Address) external view returns (uint256)
        function updateValset(ValsetArgs calldata newValset, ValsetArgs calldata currentValset, uint8[] calldata v, bytes32[] calldata r, bytes32[] calldata s) external
        function submitBatch(ValsetArgs calldata currentValset, uint8[] calldata v, bytes32[] calldata r, bytes32[] calldata s, uint256[] calldata amounts, address[] calldata destinations, uint256[] calldata fees, uint256 batchNonce, address tokenContract, uint256 batchTimeout) external
    ]"#,
);

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "SendToCosmosEvent")]
pub struct SendToCosmosFilter {
    #[ethevent(indexed)]
    pub token_contract: Address,
    #[ethevent(indexed)]
    pub sender: Address,
    #[ethevent(indexed)]
    pub event_nonce: U256,
    pub destination: String,
    pub amount: U256,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "TransactionBatchExecutedEvent")]
pub struct BatchExecutedFilter {
    #[ethevent(indexed)]
    pub batch_nonce: U256,
    #[ethevent(indexed)]
    pub token: Address,
    #[ethevent(indexed)]
    pub event_nonce: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "ERC20DeployedEvent")]
pub struct Erc20DeployedFilter {
    pub cosmos_denom: String,
    #[ethevent(indexed)]
    pub token_contract: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[ethevent(indexed)]
    pub event_nonce: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "ValsetUpdatedEvent")]
pub struct ValsetUpdatedFilter {
    #[ethevent(indexed)]
    pub new_valset_nonce: U256,
    #[ethevent(indexed)]
    pub event_nonce: U256,
    pub reward_amount: U256,
    pub reward_token: Address,
    pub validators: Vec<Address>,
    pub powers: Vec<U256>,
}

/// topic0 of every event the orchestrator claims.
pub fn event_signatures() -> Vec<H256> {
    vec![
        SendToCosmosFilter::signature(),
        BatchExecutedFilter::signature(),
        Erc20DeployedFilter::signature(),
        ValsetUpdatedFilter::signature(),
    ]
}

fn to_u64(field: &'static str, value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        tracing::error!(%field, %value, "value does not fit in 64 bits");
        return Err(Error::Generic("contract value overflows u64"));
    }
    Ok(value.as_u64())
}

/// Decodes a log of the bridge contract.
///
/// Returns `Ok(None)` for logs of events the orchestrator does not claim.
pub fn decode_event(log: &Log) -> Result<Option<types::BridgeEvent>> {
    let Some(topic0) = log.topics.first().copied() else {
        return Ok(None);
    };
    let block_height = log
        .block_number
        .ok_or(Error::Generic("log without a block number"))?
        .as_u64();
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    let event = if topic0 == SendToCosmosFilter::signature() {
        let e = SendToCosmosFilter::decode_log(&raw)?;
        types::BridgeEvent::Deposit(types::SendToCosmosEvent {
            event_nonce: to_u64("eventNonce", e.event_nonce)?,
            block_height,
            token_contract: e.token_contract,
            sender: e.sender,
            destination: e.destination,
            amount: e.amount,
            data: e.data,
        })
    } else if topic0 == BatchExecutedFilter::signature() {
        let e = BatchExecutedFilter::decode_log(&raw)?;
        types::BridgeEvent::Withdraw(types::TransactionBatchExecutedEvent {
            event_nonce: to_u64("eventNonce", e.event_nonce)?,
            block_height,
            batch_nonce: to_u64("batchNonce", e.batch_nonce)?,
            token_contract: e.token,
        })
    } else if topic0 == Erc20DeployedFilter::signature() {
        let e = Erc20DeployedFilter::decode_log(&raw)?;
        types::BridgeEvent::Erc20Deployed(types::Erc20DeployedEvent {
            event_nonce: to_u64("eventNonce", e.event_nonce)?,
            block_height,
            cosmos_denom: e.cosmos_denom,
            token_contract: e.token_contract,
            name: e.name,
            symbol: e.symbol,
            decimals: e.decimals,
        })
    } else if topic0 == ValsetUpdatedFilter::signature() {
        let e = ValsetUpdatedFilter::decode_log(&raw)?;
        if e.validators.len() != e.powers.len() {
            return Err(Error::Generic(
                "valset update with mismatched validators and powers",
            ));
        }
        let members = e
            .validators
            .into_iter()
            .zip(e.powers)
            .map(|(ethereum_address, power)| {
                Ok(types::BridgeValidator {
                    power: to_u64("power", power)?,
                    ethereum_address,
                })
            })
            .collect::<Result<_>>()?;
        types::BridgeEvent::ValsetUpdated(types::ValsetUpdatedEvent {
            event_nonce: to_u64("eventNonce", e.event_nonce)?,
            block_height,
            valset_nonce: to_u64("newValsetNonce", e.new_valset_nonce)?,
            reward_amount: e.reward_amount,
            reward_token: e.reward_token,
            members,
        })
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

impl From<&types::Valset> for ValsetArgs {
    fn from(valset: &types::Valset) -> Self {
        Self {
            validators: valset
                .members
                .iter()
                .map(|m| m.ethereum_address)
                .collect(),
            powers: valset.members.iter().map(|m| m.power.into()).collect(),
            valset_nonce: valset.nonce.into(),
            reward_amount: valset.reward_amount,
            reward_token: valset.reward_token,
        }
    }
}

/// Signatures as the contract expects them: one `(v, r, s)` per member of
/// the current valset, in member order, zeroed when the member did not sign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureArrays {
    pub v: Vec<u8>,
    pub r: Vec<[u8; 32]>,
    pub s: Vec<[u8; 32]>,
}

impl SignatureArrays {
    /// Lays out `confirms` following the members of `current`.
    pub fn new<'a, I>(current: &types::Valset, confirms: I) -> Self
    where
        I: IntoIterator<Item = (Address, &'a Signature)> + Clone,
    {
        let mut arrays = Self::default();
        for member in &current.members {
            let sig = confirms
                .clone()
                .into_iter()
                .find(|(signer, _)| *signer == member.ethereum_address)
                .map(|(_, sig)| sig);
            match sig {
                Some(sig) => {
                    let mut r = [0u8; 32];
                    let mut s = [0u8; 32];
                    sig.r.to_big_endian(&mut r);
                    sig.s.to_big_endian(&mut s);
                    arrays.v.push(sig.v as u8);
                    arrays.r.push(r);
                    arrays.s.push(s);
                }
                None => {
                    arrays.v.push(0);
                    arrays.r.push([0u8; 32]);
                    arrays.s.push([0u8; 32]);
                }
            }
        }
        arrays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valset() -> types::Valset {
        types::Valset {
            nonce: 4,
            members: vec![
                types::BridgeValidator {
                    power: 10,
                    ethereum_address: Address::repeat_byte(1),
                },
                types::BridgeValidator {
                    power: 20,
                    ethereum_address: Address::repeat_byte(2),
                },
                types::BridgeValidator {
                    power: 30,
                    ethereum_address: Address::repeat_byte(3),
                },
            ],
            height: 1,
            reward_amount: U256::zero(),
            reward_token: Address::zero(),
        }
    }

    #[test]
    fn signatures_follow_member_order() {
        let sig3 = Signature {
            r: U256::from(3),
            s: U256::from(33),
            v: 28,
        };
        let sig1 = Signature {
            r: U256::from(1),
            s: U256::from(11),
            v: 27,
        };
        let outsider = Signature {
            r: U256::from(9),
            s: U256::from(99),
            v: 27,
        };
        let confirms = vec![
            (Address::repeat_byte(3), &sig3),
            (Address::repeat_byte(9), &outsider),
            (Address::repeat_byte(1), &sig1),
        ];
        let arrays = SignatureArrays::new(&valset(), confirms);
        assert_eq!(arrays.v, vec![27, 0, 28]);
        assert_eq!(arrays.r[0][31], 1);
        assert_eq!(arrays.r[1], [0u8; 32]);
        assert_eq!(arrays.s[2][31], 33);
    }

    #[test]
    fn valset_args_keep_member_order() {
        let args = ValsetArgs::from(&valset());
        assert_eq!(args.validators[2], Address::repeat_byte(3));
        assert_eq!(args.powers, vec![10.into(), 20.into(), 30.into()]);
        assert_eq!(args.valset_nonce, 4.into());
    }

    fn log(topics: Vec<H256>, data: Vec<u8>, block: u64) -> Log {
        Log {
            topics,
            data: data.into(),
            block_number: Some(block.into()),
            ..Default::default()
        }
    }

    fn word(value: u64) -> H256 {
        H256::from_low_u64_be(value)
    }

    #[test]
    fn signatures_match_the_contract_abi() {
        use ethers::utils::keccak256;
        assert_eq!(
            SendToCosmosFilter::signature(),
            H256(keccak256(
                "SendToCosmosEvent(address,address,uint256,string,uint256,string)"
            ))
        );
        assert_eq!(
            Erc20DeployedFilter::signature(),
            H256(keccak256(
                "ERC20DeployedEvent(string,address,string,string,uint8,uint256)"
            ))
        );
        assert_eq!(
            ValsetUpdatedFilter::signature(),
            H256(keccak256(
                "ValsetUpdatedEvent(uint256,uint256,uint256,address,address[],uint256[])"
            ))
        );
    }

    #[test]
    fn decodes_withdraw_logs() {
        let token = Address::repeat_byte(0xaa);
        let log = log(
            vec![
                BatchExecutedFilter::signature(),
                word(9),
                H256::from(token),
                word(31),
            ],
            vec![],
            1_234,
        );
        let event = decode_event(&log).unwrap().unwrap();
        assert_eq!(
            event,
            types::BridgeEvent::Withdraw(types::TransactionBatchExecutedEvent {
                event_nonce: 31,
                block_height: 1_234,
                batch_nonce: 9,
                token_contract: token,
            })
        );
    }

    #[test]
    fn decodes_valset_update_logs() {
        use ethers::abi::{encode, Token};
        let data = encode(&[
            Token::Uint(0.into()),
            Token::Address(Address::zero()),
            Token::Array(vec![Token::Address(Address::repeat_byte(1))]),
            Token::Array(vec![Token::Uint(100.into())]),
        ]);
        let log = log(
            vec![ValsetUpdatedFilter::signature(), word(5), word(12)],
            data,
            77,
        );
        let event = decode_event(&log).unwrap().unwrap();
        assert_eq!(event.event_nonce(), 12);
        assert_eq!(event.block_height(), 77);
        match event {
            types::BridgeEvent::ValsetUpdated(e) => {
                assert_eq!(e.valset_nonce, 5);
                assert_eq!(e.members[0].power, 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn ignores_foreign_logs() {
        let log = log(vec![word(1)], vec![], 1);
        assert!(decode_event(&log).unwrap().is_none());
    }
}
