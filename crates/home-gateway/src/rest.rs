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

//! JSON views of the REST (LCD) API and their conversion to domain types.
//!
//! The gateway encodes 64-bit integers as strings, addresses as hex strings
//! and signatures as `0x` prefixed hex.

use std::str::FromStr;

use ethers::types::{Address, Signature, U256};
use hyperion_orchestrator_types as types;
use hyperion_orchestrator_utils::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Accepts `"42"` as well as `42`.
pub(crate) fn de_u64<'de, D>(d: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }
    match Raw::deserialize(d)? {
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

fn parse<T>(field: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| Error::InvalidResponse {
        endpoint: field.to_owned(),
        reason: format!("{value:?}: {e}"),
    })
}

fn parse_u256(field: &str, value: &str) -> Result<U256> {
    if value.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(value).map_err(|e| Error::InvalidResponse {
        endpoint: field.to_owned(),
        reason: format!("{value:?}: {e}"),
    })
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    if value.is_empty() {
        return Ok(Address::zero());
    }
    parse(field, value)
}

fn parse_signature(field: &str, value: &str) -> Result<Signature> {
    let bytes = hex::decode(value.trim_start_matches("0x")).map_err(|e| {
        Error::InvalidResponse {
            endpoint: field.to_owned(),
            reason: e.to_string(),
        }
    })?;
    let mut sig = Signature::try_from(bytes.as_slice())?;
    // the chain stores v as 0/1 or 27/28.
    if sig.v < 27 {
        sig.v += 27;
    }
    Ok(sig)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParamsResponse {
    pub params: RawParams,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawParams {
    #[serde(default)]
    pub counterparty_chain_params: Vec<RawCounterpartyParams>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCounterpartyParams {
    #[serde(deserialize_with = "de_u64")]
    pub hyperion_id: u64,
    pub bridge_counterparty_address: String,
    #[serde(deserialize_with = "de_u64")]
    pub bridge_chain_id: u64,
    #[serde(deserialize_with = "de_u64", default)]
    pub average_counterparty_block_time: u64,
    #[serde(default)]
    pub token_address_to_denoms: Vec<RawTokenDenom>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTokenDenom {
    pub token_address: String,
    pub denom: String,
}

impl RawCounterpartyParams {
    pub fn into_params(self) -> Result<types::Params> {
        let token_denoms = self
            .token_address_to_denoms
            .into_iter()
            .map(|t| {
                Ok(types::TokenDenom {
                    erc20: parse_address("token_address", &t.token_address)?,
                    denom: t.denom,
                })
            })
            .collect::<Result<_>>()?;
        Ok(types::Params {
            hyperion_id: self.hyperion_id,
            bridge_contract_address: parse_address(
                "bridge_counterparty_address",
                &self.bridge_counterparty_address,
            )?,
            bridge_chain_id: self.bridge_chain_id,
            average_ethereum_block_time: self.average_counterparty_block_time,
            token_denoms,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBridgeValidator {
    #[serde(deserialize_with = "de_u64", default)]
    pub power: u64,
    pub ethereum_address: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawValset {
    #[serde(deserialize_with = "de_u64", default)]
    pub nonce: u64,
    #[serde(default)]
    pub members: Vec<RawBridgeValidator>,
    #[serde(deserialize_with = "de_u64", default)]
    pub height: u64,
    #[serde(default)]
    pub reward_amount: String,
    #[serde(default)]
    pub reward_token: String,
}

impl TryFrom<RawValset> for types::Valset {
    type Error = Error;

    fn try_from(raw: RawValset) -> Result<Self> {
        let members = raw
            .members
            .into_iter()
            .map(|m| {
                Ok(types::BridgeValidator {
                    power: m.power,
                    ethereum_address: parse_address(
                        "ethereum_address",
                        &m.ethereum_address,
                    )?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            nonce: raw.nonce,
            members,
            height: raw.height,
            reward_amount: parse_u256("reward_amount", &raw.reward_amount)?,
            reward_token: parse_address("reward_token", &raw.reward_token)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValsetResponse {
    pub valset: Option<RawValset>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValsetsResponse {
    #[serde(default)]
    pub valsets: Vec<RawValset>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawValsetConfirm {
    #[serde(deserialize_with = "de_u64")]
    pub nonce: u64,
    pub orchestrator: String,
    pub eth_address: String,
    pub signature: String,
}

impl TryFrom<RawValsetConfirm> for types::ValsetConfirm {
    type Error = Error;

    fn try_from(raw: RawValsetConfirm) -> Result<Self> {
        Ok(Self {
            nonce: raw.nonce,
            orchestrator: raw.orchestrator,
            eth_address: parse_address("eth_address", &raw.eth_address)?,
            signature: parse_signature("signature", &raw.signature)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValsetConfirmsResponse {
    #[serde(default)]
    pub confirms: Vec<RawValsetConfirm>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawErc20Token {
    pub contract: String,
    pub amount: String,
}

impl TryFrom<RawErc20Token> for types::Erc20Token {
    type Error = Error;

    fn try_from(raw: RawErc20Token) -> Result<Self> {
        Ok(Self {
            contract: parse_address("contract", &raw.contract)?,
            amount: parse_u256("amount", &raw.amount)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOutgoingTransferTx {
    #[serde(deserialize_with = "de_u64")]
    pub id: u64,
    pub sender: String,
    pub dest_address: String,
    pub erc20_token: RawErc20Token,
    pub erc20_fee: RawErc20Token,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOutgoingTxBatch {
    #[serde(deserialize_with = "de_u64")]
    pub batch_nonce: u64,
    #[serde(deserialize_with = "de_u64")]
    pub batch_timeout: u64,
    #[serde(default)]
    pub transactions: Vec<RawOutgoingTransferTx>,
    pub token_contract: String,
    #[serde(deserialize_with = "de_u64", default)]
    pub block: u64,
}

impl TryFrom<RawOutgoingTxBatch> for types::OutgoingTxBatch {
    type Error = Error;

    fn try_from(raw: RawOutgoingTxBatch) -> Result<Self> {
        let transactions = raw
            .transactions
            .into_iter()
            .map(|tx| {
                Ok(types::OutgoingTransferTx {
                    id: tx.id,
                    sender: tx.sender,
                    dest_address: parse_address(
                        "dest_address",
                        &tx.dest_address,
                    )?,
                    erc20_token: tx.erc20_token.try_into()?,
                    erc20_fee: tx.erc20_fee.try_into()?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            batch_nonce: raw.batch_nonce,
            batch_timeout: raw.batch_timeout,
            transactions,
            token_contract: parse_address(
                "token_contract",
                &raw.token_contract,
            )?,
            block: raw.block,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponse {
    pub batch: Option<RawOutgoingTxBatch>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchesResponse {
    #[serde(default)]
    pub batches: Vec<RawOutgoingTxBatch>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBatchConfirm {
    #[serde(deserialize_with = "de_u64")]
    pub nonce: u64,
    pub token_contract: String,
    pub eth_signer: String,
    pub orchestrator: String,
    pub signature: String,
}

impl TryFrom<RawBatchConfirm> for types::BatchConfirm {
    type Error = Error;

    fn try_from(raw: RawBatchConfirm) -> Result<Self> {
        Ok(Self {
            nonce: raw.nonce,
            token_contract: parse_address(
                "token_contract",
                &raw.token_contract,
            )?,
            eth_signer: parse_address("eth_signer", &raw.eth_signer)?,
            orchestrator: raw.orchestrator,
            signature: parse_signature("signature", &raw.signature)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchConfirmsResponse {
    #[serde(default)]
    pub confirms: Vec<RawBatchConfirm>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBatchFees {
    pub token: String,
    pub total_fees: String,
    #[serde(deserialize_with = "de_u64", default)]
    pub tx_count: u64,
}

impl TryFrom<RawBatchFees> for types::BatchFees {
    type Error = Error;

    fn try_from(raw: RawBatchFees) -> Result<Self> {
        Ok(Self {
            token: parse_address("token", &raw.token)?,
            total_fees: parse_u256("total_fees", &raw.total_fees)?,
            tx_count: raw.tx_count,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchFeesResponse {
    #[serde(default)]
    pub batch_fees: Vec<RawBatchFees>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LastClaimEventResponse {
    pub last_claim_event: Option<RawLastClaimEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLastClaimEvent {
    #[serde(deserialize_with = "de_u64", default)]
    pub ethereum_event_nonce: u64,
    #[serde(deserialize_with = "de_u64", default)]
    pub ethereum_event_height: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DelegateKeysResponse {
    #[serde(default)]
    pub validator_address: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountResponse {
    pub account: RawAccount,
}

/// Either a plain `BaseAccount` or an `EthAccount` wrapping one.
#[derive(Debug, Deserialize)]
pub(crate) struct RawAccount {
    pub base_account: Option<RawBaseAccount>,
    #[serde(flatten)]
    pub inline: Option<RawBaseAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawBaseAccount {
    #[serde(deserialize_with = "de_u64")]
    pub account_number: u64,
    #[serde(deserialize_with = "de_u64")]
    pub sequence: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockResponse {
    pub block: RawBlock,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBlock {
    pub header: RawHeader,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHeader {
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncingResponse {
    pub syncing: bool,
}

/// A thin JSON client of the REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    base: url::Url,
    http: reqwest::Client,
}

impl RestClient {
    /// Creates a client for the API served under `base`.
    pub fn new(base: url::Url, http: reqwest::Client) -> Self {
        let mut base = base;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Self { base, http }
    }

    /// GETs `path`, `Ok(None)` when the entity does not exist.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = self.base.join(path.trim_start_matches('/'))?;
        tracing::trace!(%url, "GET");
        let res = self.http.get(url.clone()).query(query).send().await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(%url, "not found");
            return Ok(None);
        }
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            // grpc-gateway answers NotFound (code 5) with a 404 or a 500
            // depending on the version.
            if body.contains("\"code\":5") || body.contains("not found") {
                tracing::debug!(%url, "not found");
                return Ok(None);
            }
            return Err(Error::InvalidResponse {
                endpoint: url.to_string(),
                reason: format!("{status}: {body}"),
            });
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| Error::InvalidResponse {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })
    }
}
