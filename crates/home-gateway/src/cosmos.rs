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

use chrono::{DateTime, Utc};
use cosmrs::rpc::{Client, HttpClient};
use ethers::types::{Address, Signature};
use ethers::utils::to_checksum;
use hyperion_orchestrator_types::{
    BatchConfirm, BatchFees, Erc20DeployedEvent, LastClaimEvent,
    OutgoingTxBatch, Params, SendToCosmosEvent,
    TransactionBatchExecutedEvent, Valset, ValsetConfirm, ValsetUpdatedEvent,
};
use hyperion_orchestrator_utils::{Error, Result};

use crate::proto::{self, TypeUrl};
use crate::rest::{self, RestClient};
use crate::tx::Broadcaster;

const MODULE: &str = "helios/hyperion/v1";

fn eth_hex(address: Address) -> String {
    to_checksum(&address, None)
}

fn signature_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.to_vec()))
}

/// [`HomeChain`](crate::HomeChain) over the REST API and Tendermint RPC of a
/// Helios node.
#[derive(Debug)]
pub struct CosmosHomeGateway {
    rest: RestClient,
    rpc: HttpClient,
    broadcaster: Broadcaster,
    hyperion_id: u64,
}

impl CosmosHomeGateway {
    /// Creates a gateway scoped to the counterparty chain `hyperion_id`.
    pub fn new(
        rest: RestClient,
        rpc: HttpClient,
        broadcaster: Broadcaster,
        hyperion_id: u64,
    ) -> Self {
        Self {
            rest,
            rpc,
            broadcaster,
            hyperion_id,
        }
    }

    /// The bech32 address that signs our transactions.
    pub fn orchestrator_address(&self) -> String {
        self.broadcaster.account().to_string()
    }

    fn path(&self, route: &str) -> String {
        format!("{MODULE}/{}/{route}", self.hyperion_id)
    }

    async fn broadcast<M: TypeUrl>(&self, msg: M) -> Result<()> {
        self.broadcaster.broadcast(vec![msg.to_any()]).await
    }
}

#[async_trait::async_trait]
impl crate::HomeChain for CosmosHomeGateway {
    async fn ready(&self) -> Result<()> {
        let status = self.rpc.status().await?;
        if status.sync_info.catching_up {
            return Err(Error::Generic("home node is catching up"));
        }
        let syncing: Option<rest::SyncingResponse> = self
            .rest
            .get("cosmos/base/tendermint/v1beta1/syncing", &[])
            .await?;
        match syncing {
            Some(s) if !s.syncing => Ok(()),
            Some(_) => Err(Error::Generic("home node is syncing")),
            None => Err(Error::NotFound("syncing endpoint".into())),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn params(&self) -> Result<Params> {
        let res: rest::ParamsResponse = self
            .rest
            .get(&format!("{MODULE}/params"), &[])
            .await?
            .ok_or_else(|| Error::NotFound("hyperion params".into()))?;
        res.params
            .counterparty_chain_params
            .into_iter()
            .find(|p| p.hyperion_id == self.hyperion_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "counterparty chain with hyperion id {}",
                    self.hyperion_id
                ))
            })?
            .into_params()
    }

    async fn current_valset(&self) -> Result<Option<Valset>> {
        let res: Option<rest::ValsetResponse> =
            self.rest.get(&self.path("valset/current"), &[]).await?;
        res.and_then(|r| r.valset).map(TryInto::try_into).transpose()
    }

    async fn valset_at(&self, nonce: u64) -> Result<Option<Valset>> {
        let res: Option<rest::ValsetResponse> = self
            .rest
            .get(&self.path(&format!("valset/{nonce}")), &[])
            .await?;
        res.and_then(|r| r.valset)
            .map(TryInto::try_into)
            .transpose()
            // an empty valset is what the module answers for unknown nonces.
            .map(|v: Option<Valset>| v.filter(|v| !v.members.is_empty()))
    }

    async fn latest_valsets(&self) -> Result<Vec<Valset>> {
        let res: Option<rest::ValsetsResponse> =
            self.rest.get(&self.path("valset/last"), &[]).await?;
        let mut valsets = res
            .map(|r| r.valsets)
            .unwrap_or_default()
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<Valset>>>()?;
        valsets.sort_by(|a, b| b.nonce.cmp(&a.nonce));
        Ok(valsets)
    }

    async fn oldest_unsigned_valsets(
        &self,
        address: &str,
    ) -> Result<Vec<Valset>> {
        let res: Option<rest::ValsetsResponse> = self
            .rest
            .get(&self.path(&format!("valset/last/{address}")), &[])
            .await?;
        let mut valsets = res
            .map(|r| r.valsets)
            .unwrap_or_default()
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<Valset>>>()?;
        valsets.sort_by_key(|v| v.nonce);
        Ok(valsets)
    }

    async fn all_valset_confirms(
        &self,
        nonce: u64,
    ) -> Result<Vec<ValsetConfirm>> {
        let res: Option<rest::ValsetConfirmsResponse> = self
            .rest
            .get(&self.path(&format!("valset/confirms/{nonce}")), &[])
            .await?;
        res.map(|r| r.confirms)
            .unwrap_or_default()
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn oldest_unsigned_batch(
        &self,
        address: &str,
    ) -> Result<Option<OutgoingTxBatch>> {
        let res: Option<rest::BatchResponse> = self
            .rest
            .get(&self.path(&format!("batch/last/{address}")), &[])
            .await?;
        res.and_then(|r| r.batch).map(TryInto::try_into).transpose()
    }

    async fn latest_batches(&self) -> Result<Vec<OutgoingTxBatch>> {
        let res: Option<rest::BatchesResponse> =
            self.rest.get(&self.path("batch/outgoing"), &[]).await?;
        res.map(|r| r.batches)
            .unwrap_or_default()
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn batch_confirms(
        &self,
        nonce: u64,
        token: Address,
    ) -> Result<Vec<BatchConfirm>> {
        let query = [
            ("nonce", nonce.to_string()),
            ("contract_address", eth_hex(token)),
        ];
        let res: Option<rest::BatchConfirmsResponse> = self
            .rest
            .get(&self.path("batch/confirms"), &query)
            .await?;
        res.map(|r| r.confirms)
            .unwrap_or_default()
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn unbatched_fees(&self) -> Result<Vec<BatchFees>> {
        let res: Option<rest::BatchFeesResponse> =
            self.rest.get(&self.path("batch/fees"), &[]).await?;
        res.map(|r| r.batch_fees)
            .unwrap_or_default()
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn last_claim_event_by_addr(
        &self,
        address: &str,
    ) -> Result<LastClaimEvent> {
        let res: Option<rest::LastClaimEventResponse> = self
            .rest
            .get(&self.path(&format!("oracle/event/{address}")), &[])
            .await?;
        // nothing claimed yet.
        Ok(res
            .and_then(|r| r.last_claim_event)
            .map(|e| LastClaimEvent {
                ethereum_event_nonce: e.ethereum_event_nonce,
                ethereum_event_height: e.ethereum_event_height,
            })
            .unwrap_or_default())
    }

    async fn validator_address_from_eth(
        &self,
        eth: Address,
    ) -> Result<Option<String>> {
        let path = self.path(&format!(
            "query_delegate_keys_by_eth/{}",
            eth_hex(eth)
        ));
        let res: Option<rest::DelegateKeysResponse> =
            self.rest.get(&path, &[]).await?;
        Ok(res
            .map(|r| r.validator_address)
            .filter(|v| !v.is_empty()))
    }

    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>> {
        let path = format!("cosmos/base/tendermint/v1beta1/blocks/{height}");
        let res: rest::BlockResponse = self
            .rest
            .get(&path, &[])
            .await?
            .ok_or_else(|| Error::NotFound(format!("home block {height}")))?;
        DateTime::parse_from_rfc3339(&res.block.header.time)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::InvalidResponse {
                endpoint: path,
                reason: e.to_string(),
            })
    }

    #[tracing::instrument(skip_all, fields(nonce = event.event_nonce))]
    async fn send_deposit_claim(
        &self,
        event: &SendToCosmosEvent,
    ) -> Result<()> {
        self.broadcast(proto::MsgDepositClaim {
            event_nonce: event.event_nonce,
            block_height: event.block_height,
            token_contract: eth_hex(event.token_contract),
            amount: event.amount.to_string(),
            ethereum_sender: eth_hex(event.sender),
            cosmos_receiver: event.destination.clone(),
            orchestrator: self.orchestrator_address(),
            data: event.data.clone(),
            hyperion_id: self.hyperion_id,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(nonce = event.event_nonce))]
    async fn send_withdraw_claim(
        &self,
        event: &TransactionBatchExecutedEvent,
    ) -> Result<()> {
        self.broadcast(proto::MsgWithdrawClaim {
            event_nonce: event.event_nonce,
            block_height: event.block_height,
            batch_nonce: event.batch_nonce,
            token_contract: eth_hex(event.token_contract),
            orchestrator: self.orchestrator_address(),
            hyperion_id: self.hyperion_id,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(nonce = event.event_nonce))]
    async fn send_valset_claim(
        &self,
        event: &ValsetUpdatedEvent,
    ) -> Result<()> {
        let members = event
            .members
            .iter()
            .map(|m| proto::BridgeValidator {
                power: m.power,
                ethereum_address: eth_hex(m.ethereum_address),
            })
            .collect();
        self.broadcast(proto::MsgValsetUpdatedClaim {
            event_nonce: event.event_nonce,
            valset_nonce: event.valset_nonce,
            block_height: event.block_height,
            members,
            reward_amount: event.reward_amount.to_string(),
            reward_token: eth_hex(event.reward_token),
            orchestrator: self.orchestrator_address(),
            hyperion_id: self.hyperion_id,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(nonce = event.event_nonce))]
    async fn send_erc20_deployed_claim(
        &self,
        event: &Erc20DeployedEvent,
    ) -> Result<()> {
        self.broadcast(proto::MsgErc20DeployedClaim {
            event_nonce: event.event_nonce,
            block_height: event.block_height,
            cosmos_denom: event.cosmos_denom.clone(),
            token_contract: eth_hex(event.token_contract),
            name: event.name.clone(),
            symbol: event.symbol.clone(),
            decimals: event.decimals.into(),
            orchestrator: self.orchestrator_address(),
            hyperion_id: self.hyperion_id,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(nonce = valset.nonce))]
    async fn send_valset_confirm(
        &self,
        eth_signer: Address,
        valset: &Valset,
        signature: Signature,
    ) -> Result<()> {
        self.broadcast(proto::MsgValsetConfirm {
            nonce: valset.nonce,
            orchestrator: self.orchestrator_address(),
            eth_address: eth_hex(eth_signer),
            signature: signature_hex(&signature),
            hyperion_id: self.hyperion_id,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(nonce = batch.batch_nonce, token = %batch.token_contract))]
    async fn send_batch_confirm(
        &self,
        eth_signer: Address,
        batch: &OutgoingTxBatch,
        signature: Signature,
    ) -> Result<()> {
        self.broadcast(proto::MsgConfirmBatch {
            nonce: batch.batch_nonce,
            token_contract: eth_hex(batch.token_contract),
            eth_signer: eth_hex(eth_signer),
            orchestrator: self.orchestrator_address(),
            signature: signature_hex(&signature),
            hyperion_id: self.hyperion_id,
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn request_batch(&self, denom: &str) -> Result<()> {
        self.broadcast(proto::MsgRequestBatch {
            orchestrator: self.orchestrator_address(),
            denom: denom.to_owned(),
            hyperion_id: self.hyperion_id,
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn update_orchestrator_addresses(
        &self,
        eth: Address,
        orchestrator: &str,
    ) -> Result<()> {
        self.broadcast(proto::MsgSetOrchestratorAddresses {
            sender: self.orchestrator_address(),
            orchestrator: orchestrator.to_owned(),
            eth_address: eth_hex(eth),
            hyperion_id: self.hyperion_id,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use ethers::signers::LocalWallet;
    use serde_json::{json, Value};

    use super::*;
    use crate::tx::GasSettings;
    use crate::HomeChain;

    const VALIDATOR: &str = "0x1111111111111111111111111111111111111111";

    fn valset(nonce: u64, height: u64) -> Value {
        json!({
            "nonce": nonce.to_string(),
            "members": [{ "power": "4294967295", "ethereum_address": VALIDATOR }],
            "height": height.to_string(),
            "reward_amount": "0",
            "reward_token": "0x0000000000000000000000000000000000000000",
        })
    }

    async fn gateway() -> CosmosHomeGateway {
        let app = Router::new()
            .route(
                "/helios/hyperion/v1/params",
                get(|| async {
                    Json(json!({ "params": { "counterparty_chain_params": [
                        {
                            "hyperion_id": "21",
                            "bridge_counterparty_address": "0x2222222222222222222222222222222222222222",
                            "bridge_chain_id": "11155111",
                            "average_counterparty_block_time": "12000",
                            "token_address_to_denoms": [{
                                "token_address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                                "denom": "hyperion/0xaaa",
                            }],
                        },
                        {
                            "hyperion_id": "22",
                            "bridge_counterparty_address": "0x3333333333333333333333333333333333333333",
                            "bridge_chain_id": "1",
                        }
                    ]}}))
                }),
            )
            .route(
                "/helios/hyperion/v1/21/valset/last",
                get(|| async {
                    Json(json!({ "valsets": [valset(6, 100), valset(7, 110)] }))
                }),
            )
            .route(
                "/helios/hyperion/v1/21/valset/:nonce",
                get(|Path(nonce): Path<String>| async move {
                    if nonce == "5" {
                        (StatusCode::OK, Json(json!({ "valset": valset(5, 90) })))
                    } else {
                        (
                            StatusCode::NOT_FOUND,
                            Json(json!({ "code": 5, "message": "not found" })),
                        )
                    }
                }),
            )
            .route(
                "/helios/hyperion/v1/21/oracle/event/:address",
                get(|| async {
                    Json(json!({ "last_claim_event": {
                        "ethereum_event_nonce": "6",
                        "ethereum_event_height": "100",
                    }}))
                }),
            )
            .route(
                "/cosmos/base/tendermint/v1beta1/blocks/:height",
                get(|| async {
                    Json(json!({ "block": { "header": {
                        "time": "2024-03-01T12:00:00.123456789Z",
                    }}}))
                }),
            );
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(app.into_make_service()),
        );

        let rest = RestClient::new(
            format!("http://{addr}").parse().unwrap(),
            reqwest::Client::new(),
        );
        let rpc = HttpClient::new("http://127.0.0.1:26657").unwrap();
        let broadcaster = Broadcaster::new(
            rpc.clone(),
            rest.clone(),
            LocalWallet::from_bytes(&[7u8; 32]).unwrap(),
            "helios",
            "helios-1",
            GasSettings {
                gas_limit: 200_000,
                gas_price: 1.0,
                denom: "ahelios".into(),
            },
            Duration::from_secs(15),
        )
        .unwrap();
        CosmosHomeGateway::new(rest, rpc, broadcaster, 21)
    }

    #[tokio::test]
    async fn selects_params_of_our_counterparty() {
        let gw = gateway().await;
        let params = gw.params().await.unwrap();
        assert_eq!(params.hyperion_id, 21);
        assert_eq!(params.bridge_chain_id, 11155111);
        assert_eq!(
            params.denom_for("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".parse().unwrap()),
            Some("hyperion/0xaaa")
        );
    }

    #[tokio::test]
    async fn latest_valsets_are_newest_first() {
        let gw = gateway().await;
        let nonces: Vec<u64> = gw
            .latest_valsets()
            .await
            .unwrap()
            .iter()
            .map(|v| v.nonce)
            .collect();
        assert_eq!(nonces, vec![7, 6]);
    }

    #[tokio::test]
    async fn missing_valset_is_none() {
        let gw = gateway().await;
        assert_eq!(gw.valset_at(5).await.unwrap().unwrap().height, 90);
        assert!(gw.valset_at(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_last_claim_and_block_time() {
        let gw = gateway().await;
        let last = gw.last_claim_event_by_addr("helios1orch").await.unwrap();
        assert_eq!(last.ethereum_event_nonce, 6);
        assert_eq!(last.ethereum_event_height, 100);
        let time = gw.block_time(110).await.unwrap();
        assert_eq!(time.timestamp(), 1_709_294_400);
    }
}
