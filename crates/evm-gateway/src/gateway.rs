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

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ethers::contract::{ContractCall, ContractError};
use ethers::providers::Middleware;
use ethers::types::{Address, Filter, Log, ValueOrArray, H256, U256, U64};
use hyperion_orchestrator_types::{
    BatchConfirm, BridgeEvent, OutgoingTxBatch, Valset, ValsetConfirm,
};
use hyperion_orchestrator_utils::{probe, Error, Result};

use crate::contract::{
    decode_event, event_signatures, Hyperion, SignatureArrays, ValsetArgs,
};
use crate::EvmChain;

/// Limits applied to every transaction sent to the bridge contract.
#[derive(Debug, Clone, Copy)]
pub struct GasPolicy {
    /// Highest gas price (in wei) the orchestrator agrees to pay.
    pub max_gas_price: U256,
    /// Multiplier applied to the price suggested by the node.
    pub adjustment: f64,
    /// How long to wait for the receipt of a sent transaction.
    pub pending_tx_wait: Duration,
}

impl GasPolicy {
    /// `price` scaled by the adjustment, with a precision of 1/1000.
    pub fn adjust(&self, price: U256) -> U256 {
        let permille = (self.adjustment * 1000.0).round().max(0.0) as u64;
        price * U256::from(permille) / U256::from(1000u64)
    }
}

/// [`EvmChain`] backed by an ethers middleware stack.
pub struct EthersEvmGateway<M: Middleware> {
    contract: Hyperion<M>,
    client: Arc<M>,
    gas: GasPolicy,
    max_blocks_per_step: u64,
}

impl<M: Middleware + 'static> EthersEvmGateway<M> {
    pub fn new(
        client: Arc<M>,
        bridge: Address,
        gas: GasPolicy,
        max_blocks_per_step: u64,
    ) -> Self {
        Self {
            contract: Hyperion::new(bridge, client.clone()),
            client,
            gas,
            max_blocks_per_step: max_blocks_per_step.max(1),
        }
    }

    /// Address of the bridge contract.
    pub fn bridge_address(&self) -> Address {
        self.contract.address()
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(self.bridge_address())
            .topic0(ValueOrArray::Array(
                event_signatures().into_iter().map(Some).collect(),
            ))
            .from_block(from)
            .to_block(to);
        self.client.get_logs(&filter).await.map_err(middleware_error::<M>)
    }

    fn batch_call(
        &self,
        current: &Valset,
        batch: &OutgoingTxBatch,
        confirms: &[BatchConfirm],
    ) -> ContractCall<M, ()> {
        let sigs = SignatureArrays::new(
            current,
            confirms.iter().map(|c| (c.eth_signer, &c.signature)),
        );
        let txs = &batch.transactions;
        self.contract.submit_batch(
            ValsetArgs::from(current),
            sigs.v,
            sigs.r,
            sigs.s,
            txs.iter().map(|tx| tx.erc20_token.amount).collect(),
            txs.iter().map(|tx| tx.dest_address).collect(),
            txs.iter().map(|tx| tx.erc20_fee.amount).collect(),
            batch.batch_nonce.into(),
            batch.token_contract,
            batch.batch_timeout.into(),
        )
    }

    /// Sends `call` and waits for its receipt.
    async fn submit(&self, call: ContractCall<M, ()>) -> Result<H256> {
        let gas_price = self.gas_price().await?;
        let call = call.gas_price(gas_price);
        let pending = call.send().await.map_err(contract_error::<M>)?;
        let tx_hash = *pending;
        tracing::info!(?tx_hash, %gas_price, "sent bridge transaction");
        let receipt =
            tokio::time::timeout(self.gas.pending_tx_wait, pending)
                .await
                .map_err(|_| Error::BroadcastTimeout {
                    tx_hash: format!("{tx_hash:?}"),
                })??;
        match receipt {
            Some(receipt) if receipt.status == Some(U64::zero()) => {
                Err(Error::TxReverted {
                    tx_hash: format!("{tx_hash:?}"),
                })
            }
            Some(receipt) => {
                tracing::info!(
                    ?tx_hash,
                    block = ?receipt.block_number,
                    gas_used = ?receipt.gas_used,
                    "bridge transaction mined",
                );
                Ok(tx_hash)
            }
            None => Err(Error::ContractCall(format!(
                "transaction {tx_hash:?} dropped from the mempool"
            ))),
        }
    }
}

fn middleware_error<M: Middleware>(e: M::Error) -> Error {
    Error::ContractCall(e.to_string())
}

fn contract_error<M: Middleware>(e: ContractError<M>) -> Error {
    Error::ContractCall(e.to_string())
}

fn to_u64(value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::Generic("contract value overflows u64"));
    }
    Ok(value.as_u64())
}

/// Runs `query` over `from..=to`, splitting every failing range in two
/// until it succeeds or a single block still fails.
///
/// Results are returned in block order.
pub(crate) async fn bisect<T, F, Fut>(
    from: u64,
    to: u64,
    mut query: F,
) -> Result<Vec<T>>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut pending = vec![(from, to)];
    let mut out = Vec::new();
    while let Some((start, end)) = pending.pop() {
        match query(start, end).await {
            Ok(items) => out.extend(items),
            Err(e) if start < end => {
                let mid = start + (end - start) / 2;
                tracing::warn!(start, end, error = %e, "splitting range");
                pending.push((mid + 1, end));
                pending.push((start, mid));
            }
            Err(e) => {
                tracing::error!(block = start, error = %e, "block unreadable");
                return Err(e);
            }
        }
    }
    Ok(out)
}

#[async_trait::async_trait]
impl<M: Middleware + 'static> EvmChain for EthersEvmGateway<M> {
    async fn chain_id(&self) -> Result<u64> {
        let id = self
            .client
            .get_chainid()
            .await
            .map_err(middleware_error::<M>)?;
        to_u64(id)
    }

    async fn latest_height(&self) -> Result<u64> {
        let height = self
            .client
            .get_block_number()
            .await
            .map_err(middleware_error::<M>)?;
        Ok(height.as_u64())
    }

    #[tracing::instrument(skip(self))]
    async fn filter_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<BridgeEvent>> {
        let mut events = Vec::new();
        let mut start = from;
        while start <= to {
            let end = to.min(start + self.max_blocks_per_step - 1);
            let logs = bisect(start, end, |a, b| self.logs(a, b)).await?;
            for log in &logs {
                if let Some(event) = decode_event(log)? {
                    events.push(event);
                }
            }
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Sync,
                from = start,
                to = end,
                logs = logs.len(),
            );
            start = end + 1;
        }
        Ok(events)
    }

    async fn contract_valset_nonce(&self) -> Result<u64> {
        let nonce = self
            .contract
            .state_last_valset_nonce()
            .call()
            .await
            .map_err(contract_error::<M>)?;
        to_u64(nonce)
    }

    async fn contract_last_checkpoint(&self) -> Result<H256> {
        let checkpoint = self
            .contract
            .state_last_valset_checkpoint()
            .call()
            .await
            .map_err(contract_error::<M>)?;
        Ok(H256(checkpoint))
    }

    async fn contract_last_batch_nonce(&self, token: Address) -> Result<u64> {
        let nonce = self
            .contract
            .last_batch_nonce(token)
            .call()
            .await
            .map_err(contract_error::<M>)?;
        to_u64(nonce)
    }

    async fn contract_power_threshold(&self) -> Result<u64> {
        let threshold = self
            .contract
            .state_power_threshold()
            .call()
            .await
            .map_err(contract_error::<M>)?;
        to_u64(threshold)
    }

    async fn gas_price(&self) -> Result<U256> {
        let suggested = self
            .client
            .get_gas_price()
            .await
            .map_err(middleware_error::<M>)?;
        let gas_price = self.gas.adjust(suggested);
        if gas_price > self.gas.max_gas_price {
            return Err(Error::FeeTooHigh {
                gas_price,
                max_gas_price: self.gas.max_gas_price,
            });
        }
        Ok(gas_price)
    }

    async fn estimate_batch_gas(
        &self,
        current: &Valset,
        batch: &OutgoingTxBatch,
        confirms: &[BatchConfirm],
    ) -> Result<U256> {
        self.batch_call(current, batch, confirms)
            .estimate_gas()
            .await
            .map_err(contract_error::<M>)
    }

    #[tracing::instrument(skip_all, fields(from = current.nonce, to = new.nonce))]
    async fn send_valset_update(
        &self,
        current: &Valset,
        new: &Valset,
        confirms: &[ValsetConfirm],
    ) -> Result<H256> {
        let sigs = SignatureArrays::new(
            current,
            confirms.iter().map(|c| (c.eth_address, &c.signature)),
        );
        let call = self.contract.update_valset(
            ValsetArgs::from(new),
            ValsetArgs::from(current),
            sigs.v,
            sigs.r,
            sigs.s,
        );
        self.submit(call).await
    }

    #[tracing::instrument(
        skip_all,
        fields(nonce = batch.batch_nonce, token = ?batch.token_contract),
    )]
    async fn send_batch(
        &self,
        current: &Valset,
        batch: &OutgoingTxBatch,
        confirms: &[BatchConfirm],
    ) -> Result<H256> {
        let call = self.batch_call(current, batch, confirms);
        self.submit(call).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn bisect_splits_failing_ranges_down_to_readable_ones() {
        let calls = Mutex::new(Vec::new());
        let out = bisect(0, 7, |a, b| {
            calls.lock().unwrap().push((a, b));
            async move {
                if b - a >= 2 {
                    Err(Error::Generic("range too large"))
                } else {
                    Ok((a..=b).collect::<Vec<_>>())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, (0..=7).collect::<Vec<_>>());
        assert_eq!(
            calls.into_inner().unwrap(),
            vec![(0, 7), (0, 3), (0, 1), (2, 3), (4, 7), (4, 5), (6, 7)]
        );
    }

    #[tokio::test]
    async fn bisect_gives_up_on_a_single_block() {
        let result = bisect::<u64, _, _>(10, 13, |a, b| async move {
            if (a..=b).contains(&12) {
                Err(Error::Generic("bad block"))
            } else {
                Ok(vec![a])
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Generic("bad block"))));
    }

    #[test]
    fn adjusts_gas_price() {
        let policy = GasPolicy {
            max_gas_price: U256::from(500_000_000_000u64),
            adjustment: 1.3,
            pending_tx_wait: Duration::from_secs(300),
        };
        assert_eq!(
            policy.adjust(U256::from(10_000_000_000u64)),
            U256::from(13_000_000_000u64)
        );
    }
}
