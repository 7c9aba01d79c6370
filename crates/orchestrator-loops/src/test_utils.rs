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

//! In-memory chains for the loop tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256, U256};
use hyperion_evm_gateway::EvmChain;
use hyperion_home_gateway::HomeChain;
use hyperion_orchestrator_types::{
    BatchConfirm, BatchFees, BridgeEvent, BridgeValidator, Erc20Token,
    LastClaimEvent, OutgoingTransferTx, OutgoingTxBatch, Params,
    PersonalSigner, SendToCosmosEvent, Valset, ValsetConfirm,
};
use hyperion_orchestrator_utils::metric::Metrics;
use hyperion_orchestrator_utils::{Error, Result};

pub const HYPERION_ID: u64 = 0xdead;
pub const VALIDATOR: &str = "helios1validator";

pub fn wallet(seed: u8) -> LocalWallet {
    LocalWallet::from_bytes(&[seed; 32]).unwrap()
}

pub fn eth_address(seed: u8) -> Address {
    Signer::address(&wallet(seed))
}

pub fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new().unwrap())
}

/// A valset whose members are the wallets of `seeds`, with `powers`.
pub fn valset(nonce: u64, seeds: &[u8], powers: &[u64]) -> Valset {
    Valset {
        nonce,
        members: seeds
            .iter()
            .zip(powers)
            .map(|(seed, power)| BridgeValidator {
                power: *power,
                ethereum_address: eth_address(*seed),
            })
            .collect(),
        height: 100 + nonce,
        reward_amount: U256::zero(),
        reward_token: Address::zero(),
    }
}

pub async fn valset_confirms(v: &Valset, seeds: &[u8]) -> Vec<ValsetConfirm> {
    let digest = v.checkpoint(HYPERION_ID);
    let mut confirms = Vec::new();
    for seed in seeds {
        let w = wallet(*seed);
        confirms.push(ValsetConfirm {
            nonce: v.nonce,
            orchestrator: format!("helios1orch{seed}"),
            eth_address: Signer::address(&w),
            signature: PersonalSigner::sign_digest(&w, digest).await.unwrap(),
        });
    }
    confirms
}

pub fn batch(nonce: u64, token: Address, timeout: u64) -> OutgoingTxBatch {
    OutgoingTxBatch {
        batch_nonce: nonce,
        batch_timeout: timeout,
        transactions: vec![OutgoingTransferTx {
            id: nonce,
            sender: String::from("helios1sender"),
            dest_address: Address::repeat_byte(0xcc),
            erc20_token: Erc20Token {
                contract: token,
                amount: U256::from(10),
            },
            erc20_fee: Erc20Token {
                contract: token,
                amount: U256::exp10(18),
            },
        }],
        token_contract: token,
        block: 50 + nonce,
    }
}

pub async fn batch_confirms(
    b: &OutgoingTxBatch,
    seeds: &[u8],
) -> Vec<BatchConfirm> {
    let digest = b.hash(HYPERION_ID);
    let mut confirms = Vec::new();
    for seed in seeds {
        let w = wallet(*seed);
        confirms.push(BatchConfirm {
            nonce: b.batch_nonce,
            token_contract: b.token_contract,
            eth_signer: Signer::address(&w),
            orchestrator: format!("helios1orch{seed}"),
            signature: PersonalSigner::sign_digest(&w, digest).await.unwrap(),
        });
    }
    confirms
}

pub fn deposit(nonce: u64, height: u64) -> BridgeEvent {
    BridgeEvent::Deposit(SendToCosmosEvent {
        event_nonce: nonce,
        block_height: height,
        token_contract: Address::repeat_byte(0xaa),
        sender: Address::repeat_byte(0x01),
        destination: String::from("helios1recipient"),
        amount: U256::from(1000),
        data: String::new(),
    })
}

#[derive(Default)]
pub struct HomeState {
    pub last_claim: LastClaimEvent,
    pub claims: Vec<BridgeEvent>,
    pub fail_claims: bool,
    /// Every valset, any order.
    pub valsets: Vec<Valset>,
    pub valset_confirms: HashMap<u64, Vec<ValsetConfirm>>,
    pub unsigned_valsets: Vec<Valset>,
    pub fail_valset_confirms: bool,
    pub sent_valset_confirms: Vec<(Address, u64, Signature)>,
    pub unsigned_batch: Option<OutgoingTxBatch>,
    pub sent_batch_confirms: Vec<(Address, u64, Signature)>,
    pub batches: Vec<OutgoingTxBatch>,
    pub batch_confirms: HashMap<(u64, Address), Vec<BatchConfirm>>,
    pub fees: Vec<BatchFees>,
    pub fail_requests_for: Vec<String>,
    pub requested: Vec<String>,
    /// Block times by height, `now - 1 day` when absent.
    pub block_times: HashMap<u64, DateTime<Utc>>,
}

#[derive(Default)]
pub struct FakeHome {
    pub state: Mutex<HomeState>,
}

impl FakeHome {
    pub fn with(f: impl FnOnce(&mut HomeState)) -> Arc<Self> {
        let home = Self::default();
        f(&mut home.state.lock().unwrap());
        Arc::new(home)
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, HomeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl HomeChain for FakeHome {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn params(&self) -> Result<Params> {
        Ok(Params {
            hyperion_id: HYPERION_ID,
            bridge_contract_address: Address::repeat_byte(0xbb),
            bridge_chain_id: 5,
            average_ethereum_block_time: 12_000,
            token_denoms: Vec::new(),
        })
    }

    async fn current_valset(&self) -> Result<Option<Valset>> {
        Ok(self.state().valsets.iter().max_by_key(|v| v.nonce).cloned())
    }

    async fn valset_at(&self, nonce: u64) -> Result<Option<Valset>> {
        Ok(self
            .state()
            .valsets
            .iter()
            .find(|v| v.nonce == nonce)
            .cloned())
    }

    async fn latest_valsets(&self) -> Result<Vec<Valset>> {
        let mut valsets = self.state().valsets.clone();
        valsets.sort_by(|a, b| b.nonce.cmp(&a.nonce));
        Ok(valsets)
    }

    async fn oldest_unsigned_valsets(
        &self,
        _address: &str,
    ) -> Result<Vec<Valset>> {
        Ok(self.state().unsigned_valsets.clone())
    }

    async fn all_valset_confirms(
        &self,
        nonce: u64,
    ) -> Result<Vec<ValsetConfirm>> {
        Ok(self
            .state()
            .valset_confirms
            .get(&nonce)
            .cloned()
            .unwrap_or_default())
    }

    async fn oldest_unsigned_batch(
        &self,
        _address: &str,
    ) -> Result<Option<OutgoingTxBatch>> {
        Ok(self.state().unsigned_batch.clone())
    }

    async fn latest_batches(&self) -> Result<Vec<OutgoingTxBatch>> {
        Ok(self.state().batches.clone())
    }

    async fn batch_confirms(
        &self,
        nonce: u64,
        token: Address,
    ) -> Result<Vec<BatchConfirm>> {
        Ok(self
            .state()
            .batch_confirms
            .get(&(nonce, token))
            .cloned()
            .unwrap_or_default())
    }

    async fn unbatched_fees(&self) -> Result<Vec<BatchFees>> {
        Ok(self.state().fees.clone())
    }

    async fn last_claim_event_by_addr(
        &self,
        _address: &str,
    ) -> Result<LastClaimEvent> {
        Ok(self.state().last_claim)
    }

    async fn validator_address_from_eth(
        &self,
        _eth: Address,
    ) -> Result<Option<String>> {
        Ok(Some(VALIDATOR.into()))
    }

    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>> {
        Ok(self
            .state()
            .block_times
            .get(&height)
            .copied()
            .unwrap_or_else(|| Utc::now() - chrono::Duration::days(1)))
    }

    async fn send_deposit_claim(
        &self,
        event: &SendToCosmosEvent,
    ) -> Result<()> {
        self.record_claim(BridgeEvent::Deposit(event.clone()))
    }

    async fn send_withdraw_claim(
        &self,
        event: &hyperion_orchestrator_types::TransactionBatchExecutedEvent,
    ) -> Result<()> {
        self.record_claim(BridgeEvent::Withdraw(event.clone()))
    }

    async fn send_valset_claim(
        &self,
        event: &hyperion_orchestrator_types::ValsetUpdatedEvent,
    ) -> Result<()> {
        self.record_claim(BridgeEvent::ValsetUpdated(event.clone()))
    }

    async fn send_erc20_deployed_claim(
        &self,
        event: &hyperion_orchestrator_types::Erc20DeployedEvent,
    ) -> Result<()> {
        self.record_claim(BridgeEvent::Erc20Deployed(event.clone()))
    }

    async fn send_valset_confirm(
        &self,
        eth_signer: Address,
        valset: &Valset,
        signature: Signature,
    ) -> Result<()> {
        let mut state = self.state();
        if state.fail_valset_confirms {
            return Err(Error::Generic("valset confirm rejected"));
        }
        state.unsigned_valsets.retain(|v| v.nonce != valset.nonce);
        state
            .sent_valset_confirms
            .push((eth_signer, valset.nonce, signature));
        Ok(())
    }

    async fn send_batch_confirm(
        &self,
        eth_signer: Address,
        batch: &OutgoingTxBatch,
        signature: Signature,
    ) -> Result<()> {
        let mut state = self.state();
        state.unsigned_batch = None;
        state
            .sent_batch_confirms
            .push((eth_signer, batch.batch_nonce, signature));
        Ok(())
    }

    async fn request_batch(&self, denom: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_requests_for.iter().any(|d| d == denom) {
            return Err(Error::Generic("request rejected"));
        }
        state.requested.push(denom.to_owned());
        Ok(())
    }

    async fn update_orchestrator_addresses(
        &self,
        _eth: Address,
        _orchestrator: &str,
    ) -> Result<()> {
        Ok(())
    }
}

impl FakeHome {
    fn record_claim(&self, event: BridgeEvent) -> Result<()> {
        let mut state = self.state();
        if state.fail_claims {
            return Err(Error::Generic("claim rejected"));
        }
        state.last_claim = LastClaimEvent {
            ethereum_event_nonce: event.event_nonce(),
            ethereum_event_height: event.block_height(),
        };
        state.claims.push(event);
        Ok(())
    }
}

pub struct EvmState {
    pub height: u64,
    pub events: Vec<BridgeEvent>,
    pub scanned: Vec<(u64, u64)>,
    pub valset_nonce: u64,
    pub checkpoint: H256,
    pub last_batch_nonces: HashMap<Address, u64>,
    pub power_threshold: u64,
    pub gas_price: U256,
    pub max_gas_price: U256,
    /// Gas price seen when submitting, `gas_price` when unset.
    pub submit_gas_price: Option<U256>,
    pub batch_gas: U256,
    pub sent_valsets: Vec<u64>,
    pub sent_batches: Vec<(Address, u64)>,
}

impl Default for EvmState {
    fn default() -> Self {
        Self {
            height: 0,
            events: Vec::new(),
            scanned: Vec::new(),
            valset_nonce: 0,
            checkpoint: H256::zero(),
            last_batch_nonces: HashMap::new(),
            power_threshold: 0,
            gas_price: U256::from(1_000_000_000u64),
            max_gas_price: U256::from(500_000_000_000u64),
            submit_gas_price: None,
            batch_gas: U256::from(200_000u64),
            sent_valsets: Vec::new(),
            sent_batches: Vec::new(),
        }
    }
}

impl EvmState {
    /// Rejects `gas_price` above the cap like the real gateway.
    fn capped(&self, gas_price: U256) -> Result<U256> {
        if gas_price > self.max_gas_price {
            return Err(Error::FeeTooHigh {
                gas_price,
                max_gas_price: self.max_gas_price,
            });
        }
        Ok(gas_price)
    }
}

#[derive(Default)]
pub struct FakeEvm {
    pub state: Mutex<EvmState>,
}

impl FakeEvm {
    pub fn with(f: impl FnOnce(&mut EvmState)) -> Arc<Self> {
        let evm = Self::default();
        f(&mut evm.state.lock().unwrap());
        Arc::new(evm)
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, EvmState> {
        self.state.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl EvmChain for FakeEvm {
    async fn chain_id(&self) -> Result<u64> {
        Ok(5)
    }

    async fn latest_height(&self) -> Result<u64> {
        Ok(self.state().height)
    }

    async fn filter_events(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<BridgeEvent>> {
        let mut state = self.state();
        state.scanned.push((from, to));
        Ok(state
            .events
            .iter()
            .filter(|e| (from..=to).contains(&e.block_height()))
            .cloned()
            .collect())
    }

    async fn contract_valset_nonce(&self) -> Result<u64> {
        Ok(self.state().valset_nonce)
    }

    async fn contract_last_checkpoint(&self) -> Result<H256> {
        Ok(self.state().checkpoint)
    }

    async fn contract_last_batch_nonce(&self, token: Address) -> Result<u64> {
        Ok(self
            .state()
            .last_batch_nonces
            .get(&token)
            .copied()
            .unwrap_or_default())
    }

    async fn contract_power_threshold(&self) -> Result<u64> {
        Ok(self.state().power_threshold)
    }

    async fn gas_price(&self) -> Result<U256> {
        let state = self.state();
        state.capped(state.gas_price)
    }

    async fn estimate_batch_gas(
        &self,
        _current: &Valset,
        _batch: &OutgoingTxBatch,
        _confirms: &[BatchConfirm],
    ) -> Result<U256> {
        Ok(self.state().batch_gas)
    }

    async fn send_valset_update(
        &self,
        current: &Valset,
        new: &Valset,
        _confirms: &[ValsetConfirm],
    ) -> Result<H256> {
        let mut state = self.state();
        state.capped(state.submit_gas_price.unwrap_or(state.gas_price))?;
        assert_eq!(current.nonce, state.valset_nonce, "stale current valset");
        state.valset_nonce = new.nonce;
        state.checkpoint = new.checkpoint(HYPERION_ID);
        state.sent_valsets.push(new.nonce);
        Ok(H256::repeat_byte(0x11))
    }

    async fn send_batch(
        &self,
        _current: &Valset,
        batch: &OutgoingTxBatch,
        _confirms: &[BatchConfirm],
    ) -> Result<H256> {
        let mut state = self.state();
        state.capped(state.submit_gas_price.unwrap_or(state.gas_price))?;
        assert!(
            batch.batch_timeout > state.height,
            "submitted a timed out batch"
        );
        state
            .last_batch_nonces
            .insert(batch.token_contract, batch.batch_nonce);
        state
            .sent_batches
            .push((batch.token_contract, batch.batch_nonce));
        Ok(H256::repeat_byte(0x22))
    }
}
