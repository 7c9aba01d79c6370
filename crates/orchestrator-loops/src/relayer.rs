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

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ethers::types::{Address, U256};
use hyperion_evm_gateway::EvmChain;
use hyperion_home_gateway::HomeChain;
use hyperion_orchestrator_types::{
    BatchConfirm, OutgoingTxBatch, Valset, ValsetConfirm,
};
use hyperion_orchestrator_utils::metric::Metrics;
use hyperion_orchestrator_utils::{probe, Error, Result};
use hyperion_price_oracle_backends::{token_id, PriceOracle};
use typed_builder::TypedBuilder;

use crate::OrchestratorLoop;

/// The valset the bridge contract trusts, with the power it requires.
struct TrustedValset {
    valset: Valset,
    threshold: u64,
}

/// Looks up the valset the contract trusts on the home chain.
///
/// `None` when the home chain does not know it, or when its checkpoint does
/// not match the one stored by the contract.
async fn trusted_valset(
    home: &dyn HomeChain,
    evm: &dyn EvmChain,
    hyperion_id: u64,
) -> Result<Option<TrustedValset>> {
    let nonce = evm.contract_valset_nonce().await?;
    let Some(valset) = home.valset_at(nonce).await? else {
        tracing::warn!(nonce, "valset of the contract unknown to home chain");
        return Ok(None);
    };
    let expected = evm.contract_last_checkpoint().await?;
    let checkpoint = valset.checkpoint(hyperion_id);
    if checkpoint != expected {
        tracing::error!(
            nonce,
            ?checkpoint,
            ?expected,
            "home and contract disagree on the current valset",
        );
        return Ok(None);
    }
    let threshold = evm.contract_power_threshold().await?;
    Ok(Some(TrustedValset { valset, threshold }))
}

/// Whether the artefact created at home `height` is older than `offset`.
async fn soaked(
    home: &dyn HomeChain,
    height: u64,
    offset: Duration,
) -> Result<bool> {
    if offset.is_zero() {
        return Ok(true);
    }
    let created = home.block_time(height).await?;
    let age = Utc::now().signed_duration_since(created);
    Ok(age.to_std().map_or(false, |age| age >= offset))
}

/// Submits the newest sufficiently signed valset to the bridge contract.
#[derive(TypedBuilder)]
pub struct ValsetRelayer {
    home: Arc<dyn HomeChain>,
    evm: Arc<dyn EvmChain>,
    metrics: Arc<Metrics>,
    hyperion_id: u64,
    /// Age a valset must reach before it is relayed.
    #[builder(default)]
    offset: Duration,
    #[builder(default = Duration::from_secs(60))]
    period: Duration,
}

impl ValsetRelayer {
    /// The newest valset following `current` that is signed by enough of it.
    async fn find_signed(
        &self,
        current: &TrustedValset,
    ) -> Result<Option<(Valset, Vec<ValsetConfirm>)>> {
        let latest = self.home.latest_valsets().await?;
        for valset in latest
            .into_iter()
            .filter(|v| v.nonce > current.valset.nonce)
        {
            let confirms = self.home.all_valset_confirms(valset.nonce).await?;
            let power = current.valset.confirmed_power(
                valset.checkpoint(self.hyperion_id),
                confirms.iter().map(|c| (c.eth_address, &c.signature)),
            );
            if power >= current.threshold {
                return Ok(Some((valset, confirms)));
            }
            tracing::debug!(
                nonce = valset.nonce,
                power,
                threshold = current.threshold,
                "valset not signed enough",
            );
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl OrchestratorLoop for ValsetRelayer {
    const TAG: &'static str = "valset_relayer";

    fn period(&self) -> Duration {
        self.period
    }

    #[tracing::instrument(skip_all, name = "valset_relayer_tick")]
    async fn tick(&self) -> Result<()> {
        let home = self.home.as_ref();
        let evm = self.evm.as_ref();
        let Some(current) = trusted_valset(home, evm, self.hyperion_id).await?
        else {
            return Ok(());
        };
        let Some((valset, confirms)) = self.find_signed(&current).await? else {
            tracing::debug!(on_evm = current.valset.nonce, "nothing to relay");
            return Ok(());
        };
        if !soaked(home, valset.height, self.offset).await? {
            tracing::info!(
                nonce = valset.nonce,
                offset = ?self.offset,
                "valset too recent, leaving it to other relayers",
            );
            return Ok(());
        }
        let sent = evm
            .send_valset_update(&current.valset, &valset, &confirms)
            .await;
        let tx_hash = match sent {
            Ok(tx_hash) => tx_hash,
            Err(e @ Error::FeeTooHigh { .. }) => {
                tracing::info!(
                    nonce = valset.nonce,
                    error = %e,
                    "gas too expensive, retrying next tick",
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.metrics
            .relays_submitted
            .with_label_values(&["valset"])
            .inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Relayer,
            valset_nonce = valset.nonce,
            ?tx_hash,
        );
        tracing::info!(
            from = current.valset.nonce,
            to = valset.nonce,
            ?tx_hash,
            "relayed valset",
        );
        Ok(())
    }
}

/// Submits signed batches to the bridge contract, one per token and tick.
#[derive(TypedBuilder)]
pub struct BatchRelayer {
    home: Arc<dyn HomeChain>,
    evm: Arc<dyn EvmChain>,
    oracle: PriceOracle,
    metrics: Arc<Metrics>,
    hyperion_id: u64,
    /// Price id of the coin paying for gas.
    #[builder(setter(into))]
    native_token_id: String,
    /// Age a batch must reach before it is relayed.
    #[builder(default)]
    offset: Duration,
    #[builder(default = Duration::from_secs(60))]
    period: Duration,
}

impl BatchRelayer {
    /// Checks that the fees of `batch` pay for the gas of its execution.
    async fn check_profitable(
        &self,
        current: &Valset,
        batch: &OutgoingTxBatch,
        confirms: &[BatchConfirm],
    ) -> Result<()> {
        let gas_price = self.evm.gas_price().await?;
        let gas = self
            .evm
            .estimate_batch_gas(current, batch, confirms)
            .await?;
        let cost: U256 = gas.saturating_mul(gas_price);
        let token = token_id(batch.token_contract);
        let cost_usd = match self
            .oracle
            .usd_value(&self.native_token_id, cost)
            .await
        {
            Ok(cost_usd) => cost_usd,
            Err(e) => {
                tracing::warn!(
                    native = %self.native_token_id,
                    error = %e,
                    "cannot price gas, assuming the batch is not profitable",
                );
                return Err(Error::Unprofitable { token });
            }
        };
        if self
            .oracle
            .fee_exceeds(&token, batch.total_fees(), cost_usd)
            .await
        {
            Ok(())
        } else {
            Err(Error::Unprofitable { token })
        }
    }

    /// Relays the oldest relayable batch of `token`, `batches` sorted by
    /// nonce. Returns the nonce of the relayed batch.
    async fn relay_token(
        &self,
        current: &TrustedValset,
        token: Address,
        batches: Vec<OutgoingTxBatch>,
    ) -> Result<Option<u64>> {
        let last_nonce = self.evm.contract_last_batch_nonce(token).await?;
        for batch in batches {
            let nonce = batch.batch_nonce;
            if nonce <= last_nonce {
                tracing::debug!(nonce, ?token, "batch already executed");
                continue;
            }
            let confirms = self.home.batch_confirms(nonce, token).await?;
            let power = current.valset.confirmed_power(
                batch.hash(self.hyperion_id),
                confirms.iter().map(|c| (c.eth_signer, &c.signature)),
            );
            if power < current.threshold {
                tracing::debug!(
                    nonce,
                    ?token,
                    power,
                    "batch not signed enough"
                );
                continue;
            }
            if !soaked(self.home.as_ref(), batch.block, self.offset).await? {
                tracing::info!(
                    nonce,
                    ?token,
                    offset = ?self.offset,
                    "batch too recent, leaving it to other relayers",
                );
                return Ok(None);
            }
            match self
                .check_profitable(&current.valset, &batch, &confirms)
                .await
            {
                Ok(()) => {}
                Err(
                    e @ (Error::FeeTooHigh { .. } | Error::Unprofitable { .. }),
                ) => {
                    tracing::info!(nonce, ?token, error = %e, "skipping batch");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
            let sent = self
                .evm
                .send_batch(&current.valset, &batch, &confirms)
                .await;
            let tx_hash = match sent {
                Ok(tx_hash) => tx_hash,
                Err(e @ Error::FeeTooHigh { .. }) => {
                    tracing::info!(nonce, ?token, error = %e, "skipping batch");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            self.metrics
                .relays_submitted
                .with_label_values(&["batch"])
                .inc();
            tracing::info!(nonce, ?token, ?tx_hash, "relayed batch");
            return Ok(Some(nonce));
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl OrchestratorLoop for BatchRelayer {
    const TAG: &'static str = "batch_relayer";

    fn period(&self) -> Duration {
        self.period
    }

    #[tracing::instrument(skip_all, name = "batch_relayer_tick")]
    async fn tick(&self) -> Result<()> {
        let height = self.evm.latest_height().await?;
        let mut by_token: BTreeMap<Address, Vec<OutgoingTxBatch>> =
            BTreeMap::new();
        for batch in self.home.latest_batches().await? {
            if batch.is_timed_out(height) {
                tracing::info!(
                    nonce = batch.batch_nonce,
                    token = ?batch.token_contract,
                    timeout = batch.batch_timeout,
                    height,
                    timed_out = true,
                    "batch timed out, not relaying",
                );
                continue;
            }
            by_token.entry(batch.token_contract).or_default().push(batch);
        }
        if by_token.is_empty() {
            return Ok(());
        }
        let Some(current) = trusted_valset(
            self.home.as_ref(),
            self.evm.as_ref(),
            self.hyperion_id,
        )
        .await?
        else {
            return Ok(());
        };
        let mut first_error = None;
        for (token, mut batches) in by_token {
            batches.sort_by_key(|b| b.batch_nonce);
            match self.relay_token(&current, token, batches).await {
                Ok(relayed) => tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Relayer,
                    ?token,
                    relayed = ?relayed,
                ),
                Err(e) => {
                    tracing::warn!(?token, error = %e, "relaying batch failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration as ChronoDuration;
    use hyperion_orchestrator_context::Shutdown;
    use hyperion_price_oracle_backends::DummyPriceBackend;
    use tokio::sync::broadcast;
    use tracing_test::traced_test;

    use super::*;
    use crate::run_loop;
    use crate::test_utils::*;

    /// Runs `job` for five minutes with few retries, then stops it.
    async fn run_for_a_while<L: OrchestratorLoop>(job: &L) -> Result<()> {
        let (tx, rx) = broadcast::channel(2);
        let stopper = async move {
            tokio::time::sleep(Duration::from_secs(300)).await;
            tx.send(()).unwrap();
        };
        let metrics = metrics();
        let shutdown = Shutdown::new(rx);
        let (result, ()) =
            tokio::join!(run_loop(job, shutdown, 2, &metrics), stopper);
        result
    }

    fn token() -> Address {
        Address::repeat_byte(0xbb)
    }

    /// Four members with 25% of the power each, 66% needed.
    fn current() -> Valset {
        valset(5, &[1, 2, 3, 4], &[25, 25, 25, 25])
    }

    async fn setup_valsets(
        home_state: impl FnOnce(&mut crate::test_utils::HomeState),
    ) -> (Arc<FakeHome>, Arc<FakeEvm>) {
        let current = current();
        let v6 = valset(6, &[1, 2, 3, 4], &[25, 25, 25, 25]);
        let v7 = valset(7, &[1, 2, 3, 5], &[25, 25, 25, 25]);
        let c6 = valset_confirms(&v6, &[1, 2, 3, 4]).await;
        // three quarters of the power, plus a signer outside the valset
        let c7 = valset_confirms(&v7, &[1, 2, 3, 5]).await;
        let checkpoint = current.checkpoint(HYPERION_ID);
        let home = FakeHome::with(|s| {
            s.valsets = vec![current, v6, v7];
            s.valset_confirms.insert(6, c6);
            s.valset_confirms.insert(7, c7);
            home_state(s);
        });
        let evm = FakeEvm::with(|s| {
            s.valset_nonce = 5;
            s.checkpoint = checkpoint;
            s.power_threshold = 66;
            s.height = 100;
        });
        (home, evm)
    }

    fn valset_relayer(
        home: Arc<FakeHome>,
        evm: Arc<FakeEvm>,
        offset: Duration,
    ) -> ValsetRelayer {
        ValsetRelayer::builder()
            .home(home)
            .evm(evm)
            .metrics(metrics())
            .hyperion_id(HYPERION_ID)
            .offset(offset)
            .build()
    }

    #[tokio::test]
    async fn relays_the_newest_signed_valset() {
        let (home, evm) = setup_valsets(|_| {}).await;
        valset_relayer(home, evm.clone(), Duration::ZERO)
            .tick()
            .await
            .unwrap();
        assert_eq!(evm.state().sent_valsets, vec![7]);
        assert_eq!(evm.state().valset_nonce, 7);
    }

    #[tokio::test]
    async fn young_valsets_soak_first() {
        let (home, evm) = setup_valsets(|s| {
            s.block_times
                .insert(107, Utc::now() - ChronoDuration::seconds(10));
        })
        .await;
        let relayer =
            valset_relayer(home.clone(), evm.clone(), Duration::from_secs(600));
        relayer.tick().await.unwrap();
        assert!(evm.state().sent_valsets.is_empty());
        home.state()
            .block_times
            .insert(107, Utc::now() - ChronoDuration::seconds(601));
        relayer.tick().await.unwrap();
        assert_eq!(evm.state().sent_valsets, vec![7]);
    }

    #[tokio::test]
    async fn never_relays_older_valsets() {
        let (home, evm) = setup_valsets(|_| {}).await;
        let relayer = valset_relayer(home, evm.clone(), Duration::ZERO);
        relayer.tick().await.unwrap();
        // the contract now trusts 7, nothing newer exists
        relayer.tick().await.unwrap();
        assert_eq!(evm.state().sent_valsets, vec![7]);
    }

    #[tokio::test]
    async fn checkpoint_mismatch_skips_the_tick() {
        let (home, evm) = setup_valsets(|_| {}).await;
        evm.state().checkpoint = Default::default();
        valset_relayer(home, evm.clone(), Duration::ZERO)
            .tick()
            .await
            .unwrap();
        assert!(evm.state().sent_valsets.is_empty());
    }

    /// Prices of ether and of the batched token.
    fn prices(token_price: f64) -> HashMap<String, f64> {
        HashMap::from([
            (String::from("ethereum"), 3000.0),
            (token_id(token()), token_price),
            (token_id(Address::repeat_byte(0xdd)), token_price),
        ])
    }

    fn batch_relayer(
        home: Arc<FakeHome>,
        evm: Arc<FakeEvm>,
        map: HashMap<String, f64>,
    ) -> BatchRelayer {
        let oracle = PriceOracle::builder()
            .backend(Arc::new(DummyPriceBackend::new(map)))
            .build();
        BatchRelayer::builder()
            .home(home)
            .evm(evm)
            .oracle(oracle)
            .metrics(metrics())
            .hyperion_id(HYPERION_ID)
            .native_token_id("ethereum")
            .build()
    }

    async fn signed_batches(
        batches: Vec<OutgoingTxBatch>,
    ) -> (Arc<FakeHome>, Arc<FakeEvm>) {
        let mut confirms = HashMap::new();
        for b in &batches {
            confirms.insert(
                (b.batch_nonce, b.token_contract),
                batch_confirms(b, &[1, 2, 3]).await,
            );
        }
        let (home, evm) = setup_valsets(move |s| {
            s.batches = batches;
            s.batch_confirms = confirms;
        })
        .await;
        (home, evm)
    }

    #[tokio::test]
    #[traced_test]
    async fn timed_out_batches_are_not_relayed() {
        let (home, evm) = signed_batches(vec![batch(2, token(), 500)]).await;
        evm.state().height = 600;
        batch_relayer(home, evm.clone(), prices(1.0))
            .tick()
            .await
            .unwrap();
        assert!(evm.state().sent_batches.is_empty());
        assert!(logs_contain("timed_out=true"));
    }

    #[tokio::test]
    async fn relays_one_batch_per_token() {
        let (home, evm) = signed_batches(vec![
            batch(4, token(), 1000),
            batch(3, token(), 1000),
            batch(1, Address::repeat_byte(0xdd), 1000),
        ])
        .await;
        evm.state().last_batch_nonces.insert(token(), 2);
        let relayer = batch_relayer(home, evm.clone(), prices(1.0));
        relayer.tick().await.unwrap();
        assert_eq!(
            evm.state().sent_batches,
            vec![(token(), 3), (Address::repeat_byte(0xdd), 1)]
        );
        relayer.tick().await.unwrap();
        assert_eq!(evm.state().sent_batches[2], (token(), 4));
    }

    #[tokio::test]
    async fn unprofitable_batches_wait() {
        let (home, evm) = signed_batches(vec![batch(3, token(), 1000)]).await;
        // 200k gas at 1 gwei is 0.0002 ETH, 0.6 USD, fees are worth 0.5 USD
        batch_relayer(home, evm.clone(), prices(0.5))
            .tick()
            .await
            .unwrap();
        assert!(evm.state().sent_batches.is_empty());
    }

    #[tokio::test]
    async fn expensive_gas_skips_batches() {
        let (home, evm) = signed_batches(vec![batch(3, token(), 1000)]).await;
        evm.state().gas_price = U256::from(600_000_000_000u64);
        batch_relayer(home, evm.clone(), prices(1000.0))
            .tick()
            .await
            .unwrap();
        assert!(evm.state().sent_batches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expensive_gas_delays_valset_updates() {
        let (home, evm) = setup_valsets(|_| {}).await;
        evm.state().gas_price = U256::from(600_000_000_000u64);
        let relayer = valset_relayer(home, evm.clone(), Duration::ZERO);
        run_for_a_while(&relayer).await.unwrap();
        assert!(evm.state().sent_valsets.is_empty());

        evm.state().gas_price = U256::from(1_000_000_000u64);
        relayer.tick().await.unwrap();
        assert_eq!(evm.state().sent_valsets, vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn gas_rising_before_submission_skips_batches() {
        let (home, evm) = signed_batches(vec![batch(3, token(), 1000)]).await;
        evm.state().submit_gas_price = Some(U256::from(600_000_000_000u64));
        let relayer = batch_relayer(home, evm.clone(), prices(1000.0));
        run_for_a_while(&relayer).await.unwrap();
        assert!(evm.state().sent_batches.is_empty());

        evm.state().submit_gas_price = None;
        relayer.tick().await.unwrap();
        assert_eq!(evm.state().sent_batches, vec![(token(), 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn unpriced_gas_skips_batches() {
        let (home, evm) = signed_batches(vec![batch(3, token(), 1000)]).await;
        let mut map = prices(1000.0);
        map.remove("ethereum");
        let relayer = batch_relayer(home, evm.clone(), map);
        run_for_a_while(&relayer).await.unwrap();
        assert!(evm.state().sent_batches.is_empty());
    }
}
