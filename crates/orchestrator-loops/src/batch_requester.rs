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

use std::sync::Arc;
use std::time::Duration;

use hyperion_home_gateway::HomeChain;
use hyperion_orchestrator_types::Params;
use hyperion_orchestrator_utils::metric::Metrics;
use hyperion_orchestrator_utils::{probe, Result};
use hyperion_price_oracle_backends::{token_id, PriceOracle};
use typed_builder::TypedBuilder;

use crate::OrchestratorLoop;

/// Asks the home chain to batch the pending transfers of a token once their
/// fees are worth at least `min_batch_fee_usd`.
#[derive(TypedBuilder)]
pub struct BatchRequester {
    home: Arc<dyn HomeChain>,
    oracle: PriceOracle,
    metrics: Arc<Metrics>,
    /// Token to denom mapping, read once at startup.
    params: Params,
    #[builder(default)]
    min_batch_fee_usd: f64,
    #[builder(default = Duration::from_secs(60))]
    period: Duration,
}

#[async_trait::async_trait]
impl OrchestratorLoop for BatchRequester {
    const TAG: &'static str = "batch_requester";

    fn period(&self) -> Duration {
        self.period
    }

    #[tracing::instrument(skip_all, name = "batch_requester_tick")]
    async fn tick(&self) -> Result<()> {
        let fees = self.home.unbatched_fees().await?;
        let mut first_error = None;
        for fee in fees.iter().filter(|f| !f.total_fees.is_zero()) {
            let Some(denom) = self.params.denom_for(fee.token) else {
                tracing::warn!(token = ?fee.token, "no denom for token");
                continue;
            };
            let token = token_id(fee.token);
            let profitable = self
                .oracle
                .fee_exceeds(&token, fee.total_fees, self.min_batch_fee_usd)
                .await;
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::BatchRequest,
                %token,
                total_fees = %fee.total_fees,
                tx_count = fee.tx_count,
                profitable,
            );
            if !profitable {
                continue;
            }
            match self.home.request_batch(denom).await {
                Ok(()) => {
                    self.metrics
                        .batch_requests
                        .with_label_values(&[denom])
                        .inc();
                    tracing::info!(%denom, %token, "requested batch");
                }
                Err(e) => {
                    tracing::warn!(%denom, error = %e, "batch request failed");
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
    use std::time::Duration;

    use ethers::types::{Address, U256};
    use hyperion_orchestrator_types::{BatchFees, TokenDenom};
    use hyperion_price_oracle_backends::{
        DummyPriceBackend, PriceBackend, PricesMap,
    };

    use super::*;
    use crate::test_utils::*;

    fn usdt() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn weth() -> Address {
        Address::repeat_byte(0xee)
    }

    fn params() -> Params {
        Params {
            hyperion_id: HYPERION_ID,
            bridge_contract_address: Address::repeat_byte(0xbb),
            bridge_chain_id: 5,
            average_ethereum_block_time: 12_000,
            token_denoms: vec![
                TokenDenom {
                    erc20: usdt(),
                    denom: "hyperion-usdt".into(),
                },
                TokenDenom {
                    erc20: weth(),
                    denom: "hyperion-weth".into(),
                },
            ],
        }
    }

    fn fees(token: Address, total: U256) -> BatchFees {
        BatchFees {
            token,
            total_fees: total,
            tx_count: 1,
        }
    }

    fn requester(
        home: Arc<FakeHome>,
        backend: Arc<dyn PriceBackend>,
    ) -> BatchRequester {
        let oracle = PriceOracle::builder()
            .backend(backend)
            .retry_interval(Duration::from_secs(5))
            .build();
        BatchRequester::builder()
            .home(home)
            .oracle(oracle)
            .metrics(metrics())
            .params(params())
            .min_batch_fee_usd(1.0)
            .build()
    }

    fn prices(entries: &[(Address, f64)]) -> Arc<dyn PriceBackend> {
        let map: HashMap<String, f64> = entries
            .iter()
            .map(|(token, price)| (token_id(*token), *price))
            .collect();
        Arc::new(DummyPriceBackend::new(map))
    }

    #[tokio::test]
    async fn tiny_fees_are_not_batched() {
        let home = FakeHome::with(|s| s.fees = vec![fees(usdt(), 100.into())]);
        requester(home.clone(), prices(&[(usdt(), 1e-10)]))
            .tick()
            .await
            .unwrap();
        assert!(home.state().requested.is_empty());
    }

    #[tokio::test]
    async fn profitable_tokens_are_batched() {
        let home = FakeHome::with(|s| {
            s.fees = vec![
                fees(usdt(), U256::exp10(18) * 5),
                fees(weth(), U256::zero()),
                fees(Address::repeat_byte(0x99), U256::exp10(20)),
            ];
        });
        requester(home.clone(), prices(&[(usdt(), 1.0), (weth(), 3000.0)]))
            .tick()
            .await
            .unwrap();
        assert_eq!(home.state().requested, vec!["hyperion-usdt"]);
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl PriceBackend for Unreachable {
        async fn usd_prices(&self, _ids: &[&str]) -> Result<PricesMap> {
            Err(hyperion_orchestrator_utils::Error::Generic("offline"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unpriced_tokens_are_not_batched() {
        let home = FakeHome::with(|s| {
            s.fees = vec![fees(usdt(), U256::exp10(24))];
        });
        requester(home.clone(), Arc::new(Unreachable))
            .tick()
            .await
            .unwrap();
        assert!(home.state().requested.is_empty());
    }

    #[tokio::test]
    async fn one_failing_request_does_not_stop_the_others() {
        let home = FakeHome::with(|s| {
            s.fees = vec![
                fees(usdt(), U256::exp10(19)),
                fees(weth(), U256::exp10(19)),
            ];
            s.fail_requests_for = vec!["hyperion-usdt".into()];
        });
        let prices = prices(&[(usdt(), 1.0), (weth(), 1.0)]);
        let result = requester(home.clone(), prices).tick().await;
        assert!(result.is_err());
        assert_eq!(home.state().requested, vec!["hyperion-weth"]);
    }
}
