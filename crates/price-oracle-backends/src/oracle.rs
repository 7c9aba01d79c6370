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

use ethers::types::U256;
use hyperion_orchestrator_utils::retry::{retry, ConstantWithMaxRetryCount};
use hyperion_orchestrator_utils::{Error, Result};
use typed_builder::TypedBuilder;

use crate::PriceBackend;

/// Every token is assumed to have 18 decimals.
const TOKEN_DECIMALS: i32 = 18;

/// Converts an amount in the smallest unit of a token to whole tokens.
pub(crate) fn to_whole_tokens(amount: U256) -> f64 {
    let raw = amount.to_string().parse::<f64>().unwrap_or(f64::INFINITY);
    raw / 10f64.powi(TOKEN_DECIMALS)
}

/// Prices tokens in USD on top of a [`PriceBackend`].
#[derive(Clone, TypedBuilder)]
pub struct PriceOracle {
    backend: Arc<dyn PriceBackend>,
    /// Upper bound of a single backend call.
    #[builder(default = Duration::from_secs(15))]
    call_timeout: Duration,
    /// Attempts made by [`PriceOracle::fee_exceeds`] before failing closed.
    #[builder(default = 5)]
    max_attempts: usize,
    /// Delay between two attempts of [`PriceOracle::fee_exceeds`].
    #[builder(default = Duration::from_secs(5))]
    retry_interval: Duration,
}

impl std::fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracle")
            .field("call_timeout", &self.call_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl PriceOracle {
    /// The USD price of one whole `token`.
    #[tracing::instrument(skip(self))]
    pub async fn usd_price(&self, token: &str) -> Result<f64> {
        let prices = tokio::time::timeout(
            self.call_timeout,
            self.backend.usd_prices(&[token]),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout {
            endpoint: String::from("price oracle"),
        })??;
        match prices.get(token) {
            Some(price) if price.is_finite() && *price >= 0.0 => Ok(*price),
            _ => Err(Error::FetchTokenPriceError {
                token: token.to_owned(),
            }),
        }
    }

    /// The USD value of `amount` (smallest unit) of `token`.
    pub async fn usd_value(&self, token: &str, amount: U256) -> Result<f64> {
        let price = self.usd_price(token).await?;
        Ok(to_whole_tokens(amount) * price)
    }

    /// Whether `total` (smallest unit) of `token` is worth at least
    /// `min_usd`.
    ///
    /// The price is retried a few times. When no price can be found the
    /// answer is `false`.
    pub async fn fee_exceeds(
        &self,
        token: &str,
        total: U256,
        min_usd: f64,
    ) -> bool {
        let policy = ConstantWithMaxRetryCount::new(
            self.retry_interval,
            self.max_attempts.saturating_sub(1),
        );
        let price = retry(
            "price-oracle",
            policy,
            futures::future::pending(),
            || self.usd_price(token),
        )
        .await;
        match price {
            Ok(price) => {
                let total_usd = to_whole_tokens(total) * price;
                tracing::debug!(
                    %token,
                    price,
                    total_usd,
                    min_usd,
                    "checked fee against threshold",
                );
                total_usd >= min_usd
            }
            Err(e) => {
                tracing::warn!(
                    %token,
                    error = %e,
                    "no price for token, assuming fees are too low",
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{DummyPriceBackend, PricesMap};

    #[derive(Default)]
    struct FailingBackend {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriceBackend for FailingBackend {
        async fn usd_prices(&self, _ids: &[&str]) -> Result<PricesMap> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Generic("price source down"))
        }
    }

    struct StuckBackend;

    #[async_trait::async_trait]
    impl PriceBackend for StuckBackend {
        async fn usd_prices(&self, _ids: &[&str]) -> Result<PricesMap> {
            futures::future::pending().await
        }
    }

    fn oracle(prices: &[(&str, f64)]) -> PriceOracle {
        let prices = prices
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        PriceOracle::builder()
            .backend(Arc::new(DummyPriceBackend::new(prices)))
            .build()
    }

    #[test]
    fn converts_with_18_decimals() {
        let one = U256::exp10(18);
        assert_eq!(to_whole_tokens(one), 1.0);
        assert_eq!(to_whole_tokens(one * 25 / 10), 2.5);
        assert_eq!(to_whole_tokens(U256::zero()), 0.0);
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let oracle = oracle(&[("0xaaa", 2.0)]);
        let five_tokens = U256::exp10(18) * 5;
        assert!(oracle.fee_exceeds("0xaaa", five_tokens, 10.0).await);
        assert!(oracle.fee_exceeds("0xaaa", five_tokens, 9.99).await);
        assert!(!oracle.fee_exceeds("0xaaa", five_tokens, 10.01).await);
    }

    #[tokio::test]
    async fn tiny_fees_are_not_enough() {
        let oracle = oracle(&[("0xaaa", 1e-10)]);
        assert!(!oracle.fee_exceeds("0xaaa", U256::from(100), 1.0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_closed_after_five_attempts() {
        let backend = Arc::new(FailingBackend::default());
        let oracle = PriceOracle::builder().backend(backend.clone()).build();
        let started = tokio::time::Instant::now();
        assert!(
            !oracle
                .fee_exceeds("0xaaa", U256::exp10(30), 0.0)
                .await
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
        // four constant delays between the five attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn unknown_token_fails_closed() {
        let oracle = oracle(&[]);
        assert!(!oracle.fee_exceeds("0xbbb", U256::exp10(30), 0.0).await);
        assert!(logs_contain("assuming fees are too low"));
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_bounded_in_time() {
        let oracle = PriceOracle::builder()
            .backend(Arc::new(StuckBackend))
            .build();
        let err = oracle.usd_price("ethereum").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout { .. }));
    }
}
