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

use hyperion_orchestrator_utils::Result;

/// A price backend answering from a static map.
///
/// Used for assets that are not listed on any exchange, and in tests.
#[derive(Debug, Clone, Default)]
pub struct DummyPriceBackend {
    prices: super::PricesMap,
}

impl DummyPriceBackend {
    /// Creates a new `DummyPriceBackend` with the given prices
    #[must_use]
    pub fn new(prices: super::PricesMap) -> Self {
        Self { prices }
    }
}

#[async_trait::async_trait]
impl super::PriceBackend for DummyPriceBackend {
    async fn usd_prices(&self, ids: &[&str]) -> Result<super::PricesMap> {
        let result = ids
            .iter()
            .copied()
            .filter_map(|token| {
                self.prices
                    .get(token)
                    .or_else(|| self.prices.get(&token.to_lowercase()))
                    .copied()
                    .map(|price| (token.to_owned(), price))
            })
            .collect();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use crate::PriceBackend;

    use super::*;

    #[tokio::test]
    async fn known_and_unknown_tokens() {
        let backend = DummyPriceBackend::new(
            vec![
                ("ethereum".to_string(), 2000.0),
                (format!("0x{}", "aa".repeat(20)), 1.0),
            ]
            .into_iter()
            .collect(),
        );
        let upper = format!("0x{}", "AA".repeat(20));
        let prices = backend
            .usd_prices(&["ethereum", &upper, "unknown"])
            .await
            .unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["ethereum"], 2000.0);
        assert_eq!(prices[&upper], 1.0);
    }
}
