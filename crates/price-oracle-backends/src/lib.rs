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

//! Price Oracle Backends
//!
//! A Price Oracle Backend is a service that provides USD prices for a list of
//! token ids. Token ids are either CoinGecko coin
//! ids (like `ethereum`) or `0x` prefixed ERC20 contract addresses.
//!
//! As of now, the following backends are supported:
//! - [CoinGecko](https://www.coingecko.com/en/api)
//! - a static map, see [`DummyPriceBackend`]
//!
//! The orchestrator does not use the backends directly but through
//! [`PriceOracle`], which bounds every call in time and implements the fee
//! threshold check of batches.
//!
//! ## Usage
//! ```rust,no_run
//! # async fn run() -> hyperion_orchestrator_utils::Result<()> {
//! use hyperion_price_oracle_backends::{CoinGeckoBackend, PriceOracle};
//! let backend = CoinGeckoBackend::builder()
//!     .base_url("https://api.coingecko.com/api/v3".parse()?)
//!     .build();
//! let oracle = PriceOracle::builder()
//!     .backend(std::sync::Arc::new(backend))
//!     .build();
//! let eth = oracle.usd_price("ethereum").await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ethers::types::Address;
use hyperion_orchestrator_utils::Result;

/// `CoinGecko` Backend
mod coingecko;
/// A Dummy Price Backend
mod dummy;
/// The adapter used by the loops
mod oracle;

pub use coingecko::CoinGeckoBackend;
pub use dummy::DummyPriceBackend;
pub use oracle::PriceOracle;

/// USD prices by token id.
pub type PricesMap = std::collections::HashMap<String, f64>;

/// The price id of an ERC20 token: its full, lowercase `0x` address.
pub fn token_id(contract: Address) -> String {
    // `Debug` prints all the digits, `Display` abbreviates them.
    format!("{contract:?}")
}

/// A source of USD prices.
#[async_trait::async_trait]
pub trait PriceBackend: Send + Sync {
    /// USD prices of the given token ids.
    ///
    /// Tokens without a known price are missing from the returned map.
    async fn usd_prices(&self, ids: &[&str]) -> Result<PricesMap>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ids_are_full_addresses() {
        let id = token_id(Address::repeat_byte(0xab));
        assert_eq!(id.len(), 42);
        assert_eq!(id, format!("0x{}", "ab".repeat(20)));
    }
}
