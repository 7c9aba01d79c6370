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

use crate::GasPrice;
use hyperion_orchestrator_types::rpc_url::RpcUrl;

/// The default gas price on the home chain.
pub fn home_gas_price() -> GasPrice {
    GasPrice {
        amount: 500_000_000.0,
        denom: String::from("ahelios"),
    }
}
/// The gas limit of home chain transactions is set to `400_000` by default.
pub const fn home_gas_limit() -> u64 {
    400_000
}
/// Accounts of the home chain use the `helios` prefix.
pub fn account_prefix() -> String {
    String::from("helios")
}
/// The keyring application name.
pub fn keyring_app() -> String {
    String::from("helios")
}
/// Broadcasts are awaited for `15` seconds by default.
pub const fn broadcast_timeout() -> u64 {
    15
}
/// The maximum gas price is set to `500` gwei by default.
pub const fn max_gas_price() -> u64 {
    500_000_000_000
}
/// The node's gas price is bumped by 30% by default.
pub const fn gas_price_adjustment() -> f64 {
    1.3
}
/// Submitted transactions are awaited for `300` seconds by default.
pub const fn pending_tx_wait_duration() -> u64 {
    300
}
/// Events are final after `12` blocks by default.
pub const fn confirmations() -> u64 {
    12
}
/// The maximum blocks per step is set to `2000` by default.
pub const fn max_blocks_per_step() -> u64 {
    2000
}
/// The native token is priced as ether by default.
pub fn native_token_id() -> String {
    String::from("ethereum")
}
/// Tokens are looked up on the ethereum platform by default.
pub fn coingecko_platform() -> String {
    String::from("ethereum")
}
/// The public CoinGecko API.
pub fn coingecko_api() -> RpcUrl {
    url::Url::parse("https://api.coingecko.com/api/v3")
        .map(RpcUrl::from)
        .expect("valid default url")
}
/// Loops tick every `60` seconds by default.
pub const fn loop_period() -> u64 {
    60
}
/// A failing tick is attempted `10` times by default.
pub const fn max_retries() -> usize {
    hyperion_orchestrator_utils::retry::DEFAULT_MAX_ATTEMPTS
}
/// Loops get `10` seconds to stop on shutdown by default.
pub const fn shutdown_grace_period() -> u64 {
    10
}
