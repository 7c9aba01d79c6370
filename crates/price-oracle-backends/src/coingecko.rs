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

use std::collections::HashMap;

use hyperion_orchestrator_utils::{Error, Result};
use typed_builder::TypedBuilder;

const VS_CURRENCY: &str = "usd";

/// A backend that fetches prices from the CoinGecko HTTP API.
///
/// Coin ids (`ethereum`) are looked up with `/simple/price`, ERC20
/// contract addresses (`0x..`) with `/simple/token_price/{platform}`.
#[derive(Clone, TypedBuilder)]
pub struct CoinGeckoBackend {
    /// Base url of the API, like `https://api.coingecko.com/api/v3`.
    base_url: url::Url,
    /// Asset platform of the contract addresses.
    #[builder(default = String::from("ethereum"), setter(into))]
    platform: String,
    /// Optional API key, sent as `x-cg-pro-api-key`.
    #[builder(default, setter(strip_option, into))]
    api_key: Option<String>,
    #[builder(default)]
    client: reqwest::Client,
}

impl std::fmt::Debug for CoinGeckoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoBackend")
            .field("base_url", &self.base_url.as_str())
            .field("platform", &self.platform)
            .finish()
    }
}

/// `{ "<id>": { "<currency>": price } }`
type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

impl CoinGeckoBackend {
    fn endpoint(&self, path: &str) -> Result<url::Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(base.join(path)?)
    }

    async fn query(
        &self,
        path: &str,
        ids: (&str, String),
    ) -> Result<super::PricesMap> {
        let url = self.endpoint(path)?;
        let query = [ids, ("vs_currencies", VS_CURRENCY.to_owned())];
        tracing::trace!(%url, ?query, "querying coingecko");
        let mut req = self.client.get(url.clone()).query(&query);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-pro-api-key", key);
        }
        let res = req.send().await?.error_for_status()?;
        let body: SimplePriceResponse = res.json().await.map_err(|e| {
            Error::InvalidResponse {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(body
            .into_iter()
            .filter_map(|(id, prices)| {
                prices
                    .get(VS_CURRENCY)
                    .copied()
                    .flatten()
                    .map(|p| (id.to_lowercase(), p))
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl super::PriceBackend for CoinGeckoBackend {
    async fn usd_prices(&self, ids: &[&str]) -> Result<super::PricesMap> {
        let (contracts, coins): (Vec<&str>, Vec<&str>) =
            ids.iter().copied().partition(|t| t.starts_with("0x"));

        let mut found = super::PricesMap::new();
        if !coins.is_empty() {
            let prices = self
                .query("simple/price", ("ids", coins.join(",")))
                .await?;
            found.extend(prices);
        }
        if !contracts.is_empty() {
            let path = format!("simple/token_price/{}", self.platform);
            let prices = self
                .query(&path, ("contract_addresses", contracts.join(",")))
                .await?;
            found.extend(prices);
        }
        // answer with the ids exactly as they were asked for.
        Ok(ids
            .iter()
            .filter_map(|t| {
                found.get(&t.to_lowercase()).map(|p| (t.to_string(), *p))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::{Path, Query};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::PriceBackend;

    async fn serve() -> url::Url {
        async fn simple_price(
            Query(q): Query<HashMap<String, String>>,
        ) -> Json<Value> {
            assert_eq!(q["vs_currencies"], "usd");
            let mut body = serde_json::Map::new();
            for id in q["ids"].split(',') {
                if id == "ethereum" {
                    body.insert(id.into(), json!({ "usd": 2500.5 }));
                }
            }
            Json(Value::Object(body))
        }
        async fn token_price(
            Path(platform): Path<String>,
            Query(q): Query<HashMap<String, String>>,
        ) -> Json<Value> {
            assert_eq!(platform, "ethereum");
            let mut body = serde_json::Map::new();
            for id in q["contract_addresses"].split(',') {
                body.insert(id.to_lowercase(), json!({ "usd": 0.99 }));
            }
            Json(Value::Object(body))
        }

        let app = Router::new()
            .route("/api/v3/simple/price", get(simple_price))
            .route("/api/v3/simple/token_price/:platform", get(token_price));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service());
        tokio::spawn(server);
        format!("http://{addr}/api/v3").parse().unwrap()
    }

    #[tokio::test]
    async fn fetches_coin_and_token_prices() {
        let backend =
            CoinGeckoBackend::builder().base_url(serve().await).build();
        let token = format!("0x{}", "Ab".repeat(20));
        let prices = backend
            .usd_prices(&["ethereum", &token, "unlisted"])
            .await
            .unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["ethereum"], 2500.5);
        assert_eq!(prices[&token], 0.99);
    }
}
