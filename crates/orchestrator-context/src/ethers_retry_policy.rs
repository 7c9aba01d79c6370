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

use std::time::Duration;

use ethers::providers::{HttpClientError, JsonRpcError, RetryPolicy};
use hyperion_orchestrator_utils::probe;

/// Retries EVM JSON-RPC requests that failed because the node is rate
/// limiting us or is briefly unavailable.
///
/// Load balanced endpoints often fail with a `"header not found"` error
/// right after a new block, those requests are retried as well.
#[derive(Debug)]
pub struct HyperionHttpRetryPolicy {
    err_regex: regex::Regex,
}

impl Default for HyperionHttpRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperionHttpRetryPolicy {
    pub fn new() -> Self {
        Self {
            err_regex: regex::Regex::new(
                r"(?mixU)\b(?:rate|limit|429|Too \s Many \s Requests)\b",
            )
            .expect("Valid Regex"),
        }
    }

    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }

    fn should_retry_text(&self, text: &str) -> bool {
        // some providers answer errors with a body that is not JSON-RPC
        #[derive(serde::Deserialize)]
        struct Resp {
            error: JsonRpcError,
        }

        if let Ok(resp) = serde_json::from_str::<Resp>(text) {
            return should_retry_json_rpc_error(&resp.error);
        }
        let text = text.to_lowercase();
        let should_retry = self.err_regex.is_match(&text) || text.is_empty();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Retry,
            should_retry,
            error = %text,
        );
        should_retry
    }
}

fn should_retry_json_rpc_error(err: &JsonRpcError) -> bool {
    let JsonRpcError { code, message, .. } = err;
    // rate limited
    if *code == 429 || *code == -32005 {
        return true;
    }
    if *code == -32016 && message.contains("rate limit") {
        return true;
    }
    matches!(
        message.as_str(),
        "header not found"
            | "daily request count exceeded, request rate limited"
    )
}

impl RetryPolicy<HttpClientError> for HyperionHttpRetryPolicy {
    fn should_retry(&self, error: &HttpClientError) -> bool {
        tracing::debug!("should_retry: {:?}", error);
        match error {
            HttpClientError::ReqwestError(err) => {
                err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
                    || err.is_timeout()
                    || err.is_connect()
            }
            HttpClientError::JsonRpcError(err) => {
                should_retry_json_rpc_error(err)
            }
            HttpClientError::SerdeJson { text, .. } => {
                self.should_retry_text(text)
            }
        }
    }

    fn backoff_hint(&self, error: &HttpClientError) -> Option<Duration> {
        const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

        if let HttpClientError::JsonRpcError(err) = error {
            // infura sends the requested backoff along with the error
            let backoff_seconds = err
                .data
                .as_ref()
                .and_then(|data| data.get("rate"))
                .and_then(|rate| rate.get("backoff_seconds"));
            if let Some(seconds) = backoff_seconds.and_then(|v| v.as_u64()) {
                return Some(Duration::from_secs(seconds));
            }
            if let Some(seconds) = backoff_seconds.and_then(|v| v.as_f64()) {
                return Some(Duration::from_secs(seconds as u64 + 1));
            }
        }
        Some(DEFAULT_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str) -> HttpClientError {
        HttpClientError::JsonRpcError(JsonRpcError {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn retries_rate_limits() {
        let policy = HyperionHttpRetryPolicy::new();
        assert!(policy.should_retry(&rpc_error(429, "too many")));
        assert!(policy.should_retry(&rpc_error(-32000, "header not found")));
        assert!(!policy.should_retry(&rpc_error(-32000, "execution reverted")));
    }

    #[test]
    fn honors_the_requested_backoff() {
        let policy = HyperionHttpRetryPolicy::new();
        let err = HttpClientError::JsonRpcError(JsonRpcError {
            code: -32005,
            message: "daily request count exceeded".into(),
            data: Some(serde_json::json!({ "rate": { "backoff_seconds": 30 } })),
        });
        assert_eq!(policy.backoff_hint(&err), Some(Duration::from_secs(30)));
        assert_eq!(
            policy.backoff_hint(&rpc_error(1, "x")),
            Some(Duration::from_secs(5))
        );
    }
}
