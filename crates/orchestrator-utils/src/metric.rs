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

use derive_more::Display;
use prometheus::{
    register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry,
    Encoder, IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder,
};

/// The state a periodic loop is in, exported through the `loop_state` gauge.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next tick.
    #[display(fmt = "idle")]
    Idle,
    /// Executing a tick.
    #[display(fmt = "running")]
    Running,
    /// Waiting before the next attempt of a failed tick.
    #[display(fmt = "backoff")]
    Backoff,
    /// Stopped.
    #[display(fmt = "cancelled")]
    Cancelled,
}

impl LoopState {
    fn as_gauge_value(self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Backoff => 2,
            Self::Cancelled => 3,
        }
    }
}

/// A struct definition for collecting metrics in the orchestrator.
///
/// Every instance owns its registry, so several orchestrators (or tests) can
/// live in the same process.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Ticks executed per loop.
    pub loop_ticks: IntCounterVec,
    /// Failed attempts per loop.
    pub loop_errors: IntCounterVec,
    /// Current [`LoopState`] per loop.
    pub loop_state: IntGaugeVec,
    /// Claims submitted to the home chain, by event kind.
    pub claims_submitted: IntCounterVec,
    /// Confirmations submitted to the home chain, by kind.
    pub confirms_submitted: IntCounterVec,
    /// Batch creation requests sent, by token.
    pub batch_requests: IntCounterVec,
    /// Valset updates and batches relayed to the EVM chain.
    pub relays_submitted: IntCounterVec,
    /// Highest event nonce known to be observed by the home chain.
    pub last_observed_nonce: IntGauge,
}

impl Metrics {
    /// Instantiates the various metrics and registers them on a fresh
    /// registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("hyperion".into()), None)?;

        let loop_ticks = register_int_counter_vec_with_registry!(
            "loop_ticks",
            "The total number of ticks executed by a loop",
            &["loop"],
            registry
        )?;

        let loop_errors = register_int_counter_vec_with_registry!(
            "loop_errors",
            "How many attempts of a loop tick failed",
            &["loop"],
            registry
        )?;

        let loop_state = register_int_gauge_vec_with_registry!(
            "loop_state",
            "0 = idle, 1 = running, 2 = backoff, 3 = cancelled",
            &["loop"],
            registry
        )?;

        let claims_submitted = register_int_counter_vec_with_registry!(
            "claims_submitted",
            "The total number of claims submitted to the home chain",
            &["kind"],
            registry
        )?;

        let confirms_submitted = register_int_counter_vec_with_registry!(
            "confirms_submitted",
            "The total number of valset and batch confirmations submitted",
            &["kind"],
            registry
        )?;

        let batch_requests = register_int_counter_vec_with_registry!(
            "batch_requests",
            "The total number of batch creation requests",
            &["denom"],
            registry
        )?;

        let relays_submitted = register_int_counter_vec_with_registry!(
            "relays_submitted",
            "The total number of transactions relayed to the EVM chain",
            &["kind"],
            registry
        )?;

        let last_observed_nonce = register_int_gauge_with_registry!(
            "last_observed_nonce",
            "The last event nonce observed by the home chain for us",
            registry
        )?;

        Ok(Self {
            registry,
            loop_ticks,
            loop_errors,
            loop_state,
            claims_submitted,
            confirms_submitted,
            batch_requests,
            relays_submitted,
            last_observed_nonce,
        })
    }

    /// Records the new state of the loop `name`.
    pub fn set_loop_state(&self, name: &str, state: LoopState) {
        self.loop_state
            .with_label_values(&[name])
            .set(state.as_gauge_value());
        tracing::event!(
            target: crate::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %crate::probe::Kind::LoopState,
            loop_name = %name,
            %state,
        );
    }

    /// Gathers the whole orchestrator metrics in the prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

/// Errors raised while rendering the metrics.
#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    /// Encoding failed.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// The encoder produced invalid UTF-8.
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
