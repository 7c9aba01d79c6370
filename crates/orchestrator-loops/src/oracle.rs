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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyperion_evm_gateway::EvmChain;
use hyperion_home_gateway::HomeChain;
use hyperion_orchestrator_types::BridgeEvent;
use hyperion_orchestrator_utils::metric::Metrics;
use hyperion_orchestrator_utils::{probe, Error, Result};
use typed_builder::TypedBuilder;

use crate::OrchestratorLoop;

/// Claims the events of the bridge contract on the home chain, in event
/// nonce order and without gaps.
#[derive(TypedBuilder)]
pub struct EventOracle {
    home: Arc<dyn HomeChain>,
    evm: Arc<dyn EvmChain>,
    metrics: Arc<Metrics>,
    /// Address whose last claim tells where to resume.
    #[builder(setter(into))]
    validator: String,
    /// Blocks behind the tip that are considered final.
    #[builder(default = 12)]
    confirmations: u64,
    #[builder(default = 2000)]
    max_blocks_per_step: u64,
    #[builder(default = Duration::from_secs(60))]
    period: Duration,
    /// Last EVM height fully scanned and claimed by this process.
    #[builder(default, setter(skip))]
    cursor: AtomicU64,
}

impl EventOracle {
    /// Events in `from..=to`, queried in windows.
    async fn scan(&self, from: u64, to: u64) -> Result<Vec<BridgeEvent>> {
        let step = self.max_blocks_per_step.max(1);
        let mut events = Vec::new();
        let mut start = from;
        while start <= to {
            let end = to.min(start.saturating_add(step - 1));
            events.extend(self.evm.filter_events(start, end).await?);
            start = end + 1;
        }
        Ok(events)
    }
}

/// Orders `events` by nonce and keeps the ones following `last_nonce`.
///
/// Fails when they do not continue `last_nonce` without a gap.
fn pending_claims(
    mut events: Vec<BridgeEvent>,
    last_nonce: u64,
) -> Result<Vec<BridgeEvent>> {
    events.sort_by_key(BridgeEvent::event_nonce);
    events.dedup_by_key(|e| e.event_nonce());
    events.retain(|e| e.event_nonce() > last_nonce);
    for (expected, event) in (last_nonce + 1..).zip(&events) {
        if event.event_nonce() != expected {
            return Err(Error::NonceGap {
                expected,
                got: event.event_nonce(),
            });
        }
    }
    Ok(events)
}

#[async_trait::async_trait]
impl OrchestratorLoop for EventOracle {
    const TAG: &'static str = "oracle";

    fn period(&self) -> Duration {
        self.period
    }

    #[tracing::instrument(skip_all, name = "oracle_tick")]
    async fn tick(&self) -> Result<()> {
        let last = self.home.last_claim_event_by_addr(&self.validator).await?;
        self.metrics
            .last_observed_nonce
            .set(last.ethereum_event_nonce as i64);
        let tip = self.evm.latest_height().await?;
        let to = tip.saturating_sub(self.confirmations);
        if to <= last.ethereum_event_height {
            tracing::debug!(
                tip,
                last_height = last.ethereum_event_height,
                "no final block after the last claim",
            );
            return Ok(());
        }
        // The block of the last claim may hold more events.
        let cursor = self.cursor.load(Ordering::Acquire);
        let from = if cursor >= last.ethereum_event_height {
            cursor + 1
        } else {
            last.ethereum_event_height
        };
        if from > to {
            return Ok(());
        }
        let events = self.scan(from, to).await?;
        let claims = pending_claims(events, last.ethereum_event_nonce)
            .map_err(|e| {
                tracing::error!(error = %e, from, to, "cannot claim events");
                e
            })?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            from,
            to,
            claims = claims.len(),
        );
        for event in &claims {
            self.home.send_claim(event).await?;
            self.metrics
                .claims_submitted
                .with_label_values(&[event.kind()])
                .inc();
            tracing::info!(
                kind = event.kind(),
                nonce = event.event_nonce(),
                height = event.block_height(),
                "claimed event",
            );
        }
        self.cursor.store(to, Ordering::Release);
        Ok(())
    }
}
