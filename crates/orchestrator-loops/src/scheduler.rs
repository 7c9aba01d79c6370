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

use tokio::time::MissedTickBehavior;

use hyperion_orchestrator_context::Shutdown;
use hyperion_orchestrator_utils::metric::{LoopState, Metrics};
use hyperion_orchestrator_utils::retry::{retry, ExponentialWithMaxRetryCount};
use hyperion_orchestrator_utils::{probe, Error, Result};

use crate::OrchestratorLoop;

/// Runs `job` every [`OrchestratorLoop::period`] until `shutdown` fires.
///
/// A failing tick is retried with an exponential backoff, at most
/// `max_retries` attempts, before the next one is scheduled. When every
/// attempt failed the error is returned and the loop stops. Returns
/// `Ok(())` once shut down.
#[tracing::instrument(skip_all, fields(tag = %L::TAG))]
pub async fn run_loop<L: OrchestratorLoop>(
    job: &L,
    mut shutdown: Shutdown,
    max_retries: usize,
    metrics: &Metrics,
) -> Result<()> {
    let tag = L::TAG;
    let mut interval = tokio::time::interval(job.period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    metrics.set_loop_state(tag, LoopState::Idle);
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        loop_tag = %tag,
        started = true,
    );
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = interval.tick() => {}
        }
        metrics.loop_ticks.with_label_values(&[tag]).inc();
        let backoff =
            ExponentialWithMaxRetryCount::with_max_attempts(max_retries);
        let result = retry(tag, backoff, shutdown.recv(), || async move {
            metrics.set_loop_state(tag, LoopState::Running);
            let result = job.tick().await;
            if result.is_err() {
                metrics.loop_errors.with_label_values(&[tag]).inc();
                metrics.set_loop_state(tag, LoopState::Backoff);
            }
            result
        })
        .await;
        match result {
            Ok(()) => metrics.set_loop_state(tag, LoopState::Idle),
            Err(Error::Cancelled) => break,
            Err(e) => {
                tracing::error!(%tag, error = %e, "loop stopped");
                metrics.set_loop_state(tag, LoopState::Cancelled);
                return Err(e);
            }
        }
    }
    metrics.set_loop_state(tag, LoopState::Cancelled);
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        loop_tag = %tag,
        stopped = true,
    );
    Ok(())
}
