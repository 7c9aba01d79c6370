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

//! # Orchestrator Service Module
//!
//! The `/metrics` endpoint served when `telemetry.stats-addr` is set.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use hyperion_orchestrator_context::Shutdown;
use hyperion_orchestrator_utils::metric::Metrics;

/// Prometheus text exposition of `metrics`.
fn render(metrics: &Metrics) -> (StatusCode, String) {
    match metrics.gather_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn handle_metrics(
    State(metrics): State<Arc<Metrics>>,
) -> impl IntoResponse {
    let (status, body) = render(&metrics);
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

/// Serves `GET /metrics` on `addr` until `shutdown` fires.
pub async fn build_axum_services(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: Shutdown,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(handle_metrics))
        .with_state(metrics);
    tracing::info!("Starting the metrics server on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;
    Ok(())
}
