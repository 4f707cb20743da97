//! Prometheus metrics endpoint.
//!
//! Serves `/metrics` in the Prometheus text format and `/health` for
//! liveness probes.

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{BindSnafu, MetricsError, PrometheusInitSnafu};

/// Bind `addr`, install the Prometheus recorder and serve it in the
/// background.
///
/// The port is bound before the recorder is installed; a port conflict is a
/// startup error. Returns the bound address.
pub async fn init(addr: SocketAddr) -> Result<SocketAddr, MetricsError> {
    let listener = TcpListener::bind(addr).await.context(BindSnafu { addr })?;
    let local_addr = listener.local_addr().context(BindSnafu { addr })?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    tokio::spawn(serve(listener, router(handle)));
    info!("Metrics endpoint listening on http://{}/metrics", local_addr);
    Ok(local_addr)
}

fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(|| async { "ok\n" }))
        .with_state(handle)
}

async fn serve(listener: TcpListener, app: Router) {
    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {}", e);
    }
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetricsError;

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let err = init(addr).await.unwrap_err();
        assert!(matches!(err, MetricsError::Bind { .. }));
    }
}
