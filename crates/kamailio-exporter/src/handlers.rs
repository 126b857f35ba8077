//! HTTP request handlers: metrics exposition, health probe and landing page.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use prometheus::{Encoder, Registry, TEXT_FORMAT, TextEncoder};
use tracing::error;

use crate::state::AppState;

// ============================================================
// Metrics
// ============================================================

/// Gathers the registry and renders the text exposition format.
///
/// Gathering performs blocking RPC calls to Kamailio, so it runs on the
/// blocking pool.
pub(crate) async fn handle_metrics(State(state): AppState) -> Response {
    let registry = state.registry.clone();
    match tokio::task::spawn_blocking(move || encode_metrics(&registry)).await {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {e}"),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "metrics collection task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics collection failed").into_response()
        }
    }
}

fn encode_metrics(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let families = registry.gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(buf)
}

// ============================================================
// Health
// ============================================================

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================
// Landing page
// ============================================================

pub(crate) async fn handle_index(State(state): AppState) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Kamailio Exporter</title></head>\n\
         <body>\n\
         <h1>Kamailio Exporter</h1>\n\
         <p>Version {version}, reading {transport}</p>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        version = kamailio_exporter_core::VERSION,
        transport = state.transport,
        path = state.metrics_path,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::{AppStateInner, SharedState};
    use kamailio_exporter_core::collector::{MockRpc, StatsCollector};
    use kamailio_exporter_core::config::{ConstLabels, Transport};
    use kamailio_exporter_core::metrics::Catalog;

    fn state(rpc: MockRpc) -> SharedState {
        let mut labels = ConstLabels::new();
        labels.insert("instance".into(), "sip-1".into());
        let catalog = Arc::new(Catalog::new(labels).unwrap());
        let registry = Registry::new();
        registry
            .register(Box::new(StatsCollector::new(rpc, catalog)))
            .unwrap();
        Arc::new(AppStateInner {
            registry,
            metrics_path: "/metrics".to_string(),
            transport: Transport::Tcp {
                host: "127.0.0.1".into(),
                port: 3012,
            },
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn metrics_are_rendered_in_text_format() {
        let response = handle_metrics(State(state(MockRpc::typical_kamailio()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_FORMAT);

        let text = body_text(response).await;
        assert!(text.contains("# TYPE kamailio_core_request_total counter"));
        assert!(text.contains(
            "kamailio_core_request_total{instance=\"sip-1\",method=\"rcv\"} 1200"
        ));
        assert!(text.contains("# TYPE kamailio_shm_bytes gauge"));
        assert!(text.contains("# HELP kamailio_calls_total Scripted metric calls_total"));
        assert!(text.contains(
            "kamailio_exporter_rpc_up{command=\"stats.fetch\",instance=\"sip-1\"} 1"
        ));
    }

    #[tokio::test]
    async fn unreachable_kamailio_still_answers() {
        let response = handle_metrics(State(state(MockRpc::unreachable()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains(
            "kamailio_exporter_rpc_up{command=\"pkg.stats\",instance=\"sip-1\"} 0"
        ));
        assert!(!text.contains("kamailio_pkg_bytes"));
    }

    #[tokio::test]
    async fn index_links_the_metrics_path() {
        let Html(page) = handle_index(State(state(MockRpc::new()))).await;
        assert!(page.contains("href=\"/metrics\""));
        assert!(page.contains("tcp:127.0.0.1:3012"));
    }
}
