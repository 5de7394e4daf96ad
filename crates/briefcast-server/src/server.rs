//! HTTP surface: WebSocket upgrade, health, metrics, and the publish endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use briefcast_bus::{BroadcastBus, Publisher};
use briefcast_core::{EventRecord, SessionId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthCounters, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::SessionRegistry;
use crate::websocket::session::{SessionOptions, run_ws_session};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions.
    pub registry: SessionRegistry,
    /// Producer-side publisher for the HTTP endpoint.
    pub publisher: Publisher,
    /// Shutdown signal.
    pub shutdown: ShutdownCoordinator,
    /// Server start time.
    pub start_time: Instant,
    /// Per-connection knobs.
    pub session_options: SessionOptions,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The briefcast server: owns the registry, the publisher, and the bus.
pub struct BriefcastServer {
    config: ServerConfig,
    bus: Arc<dyn BroadcastBus>,
    registry: SessionRegistry,
    publisher: Publisher,
    shutdown: ShutdownCoordinator,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl BriefcastServer {
    /// Build a server over an already-constructed bus.
    pub fn new(
        config: ServerConfig,
        bus: Arc<dyn BroadcastBus>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let registry = SessionRegistry::new(Arc::clone(&bus), config.channel_prefix.clone());
        let publisher = Publisher::new(Arc::clone(&bus), config.channel_prefix.clone());
        Self {
            config,
            bus,
            registry,
            publisher,
            shutdown: ShutdownCoordinator::new(),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            publisher: self.publisher.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            session_options: self.config.session_options(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/{session_id}", get(ws_handler))
            .route("/api/sessions/{session_id}/events", post(publish_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until [`shutdown`](Self::shutdown) is triggered.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, bus = self.bus.backend_name(), "briefcast server listening");
        let handle = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(%error, "server exited with error");
            }
        });
        Ok((addr, handle))
    }

    /// Stop accepting, close every session, wait for `handles`, then close
    /// the bus. Returns `false` if the shutdown timeout elapsed.
    pub async fn shutdown_gracefully(&self, handles: Vec<JoinHandle<()>>) -> bool {
        info!("shutting down");
        self.shutdown.shutdown();
        self.registry.shutdown().await;
        let finished = self
            .shutdown
            .graceful_shutdown(handles, Some(self.config.shutdown_timeout()))
            .await;
        self.bus.close().await;
        finished
    }

    /// Session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Publisher over the server's bus.
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runtime config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The shared bus.
    pub fn bus(&self) -> &Arc<dyn BroadcastBus> {
        &self.bus
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let counters = HealthCounters {
        connections: state.registry.total_connections(),
        sessions: state.registry.session_count(),
        bridges: state.registry.active_bridges(),
    };
    Json(health::health_check(
        state.start_time,
        counters,
        state.registry.bus_backend(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let session_id = SessionId::from(session_id);
    let registry = state.registry.clone();
    let options = state.session_options;
    ws.on_upgrade(move |socket| run_ws_session(socket, session_id, registry, options))
}

async fn publish_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    body: String,
) -> Response {
    let event = match EventRecord::from_json(&body) {
        Ok(event) => event,
        Err(error) => {
            warn!(%session_id, %error, "rejected event record");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response();
        }
    };

    let session_id = SessionId::from(session_id);
    let published = state.publisher.publish_raw(&session_id, body).await;
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "published": published,
            "event_id": event.event_id(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use briefcast_bus::InMemoryBus;
    use briefcast_core::{EventType, Severity, SourceAgent};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> BriefcastServer {
        BriefcastServer::new(ServerConfig::default(), Arc::new(InMemoryBus::new()), None)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 64_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn event_json() -> String {
        EventRecord::builder(
            EventType::ActionRequired,
            SourceAgent::RecoveryCoordinator,
            Severity::Critical,
            "incident-9",
        )
        .summary("Approve closure order")
        .build()
        .unwrap()
        .to_json()
        .unwrap()
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.registry().session_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.bus().backend_name(), "memory");
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["active_sessions"], 0);
        assert_eq!(parsed["active_bridges"], 0);
        assert_eq!(parsed["bus"], "memory");
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = BriefcastServer::new(
            ServerConfig::default(),
            Arc::new(InMemoryBus::new()),
            Some(handle),
        );
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn publish_valid_event_is_accepted() {
        let server = make_server();
        let body = event_json();
        let event_id = EventRecord::from_json(&body).unwrap().event_id().clone();

        let resp = server
            .router()
            .oneshot(post("/api/sessions/s1/events", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["published"], true);
        assert_eq!(parsed["event_id"], event_id.as_str());
    }

    #[tokio::test]
    async fn publish_invalid_event_is_422() {
        let server = make_server();
        let mut value: serde_json::Value = serde_json::from_str(&event_json()).unwrap();
        value["proof_layer"]["confidence"] = json!(1.5);

        let resp = server
            .router()
            .oneshot(post("/api/sessions/s1/events", value.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let parsed = body_json(resp).await;
        assert!(parsed["error"].as_str().unwrap().contains("confidence"));
    }

    #[tokio::test]
    async fn publish_unknown_agent_is_422() {
        let server = make_server();
        let body = event_json().replace("recovery_coordinator", "weather_oracle");
        let resp = server
            .router()
            .oneshot(post("/api/sessions/s1/events", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn publish_on_closed_bus_reports_not_published() {
        let server = make_server();
        server.bus().close().await;
        let resp = server
            .router()
            .oneshot(post("/api/sessions/s1/events", event_json()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["published"], false);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let app = make_server().router();
        let req = Request::builder().uri("/ws/s1").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn shutdown_gracefully_closes_bus() {
        let server = make_server();
        assert!(server.shutdown_gracefully(Vec::new()).await);
        assert!(server.shutdown().is_shutting_down());
        assert!(server.bus().is_closed());
    }
}
