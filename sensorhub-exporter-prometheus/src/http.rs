//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use sensorhub_framework::MetricRegistry;

use crate::config::PrometheusConfig;
use crate::render::Renderer;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
struct AppState {
    registry: MetricRegistry,
    renderer: Arc<Renderer>,
}

/// Routes: the metrics path, `/health` (process is up) and `/ready`
/// (at least one instrument is registered).
pub fn create_router(registry: MetricRegistry, renderer: Arc<Renderer>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(scrape))
        .route("/health", get(|| async { "healthy\n" }))
        .route("/ready", get(ready))
        .layer(CorsLayer::permissive())
        .with_state(AppState { registry, renderer })
}

// Collection only runs plain callbacks under short locks, so it stays on
// the request task.
async fn scrape(State(state): State<AppState>) -> Response {
    let body = state.renderer.scrape(&state.registry);
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    if state.registry.is_empty() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no instruments registered\n",
        )
            .into_response()
    } else {
        "ready\n".into_response()
    }
}

/// The Prometheus scrape endpoint.
pub struct HttpServer {
    registry: MetricRegistry,
    renderer: Arc<Renderer>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    pub fn new(registry: MetricRegistry, config: &PrometheusConfig) -> anyhow::Result<Self> {
        Ok(Self {
            registry,
            renderer: Arc::new(Renderer::new(config)),
            listen_addr: config.listen_addr()?,
            metrics_path: config.path.clone(),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Bind the listener and run until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        let router = create_router(self.registry, self.renderer, &self.metrics_path);

        info!(addr = %addr, path = %self.metrics_path, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // A dropped sender counts as shutdown too.
                let _ = shutdown.wait_for(|stop| *stop).await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
