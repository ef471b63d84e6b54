use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use allybridge_client::AllyClient;

use crate::config::AppConfig;
use crate::handlers::{self, AppState};

pub struct AllyBridgeServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Session lifecycle
        .route("/credentials", post(handlers::submit_credentials))
        .route("/logout", post(handlers::logout))
        // Portal operations
        .route("/appointments", get(handlers::list_appointments))
        .route("/patients/{patient_id}", get(handlers::fetch_patient_record))
        .route(
            "/patients/{patient_id}/progress-notes",
            get(handlers::list_progress_note_encounters).post(handlers::create_progress_note),
        )
        .route(
            "/patients/{patient_id}/progress-notes/{encounter_id}",
            get(handlers::fetch_progress_note),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<AllyBridgeServer> {
        let client = match self.config.credentials.clone() {
            Some(credentials) => {
                AllyClient::with_credentials(self.config.platform.clone(), credentials)?
            }
            None => {
                tracing::warn!(
                    "no portal credentials configured; operations will fail until \
                     ALLYBRIDGE__CREDENTIALS__USERNAME and __PASSWORD are provided"
                );
                AllyClient::new(self.config.platform.clone())?
            }
        };
        let state = AppState {
            client: Arc::new(client),
        };
        let app = build_app(&self.config, state);

        Ok(AllyBridgeServer {
            addr: self.addr,
            app,
        })
    }
}

impl AllyBridgeServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
