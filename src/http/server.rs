//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the gate as a route layer
//! - Wire up middleware (request ID, tracing, timeout)
//! - Answer admitted requests: echo the sanitized request, or forward upstream
//! - Apply hot-reloaded configs to the gate
//! - Run the maintenance task alongside the listener
//! - Graceful shutdown on the broadcast signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{uri::PathAndQuery, Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GateConfig;
use crate::error::GateResult;
use crate::http::middleware::{security_middleware, GateState};
use crate::lifecycle::maintenance::MaintenanceTask;
use crate::security::clock::{Clock, SystemClock};
use crate::security::descriptor::RequestDescriptor;
use crate::security::gate::SecurityGate;

/// State injected into the application handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Option<String>,
    pub upstream_timeout: Duration,
}

/// HTTP server fronted by the security gate.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
    gate: Arc<SecurityGate>,
}

impl HttpServer {
    pub fn new(config: GateConfig) -> GateResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a server whose gate reads time from `clock`.
    pub fn with_clock(config: GateConfig, clock: Arc<dyn Clock>) -> GateResult<Self> {
        let gate = Arc::new(SecurityGate::with_clock(&config, clock)?);

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState {
            client,
            upstream: config.upstream.as_ref().map(|u| u.address.clone()),
            upstream_timeout: Duration::from_secs(config.timeouts.upstream_secs),
        };

        let router = Self::build_router(&config, gate.clone(), state);
        Ok(Self {
            router,
            config,
            gate,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, gate: Arc<SecurityGate>, state: AppState) -> Router {
        let gate_state = GateState {
            gate,
            listener: config.listener.clone(),
        };

        Router::new()
            .route("/{*path}", any(gate_handler))
            .route("/", any(gate_handler))
            .route_layer(middleware::from_fn_with_state(gate_state, security_middleware))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gate(&self) -> Arc<SecurityGate> {
        self.gate.clone()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let gate = self.gate.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                if let Err(e) = gate.reload(&new_config) {
                    tracing::error!(error = %e, "Rejected config reload, keeping current policies");
                }
            }
        });

        if self.config.maintenance.enabled {
            let task = MaintenanceTask::new(
                self.gate.clone(),
                Duration::from_secs(self.config.maintenance.cleanup_interval_secs),
            );
            let maintenance_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                task.run(maintenance_shutdown).await;
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Answers requests the gate admitted.
async fn gate_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.upstream.clone() {
        Some(upstream) => forward(&state, &upstream, request).await,
        None => echo(request),
    }
}

/// Echo the sanitized view of the request.
fn echo(request: Request<Body>) -> Response {
    match request.extensions().get::<RequestDescriptor>() {
        Some(descriptor) => Json(descriptor).into_response(),
        None => Json(json!({
            "method": request.method().as_str(),
            "path": request.uri().path(),
        }))
        .into_response(),
    }
}

async fn forward(state: &AppState, upstream: &str, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    let uri = match Uri::builder()
        .scheme("http")
        .authority(upstream)
        .path_and_query(path_and_query)
        .build()
    {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(upstream = %upstream, error = %e, "Invalid upstream address");
            return upstream_error(StatusCode::BAD_GATEWAY, "BAD_GATEWAY");
        }
    };
    parts.uri = uri;

    let outbound = Request::from_parts(parts, body);
    match tokio::time::timeout(state.upstream_timeout, state.client.request(outbound)).await {
        Ok(Ok(response)) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Ok(Err(e)) => {
            tracing::error!(upstream = %upstream, error = %e, "Upstream error");
            upstream_error(StatusCode::BAD_GATEWAY, "BAD_GATEWAY")
        }
        Err(_) => {
            tracing::error!(upstream = %upstream, "Upstream timed out");
            upstream_error(StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT")
        }
    }
}

fn upstream_error(status: StatusCode, code: &'static str) -> Response {
    (status, Json(json!({ "error": "Upstream request failed", "code": code }))).into_response()
}
