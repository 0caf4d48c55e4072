//! `CourierServer`: Axum HTTP + WebSocket relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{any, get};
use courier_store::MessageStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::delivery::DeliveryEngine;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::history::history_handler;
use crate::queue::PendingQueueStore;
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::ws_handler;
use crate::websocket::session::SessionContext;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry, queues and routing.
    pub engine: Arc<DeliveryEngine>,
    /// Durable message record.
    pub store: Arc<dyn MessageStore>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// The slice of state a WebSocket session needs.
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            engine: self.engine.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.token(),
        }
    }
}

/// The relay server.
pub struct CourierServer {
    state: AppState,
}

impl CourierServer {
    /// Build the registry, queues and delivery engine around `store`.
    pub fn new(config: ServerConfig, store: Arc<dyn MessageStore>, metrics: PrometheusHandle) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let queue = Arc::new(PendingQueueStore::with_limits(
            config.queue_capacity,
            config.queue_overflow,
        ));
        let engine = Arc::new(DeliveryEngine::new(registry, queue, config.close_superseded));
        Self {
            state: AppState {
                engine,
                store,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", any(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/history/{user_id}", get(history_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port 0) and the task handle,
    /// which completes after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        info!(%local_addr, "courier server listening");

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %ServerError::Serve(e), "server stopped");
            }
        });

        Ok((local_addr, handle))
    }

    /// Delivery engine (registry and queues).
    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.state.engine
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        &state.engine,
        &state.shutdown,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
