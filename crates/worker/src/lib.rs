//! Ramp saga worker.
//!
//! Hosts the phase processor and the recovery sweeper, with a small
//! operational HTTP surface, structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use ramp_store::RampStore;
use saga::{
    ChainClient, HandlerConfig, HandlerRegistry, PaymentProvider, PhaseProcessor, ProcessorConfig,
    register_default_handlers,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The record store selected at start-up.
pub type SharedStore = Arc<dyn RampStore>;

/// The processor shared by the HTTP routes and the recovery sweeper.
pub type Processor = PhaseProcessor<SharedStore>;

/// Shared application state accessible from all handlers.
///
/// Without a processor the worker only serves ramp status; nothing drives
/// ramps forward.
pub struct AppState {
    pub store: SharedStore,
    pub processor: Option<Arc<Processor>>,
}

impl AppState {
    pub fn new(processor: Arc<Processor>) -> Arc<Self> {
        Arc::new(Self {
            store: processor.store().clone(),
            processor: Some(processor),
        })
    }

    /// State for a store whose ramps no configured collaborator can drive.
    pub fn read_only(store: SharedStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            processor: None,
        })
    }
}

/// Builds a processor with the default handlers for both ramp directions.
pub fn create_processor(
    store: SharedStore,
    chain: Arc<dyn ChainClient>,
    payment: Arc<dyn PaymentProvider>,
    handler_config: HandlerConfig,
    processor_config: ProcessorConfig,
) -> Arc<Processor> {
    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, chain, payment, handler_config);
    tracing::info!(handlers = registry.len(), "Registered phase handlers");
    Arc::new(PhaseProcessor::with_config(store, registry, processor_config))
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/ramps/{id}", get(routes::ramps::get))
        .route("/ramps/{id}/process", post(routes::ramps::process))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
