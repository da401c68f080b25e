//! # convertd: Document to PDF Conversion Service
//!
//! `convertd` is a thin HTTP front-end over a vendored WebAssembly
//! conversion engine: upload a document, get a PDF back.
//!
//! ## Overview
//!
//! The service exposes a single conversion endpoint. A multipart upload is
//! received in full, handed to the engine for a session of open, export and
//! close, and the resulting PDF is either streamed straight back or parked
//! in an object store with a reference returned to the caller.
//!
//! ### Request Flow
//!
//! `POST /api/convert` receives the multipart field `file`, enforces the
//! configured upload limit while the body streams in, and drives the engine
//! through [`engine::run_conversion`]. Sessions are always closed before the
//! response is decided, including after a failed export. Delivery is decided
//! by configuration: direct responses carry the PDF bytes with an attachment
//! disposition; store-based delivery uploads to S3 (or a local directory)
//! and answers with a JSON reference, or with a temporary redirect when the
//! caller passes `direct=true`.
//!
//! ### Engine Isolation
//!
//! The vendor engine is an opaque WebAssembly module. Every conversion runs
//! in a fresh instance with its own memory, and runaway conversions are
//! interrupted through epoch deadlines (see [`engine::wasm`]).
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod delivery;
pub mod diagnostics;
pub mod engine;
pub mod errors;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{self, HeaderValue};
use axum::routing::{get, post};
use bon::Builder;
pub use config::Config;
use tokio::net::TcpListener;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::config::{CorsOrigin, DeliveryConfig};
use crate::delivery::ObjectStore;
use crate::engine::ConversionEngine;
use crate::openapi::ApiDoc;

/// Headroom on top of the document limit for multipart boundaries and part
/// headers. The precise per-document limit is enforced while the field
/// streams in.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `config`: Application configuration loaded from file/environment
/// - `engine`: The conversion engine, shared across requests
/// - `store`: Object store for store-based delivery; `None` means the PDF
///   is streamed straight back
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<dyn ConversionEngine>,
    pub store: Option<Arc<dyn ObjectStore>>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let mut layer = CorsLayer::new()
        .allow_methods(vec![http::Method::GET, http::Method::POST])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .expose_headers(vec![http::header::LOCATION, http::header::CONTENT_DISPOSITION])
        .allow_credentials(cors_config.allow_credentials);

    // Config validation already rejects credentials combined with the
    // wildcard, which tower-http refuses at runtime.
    if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        layer = layer.allow_origin(cors::Any);
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            origins.push(origin.as_origin_string().parse::<HeaderValue>()?);
        }
        layer = layer.allow_origin(origins);
    }

    if let Some(max_age) = cors_config.max_age {
        layer = layer.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Build the application router with all endpoints and middleware.
///
/// This function constructs the complete Axum router with:
/// - The conversion endpoint, with a body limit derived from configuration
/// - A method-not-allowed fallback that keeps the error envelope shape
/// - Liveness probe and API documentation
/// - CORS configuration
/// - Tracing middleware
///
/// # Errors
///
/// Returns an error if the CORS configuration cannot be turned into a layer.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;
    let body_limit = state.config.max_upload_bytes as usize + MULTIPART_OVERHEAD;

    let router = Router::new()
        .route("/healthz", get(api::handlers::health::healthz))
        .route(
            "/api/convert",
            post(api::handlers::convert::convert_document)
                .fallback(api::handlers::convert::method_not_allowed)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] checks the engine asset, builds the
///    engine and (when configured) the object store, and assembles the router
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting convertd with configuration: {:#?}", config);

        // Not fatal: the error is also surfaced per-request, with a clearer
        // message than a refusal to boot.
        diagnostics::preflight_engine_asset(&config.engine).await;

        let engine = engine::create_engine(&config.engine)?;
        let store = match &config.delivery {
            DeliveryConfig::Direct => None,
            DeliveryConfig::Store { backend } => Some(delivery::create_object_store(backend).await?),
        };

        let state = AppState::builder().config(config.clone()).engine(engine).maybe_store(store).build();
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "convertd listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
