//! Conversion engine abstraction layer
//!
//! This module defines the [`ConversionEngine`] and [`ConversionSession`]
//! traits which abstract the document-to-PDF conversion step. The production
//! engine drives a vendored WebAssembly module; a deterministic stub backs
//! development and tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::config::EngineConfig;
use crate::diagnostics::StageTimings;
use crate::types::ConversionResult;

pub mod stub;
pub mod wasm;

/// Create a conversion engine from configuration
///
/// This is the single point where config turns into an engine instance.
/// Adding a new engine requires adding a match arm here.
pub fn create_engine(config: &EngineConfig) -> anyhow::Result<Arc<dyn ConversionEngine>> {
    match config {
        EngineConfig::Wasm {
            module_path,
            license,
            export_timeout,
        } => Ok(Arc::new(wasm::WasmEngine::new(
            module_path.clone(),
            license.clone(),
            *export_timeout,
        )?)),
        EngineConfig::Stub => Ok(Arc::new(stub::StubEngine::default())),
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while driving a conversion engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine asset not found at {path}")]
    AssetMissing { path: String },

    #[error("failed to load engine module from {path}: {message}")]
    LoadFailed { path: String, message: String },

    #[error("export did not produce a PDF: {message}")]
    ExportFailed { message: String },

    #[error("conversion exceeded its budget of {budget:?}")]
    DeadlineExceeded { budget: Duration },

    #[error("{message}")]
    Failed { message: String },
}

/// One conversion engine instance, shared across requests.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Open a session for one uploaded document.
    async fn open(&self, document: Bytes) -> Result<Box<dyn ConversionSession>>;
}

/// An open session holding engine-side state for one document.
///
/// Sessions must be closed exactly once; [`run_conversion`] owns that
/// ordering.
#[async_trait]
pub trait ConversionSession: Send {
    /// Render the opened document to PDF.
    async fn export_pdf(&mut self) -> Result<Bytes>;

    /// Release engine-side resources for this session.
    async fn close(&mut self) -> Result<()>;
}

impl std::fmt::Debug for dyn ConversionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConversionSession")
    }
}

/// Drive one document through open, export and close, timing each stage.
///
/// Once a session has opened it is closed no matter how the export went. A
/// close failure after a successful export is logged and swallowed; after a
/// failed export the export error wins.
pub async fn run_conversion(
    engine: &dyn ConversionEngine,
    document: Bytes,
    timings: &mut StageTimings,
) -> Result<ConversionResult> {
    let started = Instant::now();
    let mut session = engine.open(document).await?;
    timings.open = started.elapsed();

    let started = Instant::now();
    let exported = session.export_pdf().await;
    timings.export = started.elapsed();

    let started = Instant::now();
    let closed = session.close().await;
    timings.close = started.elapsed();
    if let Err(e) = closed {
        warn!(error = %e, "Conversion session close failed");
    }

    exported.map(|pdf_bytes| ConversionResult { pdf_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockEngine;

    #[tokio::test]
    async fn test_run_conversion_closes_after_failed_export() {
        let engine = MockEngine::failing_export();
        let mut timings = StageTimings::default();

        let err = run_conversion(&engine, Bytes::from_static(b"doc"), &mut timings)
            .await
            .expect_err("export should fail");

        assert!(matches!(err, EngineError::ExportFailed { .. }));
        assert_eq!(engine.counters().opened(), 1);
        assert_eq!(engine.counters().closed(), 1);
    }

    #[tokio::test]
    async fn test_run_conversion_keeps_pdf_when_close_fails() {
        let engine = MockEngine::failing_close();
        let mut timings = StageTimings::default();

        let result = run_conversion(&engine, Bytes::from_static(b"doc"), &mut timings)
            .await
            .expect("close failure must not override a successful export");

        assert!(result.pdf_bytes.starts_with(b"%PDF-"));
        assert_eq!(engine.counters().closed(), 1);
    }

    #[tokio::test]
    async fn test_create_engine_for_stub_config() {
        let engine = create_engine(&EngineConfig::Stub).expect("stub engine should build");
        let mut timings = StageTimings::default();

        let result = run_conversion(engine.as_ref(), Bytes::from_static(b"hello"), &mut timings)
            .await
            .expect("stub conversion should succeed");

        assert!(result.size_bytes() > 0);
        assert!(result.pdf_bytes.starts_with(b"%PDF-"));
        assert!(timings.close >= Duration::ZERO);
    }
}
