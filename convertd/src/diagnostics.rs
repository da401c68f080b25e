//! Operational diagnostics: per-stage timing of conversions and startup
//! preflight checks.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::types::abbrev_uuid;

/// Wall-clock time spent in each stage of one conversion.
///
/// Filled in by the convert handler as the request moves through
/// receive/open/export/close/deliver and emitted as a single structured log
/// line once the response is decided.
#[derive(Debug, Default)]
pub struct StageTimings {
    pub recv: Duration,
    pub open: Duration,
    pub export: Duration,
    pub close: Duration,
    /// Absent when the PDF is streamed straight back
    pub deliver: Option<Duration>,
    pub upload_bytes: u64,
    pub pdf_bytes: u64,
}

impl StageTimings {
    /// Emit the one-line summary for a finished conversion.
    pub fn log_conversion(&self, conversion_id: &Uuid) {
        info!(
            conversion = %abbrev_uuid(conversion_id),
            recv_ms = self.recv.as_millis() as u64,
            open_ms = self.open.as_millis() as u64,
            export_ms = self.export.as_millis() as u64,
            close_ms = self.close.as_millis() as u64,
            deliver_ms = self.deliver.map(|d| d.as_millis() as u64),
            upload_bytes = self.upload_bytes,
            pdf_bytes = self.pdf_bytes,
            "Conversion finished"
        );
    }
}

/// Check that the configured engine asset exists, logging the outcome.
///
/// A missing module is reported but not fatal at startup; the first
/// conversion will surface the same problem to the caller.
pub async fn preflight_engine_asset(engine: &EngineConfig) {
    if let EngineConfig::Wasm { module_path, .. } = engine {
        match tokio::fs::metadata(module_path).await {
            Ok(meta) => {
                info!(
                    path = %module_path.display(),
                    size_bytes = meta.len(),
                    "Conversion engine module found"
                );
            }
            Err(e) => {
                warn!(
                    path = %module_path.display(),
                    error = %e,
                    "Conversion engine module is not readable; conversions will fail until it is provisioned"
                );
            }
        }
    }
}
