//! Error taxonomy and the single terminal error responder.
//!
//! Every failure in the conversion pipeline is classified exactly once, at
//! the boundary where it is caught, into one [`Error`] variant. The
//! [`IntoResponse`] impl at the bottom of this file is the only place in the
//! service that writes an error response; handlers just return `Err` and let
//! the classification carry the status code and user-facing envelope.
//!
//! Classification of engine failures lives in the [`From<EngineError>`]
//! impl: structured signals (missing asset, load failure, deadline trap) map
//! directly, and opaque engine messages fall back to a timing-vocabulary
//! check before landing in the generic bucket.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

use crate::api::models::convert::ErrorBody;
use crate::delivery::DeliveryError;
use crate::engine::EngineError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request used a method other than POST on the conversion route
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Multipart body carried no usable `file` field
    #[error("No file provided: {reason}")]
    MissingFile { reason: String },

    /// Upload exceeds the configured size limit
    #[error("Upload exceeds the {limit_bytes}-byte limit")]
    PayloadTooLarge { limit_bytes: u64 },

    /// The engine's auxiliary binary is absent from the configured path
    #[error("Engine asset missing at {path}")]
    EngineAssetMissing { path: String },

    /// The engine module exists but could not be initialized
    #[error("Engine failed to load from {path}: {message}")]
    EngineLoadFailed { path: String, message: String },

    /// The engine raised while exporting the PDF
    #[error("PDF export failed: {message}")]
    ExportFailed { message: String },

    /// Export did not finish within the conversion budget
    #[error("Conversion timed out: {detail}")]
    Timeout { detail: String },

    /// The object store rejected the converted artifact
    #[error("Artifact delivery failed: {message}")]
    DeliveryFailed { message: String },

    /// Anything the classifier could not attribute to a known cause
    #[error("Conversion failed: {detail}")]
    ConversionFailed { detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::MissingFile { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::EngineAssetMissing { .. }
            | Error::EngineLoadFailed { .. }
            | Error::ExportFailed { .. }
            | Error::Timeout { .. }
            | Error::DeliveryFailed { .. }
            | Error::ConversionFailed { .. }
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable top-level summary, safe to show to clients.
    pub fn user_message(&self) -> String {
        match self {
            Error::MethodNotAllowed => "Method not allowed",
            Error::MissingFile { .. } => "No file provided",
            Error::PayloadTooLarge { .. } => "File too large",
            Error::EngineAssetMissing { .. } => "WASM file not found",
            Error::EngineLoadFailed { .. } => "Could not load conversion engine",
            Error::ExportFailed { .. } => "Failed to export PDF",
            Error::Timeout { .. } => "Conversion timed out",
            Error::DeliveryFailed { .. } => "Could not store converted file",
            Error::ConversionFailed { .. } => "Conversion failed",
            Error::Other(_) => "Server error",
        }
        .to_string()
    }

    /// Diagnostic line for the `details` field of the envelope. No stack
    /// traces; internal causes stay in the logs.
    pub fn details(&self) -> String {
        match self {
            Error::MethodNotAllowed => "Only POST is accepted on this route".to_string(),
            Error::MissingFile { reason } => reason.clone(),
            Error::PayloadTooLarge { limit_bytes } => {
                format!("Maximum file size is {}MB", limit_bytes / (1024 * 1024))
            }
            Error::EngineAssetMissing { path } => format!("Missing file: {path}"),
            Error::EngineLoadFailed { message, .. } => format!("Module load failed: {message}"),
            Error::ExportFailed { message } => message.clone(),
            Error::Timeout { detail } => detail.clone(),
            Error::DeliveryFailed { message } => message.clone(),
            Error::ConversionFailed { detail } => {
                if detail.is_empty() {
                    "Unknown error during document conversion".to_string()
                } else {
                    detail.clone()
                }
            }
            Error::Other(_) => "An unexpected error occurred while handling the request".to_string(),
        }
    }

    /// The filesystem path an engine initialization failure resolved to, for
    /// the operator-facing `path` field.
    pub fn offending_path(&self) -> Option<String> {
        match self {
            Error::EngineAssetMissing { path } | Error::EngineLoadFailed { path, .. } => Some(path.clone()),
            _ => None,
        }
    }

    /// Classify a multipart read failure. A body-limit violation surfaces as
    /// a read error whose cause chain mentions the length limit; everything
    /// else stays in the generic bucket.
    pub(crate) fn from_multipart(err: axum::extract::multipart::MultipartError, limit_bytes: u64) -> Self {
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(e) = cause {
            if e.to_string().contains("length limit") {
                return Error::PayloadTooLarge { limit_bytes };
            }
            cause = e.source();
        }
        Error::ConversionFailed {
            detail: format!("Failed to read multipart body: {err}"),
        }
    }
}

/// Timing/deadline vocabulary for classifying opaque engine messages. Only
/// consulted when no structured deadline signal was available.
fn mentions_deadline(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["timed out", "timeout", "deadline"].iter().any(|needle| lowered.contains(needle))
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        // First match wins: asset resolution, module load, structured
        // deadline, text heuristic, catch-all.
        match err {
            EngineError::AssetMissing { path } => Error::EngineAssetMissing { path },
            EngineError::LoadFailed { path, message } => Error::EngineLoadFailed { path, message },
            EngineError::DeadlineExceeded { budget } => Error::Timeout {
                detail: format!("Export did not complete within {budget:?}"),
            },
            EngineError::ExportFailed { message } => {
                if mentions_deadline(&message) {
                    Error::Timeout { detail: message }
                } else {
                    Error::ExportFailed { message }
                }
            }
            EngineError::Failed { message } => {
                if mentions_deadline(&message) {
                    Error::Timeout { detail: message }
                } else {
                    Error::ConversionFailed { detail: message }
                }
            }
        }
    }
}

impl From<DeliveryError> for Error {
    fn from(err: DeliveryError) -> Self {
        Error::DeliveryFailed { message: err.to_string() }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details here - different log levels based on severity
        match &self {
            Error::EngineAssetMissing { .. } | Error::EngineLoadFailed { .. } | Error::Other(_) => {
                tracing::error!("Engine initialization error: {:#}", self);
            }
            Error::ExportFailed { .. } | Error::Timeout { .. } | Error::DeliveryFailed { .. } | Error::ConversionFailed { .. } => {
                tracing::error!("Conversion error: {:#}", self);
            }
            Error::PayloadTooLarge { .. } => {
                tracing::warn!("Upload rejected: {}", self);
            }
            Error::MethodNotAllowed | Error::MissingFile { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = ErrorBody {
            error: self.user_message(),
            details: self.details(),
            path: self.offending_path(),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_the_taxonomy() {
        assert_eq!(Error::MethodNotAllowed.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            Error::MissingFile {
                reason: "no field".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::PayloadTooLarge { limit_bytes: 1024 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        for server_side in [
            Error::EngineAssetMissing {
                path: "/tmp/engine.wasm".to_string(),
            },
            Error::ExportFailed {
                message: "boom".to_string(),
            },
            Error::Timeout {
                detail: "budget".to_string(),
            },
            Error::DeliveryFailed {
                message: "store down".to_string(),
            },
            Error::ConversionFailed { detail: String::new() },
        ] {
            assert_eq!(server_side.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_asset_missing_envelope_carries_path() {
        let err = Error::EngineAssetMissing {
            path: "/opt/convertd/vendor/engine.wasm".to_string(),
        };
        assert_eq!(err.user_message(), "WASM file not found");
        assert_eq!(err.details(), "Missing file: /opt/convertd/vendor/engine.wasm");
        assert_eq!(err.offending_path().as_deref(), Some("/opt/convertd/vendor/engine.wasm"));
    }

    #[test]
    fn test_payload_details_report_limit_in_mb() {
        let err = Error::PayloadTooLarge {
            limit_bytes: 50 * 1024 * 1024,
        };
        assert_eq!(err.user_message(), "File too large");
        assert_eq!(err.details(), "Maximum file size is 50MB");
    }

    #[test]
    fn test_conversion_failed_with_empty_detail_uses_fallback_text() {
        let err = Error::ConversionFailed { detail: String::new() };
        assert_eq!(err.details(), "Unknown error during document conversion");
    }

    #[test]
    fn test_structured_deadline_maps_to_timeout() {
        let err = Error::from(EngineError::DeadlineExceeded {
            budget: std::time::Duration::from_secs(30),
        });
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(err.user_message(), "Conversion timed out");
        assert_eq!(err.details(), "Export did not complete within 30s");
    }

    #[test]
    fn test_deadline_vocabulary_in_opaque_messages_maps_to_timeout() {
        for message in ["render timed out after 30000ms", "Timeout waiting for layout", "deadline exceeded"] {
            let err = Error::from(EngineError::ExportFailed {
                message: message.to_string(),
            });
            assert!(matches!(err, Error::Timeout { .. }), "expected timeout for {message:?}");
        }
    }

    #[test]
    fn test_opaque_export_failure_stays_export_failed() {
        let err = Error::from(EngineError::ExportFailed {
            message: "glyph table corrupt".to_string(),
        });
        assert!(matches!(err, Error::ExportFailed { .. }));
        assert_eq!(err.user_message(), "Failed to export PDF");
    }

    #[test]
    fn test_unattributed_engine_failure_falls_through_to_generic() {
        let err = Error::from(EngineError::Failed {
            message: "unsupported document format (code -3)".to_string(),
        });
        assert!(matches!(err, Error::ConversionFailed { .. }));
        assert_eq!(err.user_message(), "Conversion failed");
    }

    #[test]
    fn test_asset_and_load_classification_take_precedence() {
        let asset = Error::from(EngineError::AssetMissing {
            path: "/x/engine.wasm".to_string(),
        });
        assert!(matches!(asset, Error::EngineAssetMissing { .. }));

        // A load failure mentioning timing must still classify as a load
        // failure; the vocabulary check only applies to opaque messages.
        let load = Error::from(EngineError::LoadFailed {
            path: "/x/engine.wasm".to_string(),
            message: "validation timed out".to_string(),
        });
        assert!(matches!(load, Error::EngineLoadFailed { .. }));
    }
}
