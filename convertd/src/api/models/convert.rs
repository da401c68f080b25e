//! Models for the conversion endpoint.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::types::StoredArtifactRef;

/// Query parameters accepted by `POST /api/convert`.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(default)]
pub struct ConvertQuery {
    /// With store-based delivery, `direct=true` answers with a redirect to
    /// the stored artifact instead of a JSON body
    pub direct: Option<String>,
}

impl ConvertQuery {
    /// Only the literal string `true` opts in; any other value keeps the
    /// JSON envelope.
    pub fn wants_redirect(&self) -> bool {
        self.direct.as_deref() == Some("true")
    }
}

/// Response body for a conversion delivered through the object store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredConversionResponse {
    /// Always `true`; failures use the error envelope instead
    pub success: bool,
    /// Public URL of the stored PDF
    pub url: String,
    /// Filename derived from the uploaded one
    pub filename: String,
    /// Size of the PDF in bytes
    pub size: u64,
}

impl StoredConversionResponse {
    pub fn from_artifact(artifact: &StoredArtifactRef) -> Self {
        Self {
            success: true,
            url: artifact.url.clone(),
            filename: artifact.filename.clone(),
            size: artifact.size_bytes,
        }
    }
}

/// Error envelope returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Short, stable, user-facing summary
    pub error: String,
    /// Operator-facing detail
    pub details: String,
    /// Offending filesystem path, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
