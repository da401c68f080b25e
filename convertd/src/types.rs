//! Core data types flowing through the conversion pipeline.
//!
//! One request produces at most one of each of these, in order:
//!
//! - [`UploadedFile`]: what the upload receiver extracted from the multipart
//!   body
//! - [`ConversionResult`]: the PDF bytes produced by the engine
//! - [`StoredArtifactRef`]: where the PDF ended up when store-backed delivery
//!   is configured
//!
//! Nothing here outlives the request that created it; the artifact reference
//! points at bytes the object store owns from then on.

use bytes::Bytes;
use uuid::Uuid;

/// Per-request identifier, used for log correlation and artifact keys.
pub type ConversionId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// One document as received from the client, buffered fully in memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Bytes,
    /// Filename as declared by the client, if it sent one
    pub original_name: Option<String>,
    /// Byte count of the buffered upload
    pub declared_size: u64,
    /// Content type as declared by the client; informational only
    pub declared_mime: Option<String>,
}

/// The engine's output for one successful session.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub pdf_bytes: Bytes,
}

impl ConversionResult {
    pub fn size_bytes(&self) -> u64 {
        self.pdf_bytes.len() as u64
    }
}

/// Reference to a PDF handed off to the object store.
#[derive(Debug, Clone)]
pub struct StoredArtifactRef {
    pub url: String,
    pub filename: String,
    pub size_bytes: u64,
}
