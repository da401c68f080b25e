//! Artifact delivery
//!
//! With store-based delivery the converted PDF is uploaded to an object
//! store and the caller receives a reference instead of the bytes. This
//! module defines the [`ObjectStore`] trait plus the S3 and local-filesystem
//! implementations behind it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::config::StoreBackend;

pub mod local;
pub mod s3;

/// Result type for delivery operations
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised while storing a converted artifact
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("upload failed: {message}")]
    Upload { message: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract object store interface
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, returning the public URL of the object.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;
}

/// Create an object store from configuration
///
/// The single point where config turns into a store instance.
pub async fn create_object_store(backend: &StoreBackend) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match backend {
        StoreBackend::S3(config) => {
            info!(bucket = %config.bucket, region = %config.region, "Using S3 artifact store");
            Ok(Arc::new(s3::S3Store::new(config).await?))
        }
        StoreBackend::Local(config) => {
            info!(root = %config.root.display(), "Using local artifact store");
            Ok(Arc::new(local::LocalStore::new(config)?))
        }
    }
}

/// Derive the artifact filename from the uploaded one.
///
/// Keeps the final path component, swaps the extension for `.pdf`, replaces
/// whitespace with underscores and drops characters that have no business in
/// a filename. Falls back to `converted.pdf` when nothing usable remains.
pub fn derived_pdf_filename(original: Option<&str>) -> String {
    const FALLBACK: &str = "converted.pdf";

    let Some(original) = original else {
        return FALLBACK.to_string();
    };

    let base = original.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '"' | '\\' | '/'))
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    if cleaned.is_empty() {
        return FALLBACK.to_string();
    }

    match cleaned.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.pdf"),
        _ => format!("{cleaned}.pdf"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_replaced() {
        assert_eq!(derived_pdf_filename(Some("Report.docx")), "Report.pdf");
        assert_eq!(derived_pdf_filename(Some("slides.odp")), "slides.pdf");
    }

    #[test]
    fn test_extensionless_names_gain_pdf() {
        assert_eq!(derived_pdf_filename(Some("README")), "README.pdf");
    }

    #[test]
    fn test_only_last_extension_is_replaced() {
        assert_eq!(derived_pdf_filename(Some("archive.tar.gz")), "archive.tar.pdf");
    }

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(derived_pdf_filename(Some("/tmp/uploads/Report.docx")), "Report.pdf");
        assert_eq!(derived_pdf_filename(Some("C:\\Users\\me\\Report.docx")), "Report.pdf");
    }

    #[test]
    fn test_whitespace_and_quotes_are_sanitized() {
        assert_eq!(derived_pdf_filename(Some("my report \"final\".docx")), "my_report_final.pdf");
    }

    #[test]
    fn test_missing_or_unusable_names_fall_back() {
        assert_eq!(derived_pdf_filename(None), "converted.pdf");
        assert_eq!(derived_pdf_filename(Some("")), "converted.pdf");
        assert_eq!(derived_pdf_filename(Some("///")), "converted.pdf");
    }
}
