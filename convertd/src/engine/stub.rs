//! Deterministic stub engine for development and smoke tests.
//!
//! No vendor module required: exports a hand-assembled single-page PDF that
//! names the size of the source document. Same input, same output, which is
//! what the idempotence tests lean on.

use async_trait::async_trait;
use bytes::Bytes;

use super::{ConversionEngine, ConversionSession, EngineError, Result};

#[derive(Debug, Default, Clone)]
pub struct StubEngine;

#[async_trait]
impl ConversionEngine for StubEngine {
    async fn open(&self, document: Bytes) -> Result<Box<dyn ConversionSession>> {
        if document.is_empty() {
            return Err(EngineError::Failed {
                message: "stub engine cannot open an empty document".to_string(),
            });
        }
        Ok(Box::new(StubSession {
            source_len: document.len(),
            closed: false,
        }))
    }
}

struct StubSession {
    source_len: usize,
    closed: bool,
}

#[async_trait]
impl ConversionSession for StubSession {
    async fn export_pdf(&mut self) -> Result<Bytes> {
        if self.closed {
            return Err(EngineError::ExportFailed {
                message: "session is already closed".to_string(),
            });
        }
        Ok(minimal_pdf(self.source_len))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Build the smallest PDF most viewers will open: catalog, page tree, one
/// page, a content stream and the built-in Helvetica font.
fn minimal_pdf(source_len: usize) -> Bytes {
    let text = format!("Converted {source_len} source bytes");
    let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");

    let mut pdf = String::new();
    let mut offsets = Vec::with_capacity(5);

    pdf.push_str("%PDF-1.4\n");

    offsets.push(pdf.len());
    pdf.push_str("1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

    offsets.push(pdf.len());
    pdf.push_str("2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");

    offsets.push(pdf.len());
    pdf.push_str(
        "3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>\nendobj\n",
    );

    offsets.push(pdf.len());
    pdf.push_str(&format!(
        "4 0 obj\n<< /Length {} >>\nstream\n{stream}\nendstream\nendobj\n",
        stream.len()
    ));

    offsets.push(pdf.len());
    pdf.push_str("5 0 obj\n<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>\nendobj\n");

    let xref_at = pdf.len();
    pdf.push_str("xref\n0 6\n0000000000 65535 f \n");
    for offset in &offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n"
    ));

    Bytes::from(pdf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_exports_wellformed_pdf() {
        let engine = StubEngine::default();
        let mut session = engine.open(Bytes::from_static(b"hello")).await.expect("open should succeed");
        let pdf = session.export_pdf().await.expect("export should succeed");
        session.close().await.expect("close should succeed");

        let body = String::from_utf8(pdf.to_vec()).expect("stub PDF is ASCII");
        assert!(body.starts_with("%PDF-1.4"));
        assert!(body.contains("Converted 5 source bytes"));
        assert!(body.trim_end().ends_with("%%EOF"));
    }

    #[tokio::test]
    async fn test_stub_is_deterministic() {
        let engine = StubEngine::default();

        let mut first = engine.open(Bytes::from_static(b"same doc")).await.expect("open should succeed");
        let mut second = engine.open(Bytes::from_static(b"same doc")).await.expect("open should succeed");
        assert_eq!(
            first.export_pdf().await.expect("export should succeed"),
            second.export_pdf().await.expect("export should succeed"),
        );
    }

    #[tokio::test]
    async fn test_stub_rejects_empty_document() {
        let engine = StubEngine::default();
        let err = engine.open(Bytes::new()).await.expect_err("empty document should be rejected");
        assert!(matches!(err, EngineError::Failed { .. }));
    }
}
