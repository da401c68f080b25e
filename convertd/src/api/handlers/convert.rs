//! The document conversion endpoint.
//!
//! One canonical path for every request: receive the upload, open an engine
//! session, export, close, deliver. All four response shapes (direct PDF,
//! stored JSON envelope, redirect, error envelope) come out of this single
//! handler.

use std::time::Instant;

use axum::Json;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use bytes::{Bytes, BytesMut};
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::api::models::convert::{ConvertQuery, ErrorBody, StoredConversionResponse};
use crate::delivery::derived_pdf_filename;
use crate::diagnostics::StageTimings;
use crate::engine::run_conversion;
use crate::errors::{Error, Result};
use crate::types::{StoredArtifactRef, UploadedFile, abbrev_uuid};

#[utoipa::path(
    post,
    path = "/api/convert",
    tag = "convert",
    summary = "Convert a document to PDF",
    description = "Upload a document as the multipart field `file` and receive it back as PDF. \
                   With store-based delivery the response is a JSON reference to the stored \
                   artifact, or a temporary redirect to it when `direct=true`.",
    request_body(
        content_type = "multipart/form-data",
        description = "Multipart form with the document under the field name `file`"
    ),
    params(ConvertQuery),
    responses(
        (status = 200, description = "Converted PDF (direct delivery) or stored artifact reference", body = StoredConversionResponse),
        (status = 307, description = "Redirect to the stored artifact (`direct=true`)"),
        (status = 400, description = "No usable `file` field in the request", body = ErrorBody),
        (status = 413, description = "Upload exceeds the configured size limit", body = ErrorBody),
        (status = 500, description = "Conversion or delivery failed", body = ErrorBody)
    )
)]
pub async fn convert_document(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let conversion_id = Uuid::new_v4();
    let mut timings = StageTimings::default();

    let multipart = multipart.map_err(|e| Error::ConversionFailed {
        detail: format!("not a multipart request: {}", e.body_text()),
    })?;

    let started = Instant::now();
    let upload = receive_upload(multipart, state.config.max_upload_bytes).await?;
    timings.recv = started.elapsed();
    timings.upload_bytes = upload.declared_size;

    info!(
        conversion = %abbrev_uuid(&conversion_id),
        filename = ?upload.original_name,
        size_bytes = upload.declared_size,
        content_type = ?upload.declared_mime,
        "Accepted document for conversion"
    );

    let result = run_conversion(state.engine.as_ref(), upload.bytes, &mut timings).await?;
    let pdf_size = result.size_bytes();
    timings.pdf_bytes = pdf_size;

    let filename = derived_pdf_filename(upload.original_name.as_deref());

    let response = match &state.store {
        None => direct_response(&filename, result.pdf_bytes),
        Some(store) => {
            let key = format!("{conversion_id}/{filename}");
            let started = Instant::now();
            let url = store.put(&key, result.pdf_bytes, "application/pdf").await?;
            timings.deliver = Some(started.elapsed());

            let artifact = StoredArtifactRef {
                url,
                filename,
                size_bytes: pdf_size,
            };
            if query.wants_redirect() {
                Redirect::temporary(&artifact.url).into_response()
            } else {
                Json(StoredConversionResponse::from_artifact(&artifact)).into_response()
            }
        }
    };

    timings.log_conversion(&conversion_id);
    Ok(response)
}

/// Fallback for `/api/convert` requests using the wrong method. Keeps the
/// error envelope shape and advertises what would have worked.
pub async fn method_not_allowed() -> impl IntoResponse {
    ([(header::ALLOW, "POST")], Error::MethodNotAllowed)
}

/// Pull the document out of the multipart body.
///
/// The first `file` field wins; other fields are drained and ignored. The
/// size limit is enforced incrementally so an oversized upload fails as soon
/// as it crosses the line, not once it has been buffered whole.
async fn receive_upload(mut multipart: Multipart, max_upload_bytes: u64) -> Result<UploadedFile> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::from_multipart(e, max_upload_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().map(|s| s.to_string());
        let declared_mime = field.content_type().map(|s| s.to_string());

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| Error::from_multipart(e, max_upload_bytes))? {
            buffer.extend_from_slice(&chunk);
            if buffer.len() as u64 > max_upload_bytes {
                warn!(
                    size_bytes = buffer.len(),
                    max_upload_bytes, "Upload exceeded the size limit, aborting"
                );
                return Err(Error::PayloadTooLarge {
                    limit_bytes: max_upload_bytes,
                });
            }
        }

        if buffer.is_empty() {
            return Err(Error::MissingFile {
                reason: "the `file` field is empty".to_string(),
            });
        }

        let declared_size = buffer.len() as u64;
        return Ok(UploadedFile {
            bytes: buffer.freeze(),
            original_name,
            declared_size,
            declared_mime,
        });
    }

    Err(Error::MissingFile {
        reason: "multipart body has no `file` field".to_string(),
    })
}

fn direct_response(filename: &str, pdf: Bytes) -> Response {
    let disposition = format!("attachment; filename=\"{filename}\"");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response()
}
