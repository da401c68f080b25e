//! OpenAPI documentation configuration.
//!
//! The generated document is rendered at `/docs` via Scalar.

use utoipa::OpenApi;

use crate::api;
use crate::api::models::convert::{ErrorBody, StoredConversionResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "convertd",
        description = "Document to PDF conversion service. Upload a document, get a PDF back."
    ),
    paths(api::handlers::convert::convert_document, api::handlers::health::healthz),
    components(schemas(StoredConversionResponse, ErrorBody)),
    tags(
        (name = "convert", description = "Document conversion"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
