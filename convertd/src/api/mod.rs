//! API layer for HTTP request handling and data models.
//!
//! This module contains the REST API implementation, organized into:
//!
//! - **[`handlers`]**: Axum route handlers for all endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! The surface is deliberately small:
//!
//! - **Conversion** (`POST /api/convert`): multipart document upload in,
//!   PDF bytes or a stored-artifact reference out
//! - **Health** (`GET /healthz`): liveness probe
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`.
//! The rendered documentation is served at `/docs`.

pub mod handlers;
pub mod models;
