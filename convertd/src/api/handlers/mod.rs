//! HTTP request handlers for all API endpoints.
//!
//! Each handler is responsible for:
//! - Request validation and deserialization
//! - Driving the conversion pipeline
//! - Response serialization
//!
//! # Handler Modules
//!
//! - [`convert`]: document upload and conversion
//! - [`health`]: liveness probe

pub mod convert;
pub mod health;
