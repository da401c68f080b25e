//! API request and response data models.
//!
//! These structures define the public contract of the conversion API and
//! are kept separate from the internal types so the two can evolve
//! independently. All models carry `utoipa` annotations so the OpenAPI
//! document stays in lockstep with the code.

pub mod convert;
