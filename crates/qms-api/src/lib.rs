//! # qms-api
//!
//! JSON REST API (`/api/v1`) and function endpoints (`/functions/v1`) for
//! QMS RS. Handlers authenticate the caller, delegate to `qms-services` and
//! map [`QmsError`](qms_core::QmsError) to `{ "error", "message" }` bodies.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;

#[cfg(test)]
pub(crate) mod test_support;

pub use extractors::AppState;
pub use routes::router;
