//! # qms-core
//!
//! Core types, errors, and configuration for QMS RS.
//!
//! This crate provides the foundational building blocks used across all other crates:
//! - Common error types
//! - Result type aliases
//! - Core traits (Identifiable, Timestamped)
//! - Pagination types
//! - Configuration types and loading

pub mod config;
pub mod error;
pub mod pagination;
pub mod result;
pub mod traits;

pub use error::*;
pub use pagination::*;
pub use result::*;
pub use traits::*;
