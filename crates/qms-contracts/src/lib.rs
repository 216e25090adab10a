//! # qms-contracts
//!
//! Contract validation for QMS RS.
//!
//! Contracts validate entities before create/update operations and check the
//! acting user's permissions.

pub mod base;
pub mod documents;
pub mod members;
pub mod quality;
pub mod tasks;

pub use base::*;
