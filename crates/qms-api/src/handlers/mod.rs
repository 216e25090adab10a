//! API request handlers

pub mod accounts;
pub mod auth;
pub mod documents;
pub mod functions;
pub mod members;
pub mod quality;
pub mod tasks;
