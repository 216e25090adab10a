//! # qms-notifications
//!
//! E-mail notifications for QMS RS.
//!
//! ## Features
//!
//! - `EmailSender` trait with console, in-memory and HTTP relay senders
//! - Fixed three-attempt retry with backoff
//! - Message templates for one-time codes, invitations, approval decisions
//!   and the dashboard report

pub mod email;
pub mod templates;

pub use email::{
    build_sender, send_with_retry, ConsoleEmailSender, EmailAddress, EmailError, EmailMessage,
    EmailResult, EmailSender, MemoryEmailSender, RelayEmailSender, RetryPolicy,
};
pub use templates::{DashboardDigest, DepartmentLine, EmailTemplates};
