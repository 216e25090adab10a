//! Result type aliases

use crate::error::QmsError;

/// Standard Result type for QMS operations
pub type QmsResult<T> = Result<T, QmsError>;
