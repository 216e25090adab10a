//! One-time e-mail code
//!
//! Table: otp_codes

use chrono::{DateTime, Utc};
use qms_core::traits::Id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpCode {
    pub id: Option<Id>,
    pub email: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    /// Wrong guesses recorded against this code
    #[serde(default)]
    pub failed_attempts: i32,
    pub created_at: Option<DateTime<Utc>>,
}

impl OtpCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Unverified and not yet expired
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.verified && !self.is_expired(now)
    }
}
