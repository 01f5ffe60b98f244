//! Resource types published through the environment.

use serde::{Deserialize, Serialize};

/// Handle to a database-backed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseHandle {
    pub url: String,
}

impl DatabaseHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Outbound mail session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSession {
    pub smtp_host: String,
    pub from: String,
}
