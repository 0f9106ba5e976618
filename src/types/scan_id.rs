//! Scan session identifiers.
//!
//! Every run gets a `ScanId` that rides on the root tracing span, so the
//! diagnostics of concurrent runs sharing one log can be separated.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Random (v4) identifier of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First block of the hyphenated form, enough to tell runs apart in logs.
    pub fn short(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        let full = self.0.hyphenated().encode_lower(&mut buf);
        full.split('-').next().unwrap_or(full).to_string()
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}
