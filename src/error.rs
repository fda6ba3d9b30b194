use thiserror::Error;

use crate::core::types::Period;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("manifest for {period} is unavailable: {reason}")]
    ManifestUnavailable { period: Period, reason: String },
    #[error("document {object_id} not found: {reason}")]
    DocumentNotFound { object_id: String, reason: String },
    #[error("document {object_id} is malformed: {reason}")]
    DocumentMalformed { object_id: String, reason: String },
}

impl SourceError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SourceError::ManifestUnavailable { .. })
    }

    pub fn not_found(object_id: &str, reason: impl ToString) -> Self {
        SourceError::DocumentNotFound {
            object_id: object_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(object_id: &str, reason: impl ToString) -> Self {
        SourceError::DocumentMalformed {
            object_id: object_id.to_string(),
            reason: reason.to_string(),
        }
    }
}
