//! Attachment blob references and their state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{AttachmentId, ExperimentId};

/// Length of a lowercase-hex SHA-256 checksum.
pub const CHECKSUM_HEX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    Initiated,
    Completed,
    Missing,
    Orphan,
}

/// A blob reference brokered through the object store. `objectKey` is
/// immutable once assigned at `Initiate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub experiment_id: ExperimentId,
    pub object_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub status: AttachmentStatus,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Attachment {
    type Id = AttachmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Attachment {
    /// Validate a checksum submitted at `Complete`: must be exactly 64
    /// lowercase hex characters (a SHA-256 digest).
    pub fn validate_checksum(checksum: &str) -> DomainResult<String> {
        if checksum.len() != CHECKSUM_HEX_LEN
            || !checksum.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(DomainError::invalid_input(
                "checksum must be 64 lowercase hex characters",
            ));
        }
        Ok(checksum.to_string())
    }

    pub fn is_completed_with_checksum(&self) -> bool {
        matches!(self.status, AttachmentStatus::Completed) && self.checksum.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_checksum() {
        assert!(Attachment::validate_checksum("abc").is_err());
    }

    #[test]
    fn rejects_uppercase_hex() {
        let bad = "A".repeat(CHECKSUM_HEX_LEN);
        assert!(Attachment::validate_checksum(&bad).is_err());
    }

    #[test]
    fn accepts_valid_checksum() {
        let good = "a".repeat(CHECKSUM_HEX_LEN);
        assert_eq!(Attachment::validate_checksum(&good).unwrap(), good);
    }
}
