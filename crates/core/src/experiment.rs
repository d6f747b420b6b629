//! The Experiment aggregate: experiments, their immutable entries, and the
//! durable artifacts produced when an addendum is submitted against a stale
//! base entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{ConflictArtifactId, EntryId, ExperimentId, UserId};

/// Lifecycle status of an experiment. `Completed` is terminal: once reached,
/// no further entries may be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Completed,
}

/// Container owned by a single user. Entries are appended to it; it is never
/// itself deleted by this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub owner_user_id: UserId,
    pub title: String,
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Experiment {
    type Id = ExperimentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Experiment {
    /// Validate and trim a proposed title. Titles are stored trimmed; a
    /// title that is empty after trimming is `InvalidInput`.
    pub fn validate_title(title: &str) -> DomainResult<String> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_input("title must not be empty"));
        }
        Ok(trimmed.to_string())
    }

    pub fn is_draft(&self) -> bool {
        matches!(self.status, ExperimentStatus::Draft)
    }
}

/// Whether an entry is the experiment's sole original record, or a later
/// addendum that supersedes a prior entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Original,
    Addendum,
}

/// An immutable addition to an experiment. Entries are never updated or
/// deleted once committed; the schema should deny those privileges outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub experiment_id: ExperimentId,
    pub author_user_id: UserId,
    pub entry_type: EntryType,
    /// `None` for the original entry; for an addendum, the entry it
    /// supersedes as the new effective entry.
    pub supersedes_entry_id: Option<EntryId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Entry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entry {
    /// Given the full ordered history of an experiment's entries (createdAt
    /// asc, then id asc, matching `GetHistory`'s order), return the
    /// effective entry: the last entry in that order.
    ///
    /// Panics if `history` is empty — a persisted experiment always has
    /// exactly one original entry, so an empty history indicates a storage
    /// bug, not a reachable domain state.
    pub fn effective<'a>(history: &'a [Entry]) -> &'a Entry {
        history
            .last()
            .expect("experiment history must contain at least the original entry")
    }
}

/// Durable record of an addendum rejected because its `supersedesEntryId`
/// did not match the experiment's effective entry at commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictArtifact {
    pub id: ConflictArtifactId,
    pub experiment_id: ExperimentId,
    /// The entry the client believed was still effective.
    pub client_base_entry_id: EntryId,
    /// The entry the server found effective at rejection time.
    pub server_latest_entry_id: EntryId,
    /// `{body, deviceId}` captured from the rejected attempt, so a human can
    /// reconcile intent later.
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Entity for ConflictArtifact {
    type Id = ConflictArtifactId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: EntryId, entry_type: EntryType, supersedes: Option<EntryId>) -> Entry {
        Entry {
            id,
            experiment_id: ExperimentId::new(),
            author_user_id: UserId::new(),
            entry_type,
            supersedes_entry_id: supersedes,
            body: "body".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn effective_is_the_last_entry_in_history_order() {
        let original = entry(EntryId::new(), EntryType::Original, None);
        let addendum = entry(EntryId::new(), EntryType::Addendum, Some(original.id));
        let history = vec![original.clone(), addendum.clone()];
        assert_eq!(Entry::effective(&history).id, addendum.id);
    }

    #[test]
    fn effective_of_a_fresh_experiment_is_the_original() {
        let original = entry(EntryId::new(), EntryType::Original, None);
        let history = vec![original.clone()];
        assert_eq!(Entry::effective(&history).id, original.id);
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(Experiment::validate_title("   ").is_err());
    }

    #[test]
    fn title_is_trimmed() {
        assert_eq!(Experiment::validate_title("  Gel A  ").unwrap(), "Gel A");
    }
}
