//! E-signature binding: a password-reauthenticated user's attestation over a
//! snapshot hash of an experiment's entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::canonical::content_hash;
use crate::entity::Entity;
use crate::experiment::{Entry, Experiment};
use crate::id::{SignatureId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,
    pub experiment_id: crate::id::ExperimentId,
    pub signer_user_id: UserId,
    pub signature_type: String,
    pub meaning: String,
    pub content_hash: [u8; 32],
    pub signed_at: DateTime<Utc>,
}

impl Entity for Signature {
    type Id = SignatureId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Compute the content hash a signature binds to: canonical JSON of the
/// experiment's identity, status, and full ordered entry history.
///
/// `history` must be ordered exactly as `GetHistory` returns it (createdAt
/// asc, then id asc) — the hash is sensitive to entry order, not just
/// membership.
pub fn compute_content_hash(experiment: &Experiment, history: &[Entry]) -> [u8; 32] {
    let entries: Vec<_> = history
        .iter()
        .map(|e| {
            json!({
                "id": e.id.to_string(),
                "entryType": e.entry_type,
                "supersedesEntryId": e.supersedes_entry_id.map(|id| id.to_string()),
                "body": e.body,
                "createdAt": e.created_at.to_rfc3339(),
                "authorUserId": e.author_user_id.to_string(),
            })
        })
        .collect();
    let snapshot = json!({
        "experimentId": experiment.id.to_string(),
        "title": experiment.title,
        "status": experiment.status,
        "entries": entries,
    });
    content_hash(&snapshot)
}

/// Outcome of re-verifying one signature against the experiment's current
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureVerification {
    pub signature_id: SignatureId,
    pub valid: bool,
    pub computed_hash: [u8; 32],
    pub stored_hash: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{EntryType, ExperimentStatus};
    use crate::id::{EntryId, ExperimentId};

    fn fixture() -> (Experiment, Vec<Entry>) {
        let experiment_id = ExperimentId::new();
        let owner = UserId::new();
        let experiment = Experiment {
            id: experiment_id,
            owner_user_id: owner,
            title: "Gel A".to_string(),
            status: ExperimentStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let original = Entry {
            id: EntryId::new(),
            experiment_id,
            author_user_id: owner,
            entry_type: EntryType::Original,
            supersedes_entry_id: None,
            body: "setup".to_string(),
            created_at: Utc::now(),
        };
        (experiment, vec![original])
    }

    #[test]
    fn unchanged_history_reproduces_the_same_hash() {
        let (experiment, history) = fixture();
        let a = compute_content_hash(&experiment, &history);
        let b = compute_content_hash(&experiment, &history);
        assert_eq!(a, b);
    }

    #[test]
    fn appending_an_entry_changes_the_hash() {
        let (experiment, mut history) = fixture();
        let before = compute_content_hash(&experiment, &history);
        history.push(Entry {
            id: EntryId::new(),
            experiment_id: experiment.id,
            author_user_id: experiment.owner_user_id,
            entry_type: EntryType::Addendum,
            supersedes_entry_id: Some(history[0].id),
            body: "ran lane 3".to_string(),
            created_at: Utc::now(),
        });
        let after = compute_content_hash(&experiment, &history);
        assert_ne!(before, after);
    }
}
