//! Pure authorization policy: the gate rules consumed by every write-path
//! and read-path in the core. No IO, no storage lookups beyond the facts
//! the caller already has in hand (owner id, experiment status, viewer
//! grants) — those are resolved by `eln-infra` before calling in here.

use eln_core::experiment::ExperimentStatus;
use eln_core::id::UserId;
use eln_core::user::Role;
use thiserror::Error;

use crate::principal::Principal;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden")]
    Forbidden,
}

/// An operation to be gated, bundled with the facts the rule needs.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// `CreateExperiment`, `AddAddendum`, `MarkCompleted`, attachment
    /// initiate/complete, `Sign` — anything that mutates an experiment or
    /// its children.
    WriteExperiment { owner_user_id: UserId },

    /// `GetEffectiveView`, `GetHistory`, attachment download.
    ReadExperiment {
        owner_user_id: UserId,
        status: ExperimentStatus,
        /// Explicit viewer grants for this experiment, resolved by the
        /// caller (the `experiment_viewer_grants` join).
        viewer_grant_user_ids: &'a [UserId],
    },

    /// `Reconcile`, `VerifyAuditHashChain`, forensic export.
    RunOps,
}

/// Apply the gate rules from the access-control design:
/// - Write → role=owner AND user=ownerUserId.
/// - Read draft → user=ownerUserId or role=admin.
/// - Read completed → owner-of, admin, or viewer-of (explicit grant only).
/// - Ops → role=admin.
pub fn authorize(principal: &Principal, action: Action<'_>) -> Result<(), AuthzError> {
    match action {
        Action::WriteExperiment { owner_user_id } => {
            if principal.role == Role::Owner && principal.user_id == owner_user_id {
                Ok(())
            } else {
                Err(AuthzError::Forbidden)
            }
        }
        Action::ReadExperiment {
            owner_user_id,
            status,
            viewer_grant_user_ids,
        } => {
            if principal.user_id == owner_user_id {
                return Ok(());
            }
            match status {
                ExperimentStatus::Draft => {
                    if principal.role == Role::Admin {
                        Ok(())
                    } else {
                        Err(AuthzError::Forbidden)
                    }
                }
                ExperimentStatus::Completed => {
                    if principal.role == Role::Admin
                        || (principal.role == Role::Viewer
                            && viewer_grant_user_ids.contains(&principal.user_id))
                    {
                        Ok(())
                    } else {
                        Err(AuthzError::Forbidden)
                    }
                }
            }
        }
        Action::RunOps => {
            if principal.role == Role::Admin {
                Ok(())
            } else {
                Err(AuthzError::Forbidden)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eln_core::id::DeviceId;

    fn principal(user_id: UserId, role: Role) -> Principal {
        Principal {
            user_id,
            role,
            device_id: DeviceId::new("device-1"),
        }
    }

    #[test]
    fn owner_can_write_their_own_experiment() {
        let owner = UserId::new();
        let p = principal(owner, Role::Owner);
        assert!(authorize(&p, Action::WriteExperiment { owner_user_id: owner }).is_ok());
    }

    #[test]
    fn admin_cannot_write_someone_elses_experiment() {
        let owner = UserId::new();
        let p = principal(UserId::new(), Role::Admin);
        assert_eq!(
            authorize(&p, Action::WriteExperiment { owner_user_id: owner }),
            Err(AuthzError::Forbidden)
        );
    }

    #[test]
    fn owner_role_on_someone_elses_experiment_cannot_write() {
        let owner = UserId::new();
        let p = principal(UserId::new(), Role::Owner);
        assert_eq!(
            authorize(&p, Action::WriteExperiment { owner_user_id: owner }),
            Err(AuthzError::Forbidden)
        );
    }

    #[test]
    fn admin_can_read_draft_experiment() {
        let owner = UserId::new();
        let p = principal(UserId::new(), Role::Admin);
        assert!(authorize(
            &p,
            Action::ReadExperiment {
                owner_user_id: owner,
                status: ExperimentStatus::Draft,
                viewer_grant_user_ids: &[],
            }
        )
        .is_ok());
    }

    #[test]
    fn viewer_cannot_read_draft_experiment_even_with_a_grant() {
        let owner = UserId::new();
        let viewer = UserId::new();
        let p = principal(viewer, Role::Viewer);
        assert_eq!(
            authorize(
                &p,
                Action::ReadExperiment {
                    owner_user_id: owner,
                    status: ExperimentStatus::Draft,
                    viewer_grant_user_ids: &[viewer],
                }
            ),
            Err(AuthzError::Forbidden)
        );
    }

    #[test]
    fn viewer_with_explicit_grant_can_read_completed_experiment() {
        let owner = UserId::new();
        let viewer = UserId::new();
        let p = principal(viewer, Role::Viewer);
        assert!(authorize(
            &p,
            Action::ReadExperiment {
                owner_user_id: owner,
                status: ExperimentStatus::Completed,
                viewer_grant_user_ids: &[viewer],
            }
        )
        .is_ok());
    }

    #[test]
    fn viewer_without_a_grant_cannot_read_completed_experiment() {
        let owner = UserId::new();
        let p = principal(UserId::new(), Role::Viewer);
        assert_eq!(
            authorize(
                &p,
                Action::ReadExperiment {
                    owner_user_id: owner,
                    status: ExperimentStatus::Completed,
                    viewer_grant_user_ids: &[],
                }
            ),
            Err(AuthzError::Forbidden)
        );
    }

    #[test]
    fn only_admin_can_run_ops() {
        let owner_role_principal = principal(UserId::new(), Role::Owner);
        assert_eq!(
            authorize(&owner_role_principal, Action::RunOps),
            Err(AuthzError::Forbidden)
        );
        let admin_principal = principal(UserId::new(), Role::Admin);
        assert!(authorize(&admin_principal, Action::RunOps).is_ok());
    }
}
