//! Mapping from storage-layer failures to the domain's tagged error kinds.

use eln_core::DomainError;

/// Map a SQLx error to a `DomainError`, preserving the one distinction the
/// core cares about: a unique-constraint violation on an idempotency/rotation
/// key is a `Conflict`, everything else is `Internal`.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return DomainError::conflict(format!("unique constraint violated in {operation}"));
        }
    }
    DomainError::internal(format!("storage error in {operation}: {err}"))
}
