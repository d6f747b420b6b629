//! Connection pool and schema.
//!
//! The schema enforces the append-only invariants the core relies on at the
//! database level rather than by application discipline alone: `audit_log`,
//! `experiment_entries`, `sync_events`, and `signatures` have UPDATE/DELETE
//! revoked from `CURRENT_USER` (the role `migrate()` connects as) and from
//! `PUBLIC` as part of the same migration. Note this does not bind a role
//! that owns these tables, since table ownership always implies full
//! privileges in Postgres regardless of REVOKE; deployments that need the
//! revoke to hold against the migrating role itself should have that role
//! create the tables and then connect as a separate, non-owning role for
//! everything else.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::map_sqlx_error;
use eln_core::DomainError;

pub async fn connect(database_url: &str) -> Result<PgPool, DomainError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// DDL for a fresh database. Run once at bootstrap (or via an external
/// migration tool in production); idempotent via `IF NOT EXISTS`.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS experiments (
    id UUID PRIMARY KEY,
    owner_user_id UUID NOT NULL REFERENCES users(id),
    title TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS experiment_entries (
    id UUID PRIMARY KEY,
    experiment_id UUID NOT NULL REFERENCES experiments(id),
    author_user_id UUID NOT NULL REFERENCES users(id),
    entry_type TEXT NOT NULL,
    supersedes_entry_id UUID REFERENCES experiment_entries(id),
    body TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS conflict_artifacts (
    id UUID PRIMARY KEY,
    experiment_id UUID NOT NULL REFERENCES experiments(id),
    client_base_entry_id UUID NOT NULL,
    server_latest_entry_id UUID NOT NULL,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    sequence BIGINT PRIMARY KEY,
    actor_user_id UUID NOT NULL,
    event_type TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    payload JSONB NOT NULL,
    prev_hash BYTEA NOT NULL,
    this_hash BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_owner_cursors (
    owner_user_id UUID PRIMARY KEY,
    last_sequence BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_events (
    owner_user_id UUID NOT NULL,
    sequence BIGINT NOT NULL,
    actor_user_id UUID NOT NULL,
    device_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (owner_user_id, sequence)
);

CREATE TABLE IF NOT EXISTS attachments (
    id UUID PRIMARY KEY,
    experiment_id UUID NOT NULL REFERENCES experiments(id),
    object_key TEXT NOT NULL UNIQUE,
    size_bytes BIGINT NOT NULL,
    mime_type TEXT NOT NULL,
    status TEXT NOT NULL,
    checksum TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS signatures (
    id UUID PRIMARY KEY,
    experiment_id UUID NOT NULL REFERENCES experiments(id),
    signer_user_id UUID NOT NULL REFERENCES users(id),
    signature_type TEXT NOT NULL,
    meaning TEXT NOT NULL,
    content_hash BYTEA NOT NULL,
    signed_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id),
    device_id TEXT NOT NULL,
    token_hash TEXT NOT NULL UNIQUE,
    issued_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    used_at TIMESTAMPTZ,
    replaced_by_token_id UUID REFERENCES refresh_tokens(id)
);

CREATE TABLE IF NOT EXISTS experiment_viewer_grants (
    experiment_id UUID NOT NULL REFERENCES experiments(id),
    user_id UUID NOT NULL REFERENCES users(id),
    PRIMARY KEY (experiment_id, user_id)
);

CREATE TABLE IF NOT EXISTS reconcile_findings (
    id UUID PRIMARY KEY,
    run_id TEXT NOT NULL,
    object_key_or_attachment_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    detail JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    UNIQUE (kind, object_key_or_attachment_id)
);

REVOKE UPDATE, DELETE ON audit_log, experiment_entries, sync_events, signatures FROM CURRENT_USER;
REVOKE UPDATE, DELETE ON audit_log, experiment_entries, sync_events, signatures FROM PUBLIC;
"#;

pub async fn migrate(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    Ok(())
}

/// Advisory lock key serializing audit-log appends. A fixed, arbitrary
/// 64-bit constant shared by every process talking to the same database.
pub const AUDIT_LOCK_KEY: i64 = 0x454c4e5f4c4f4731; // "ELN_LOG1" in ASCII, reinterpreted as i64
