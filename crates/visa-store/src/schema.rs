//! SQL schema for the visa application store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per application. `document` holds the whole aggregate as
-- canonical JSON; the other columns are denormalised for filtering.
-- Every write bumps `version` and is conditional on the version read.
CREATE TABLE IF NOT EXISTS applications (
    application_id   TEXT PRIMARY KEY,
    version          INTEGER NOT NULL,
    current_status   TEXT NOT NULL,
    applicant_id     TEXT NOT NULL,
    assigned_handler TEXT,
    document         TEXT NOT NULL,
    created_at       TEXT NOT NULL,   -- ISO 8601 UTC
    updated_at       TEXT NOT NULL    -- ISO 8601 UTC
);

CREATE INDEX IF NOT EXISTS applications_status_idx    ON applications(current_status);
CREATE INDEX IF NOT EXISTS applications_applicant_idx ON applications(applicant_id);
CREATE INDEX IF NOT EXISTS applications_handler_idx   ON applications(assigned_handler);

PRAGMA user_version = 1;
";
