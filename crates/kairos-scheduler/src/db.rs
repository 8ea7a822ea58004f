use rusqlite::Connection;

use crate::error::StoreError;

/// Initialise the store schema in `conn`.
///
/// Jobs are kept as JSON documents keyed by name. Executions are one row per
/// member attempt; the `(job_name, grp)` index keeps the latest-group lookup
/// cheap for jobs with long histories.
pub fn init_db(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            name        TEXT    NOT NULL PRIMARY KEY,
            body        TEXT    NOT NULL,   -- JSON-encoded Job
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS executions (
            id           TEXT    NOT NULL PRIMARY KEY,
            job_name     TEXT    NOT NULL,
            grp          INTEGER NOT NULL,
            started_at   TEXT,               -- ISO-8601 or NULL
            finished_at  TEXT,               -- NULL while still running
            success      INTEGER NOT NULL DEFAULT 0,
            output       TEXT    NOT NULL DEFAULT '',
            node_name    TEXT    NOT NULL DEFAULT '',
            attempt      INTEGER NOT NULL DEFAULT 1
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_executions_job_grp ON executions (job_name, grp);
        ",
    )?;
    Ok(())
}
