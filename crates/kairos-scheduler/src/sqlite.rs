use std::{path::Path, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_core::KairosConfig;
use rusqlite::{types::Type, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{JobError, StoreError},
    store::{ExecutionStore, JobStore},
    types::{Execution, Job},
};

/// SQLite-backed job store and execution history.
///
/// Wraps a single connection in a `Mutex`, which is plenty for one member
/// or for tests; a networked backend implements the same traits.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self, StoreError> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::new(Connection::open(path)?)
    }

    /// Open the database file named by `database.path`, creating its directory.
    pub fn from_config(config: &KairosConfig) -> Result<Self, StoreError> {
        let path = Path::new(&config.database.path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Self::new(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Validate and upsert a job definition.
    ///
    /// Validation failures are returned before anything is written.
    #[instrument(skip(self, job), fields(job = %job.name))]
    pub fn put_job(&self, job: &Job) -> Result<(), JobError> {
        job.validate()?;
        let body = serde_json::to_string(job).map_err(StoreError::from)?;
        let now = Utc::now().to_rfc3339();

        let db = self.db.lock().expect("job store poisoned");
        db.execute(
            "INSERT INTO jobs (name, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            rusqlite::params![job.name, body, now],
        )
        .map_err(StoreError::from)?;
        info!("job stored");
        Ok(())
    }

    pub fn find_job(&self, name: &str) -> Result<Job, StoreError> {
        let db = self.db.lock().expect("job store poisoned");
        let body: Option<String> = db
            .query_row("SELECT body FROM jobs WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Err(StoreError::NotFound { key: name.to_string() }),
        }
    }

    pub fn delete_job(&self, name: &str) -> Result<(), StoreError> {
        let db = self.db.lock().expect("job store poisoned");
        let n = db.execute("DELETE FROM jobs WHERE name = ?1", [name])?;
        if n == 0 {
            return Err(StoreError::NotFound { key: name.to_string() });
        }
        info!(job = %name, "job deleted");
        Ok(())
    }

    /// All stored jobs ordered by name. Rows that no longer decode are skipped.
    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let db = self.db.lock().expect("job store poisoned");
        let mut stmt = db.prepare("SELECT body FROM jobs ORDER BY name")?;
        let jobs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| serde_json::from_str(&r.ok()?).ok())
            .collect();
        Ok(jobs)
    }

    /// Insert or replace one member's execution record.
    pub fn record_execution(&self, ex: &Execution) -> Result<(), StoreError> {
        let db = self.db.lock().expect("job store poisoned");
        db.execute(
            "INSERT OR REPLACE INTO executions
             (id, job_name, grp, started_at, finished_at, success, output, node_name, attempt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                ex.id.to_string(),
                ex.job_name,
                ex.group,
                ex.started_at.map(|t| t.to_rfc3339()),
                ex.finished_at.map(|t| t.to_rfc3339()),
                ex.success,
                ex.output,
                ex.node_name,
                ex.attempt,
            ],
        )?;
        debug!(job = %ex.job_name, group = ex.group, "execution recorded");
        Ok(())
    }

    fn latest_group(&self, job_name: &str) -> Result<Vec<Execution>, StoreError> {
        let db = self.db.lock().expect("job store poisoned");
        let mut stmt = db.prepare_cached(
            "SELECT id, job_name, grp, started_at, finished_at, success, output, node_name, attempt
             FROM executions
             WHERE job_name = ?1
               AND grp = (SELECT MAX(grp) FROM executions WHERE job_name = ?1)
             ORDER BY node_name",
        )?;
        let rows = stmt
            .query_map([job_name], row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn get_job(&self, name: &str) -> Result<Job, StoreError> {
        self.find_job(name)
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn last_execution_group(&self, job_name: &str) -> Result<Vec<Execution>, StoreError> {
        self.latest_group(job_name)
    }
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<Execution> {
    let id: String = row.get(0)?;
    Ok(Execution {
        id: Uuid::parse_str(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        job_name: row.get(1)?,
        group: row.get(2)?,
        started_at: parse_ts(row, 3)?,
        finished_at: parse_ts(row, 4)?,
        success: row.get(5)?,
        output: row.get(6)?,
        node_name: row.get(7)?,
        attempt: row.get(8)?,
    })
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}
