//! Job store on SQLite.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::debug;

use super::{JobStore, LeaseClaim, lease_expiry};
use crate::error::StoreError;
use crate::state_machine::{Job, JobState, JobUpdate, NewJob};

const JOB_COLUMNS: &str = "seq, id, source_reference, title, description_seed, state, \
     local_artifact, published_at, last_error, created_at, updated_at";

/// Durable store backed by a single SQLite file.
///
/// `seq` is an AUTOINCREMENT key, so creation order is stable and ids are
/// never reused even after rows are removed by hand. Compare-and-set runs in
/// an IMMEDIATE transaction, which also serializes writers in other processes.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened job store");
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                source_reference TEXT NOT NULL,
                title TEXT,
                description_seed TEXT,
                state TEXT NOT NULL DEFAULT 'pending',
                local_artifact TEXT,
                published_at INTEGER,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_state_seq ON jobs(state, seq);
            CREATE INDEX IF NOT EXISTS idx_jobs_published ON jobs(state, published_at);
            CREATE TABLE IF NOT EXISTS queue_lease (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                owner TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
        "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection off the async runtime.
    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

/// Raw column values; converted after the row borrow ends.
struct JobRow {
    seq: i64,
    id: String,
    source_reference: String,
    title: Option<String>,
    description_seed: Option<String>,
    state: String,
    local_artifact: Option<String>,
    published_at: Option<i64>,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            source_reference: row.get(2)?,
            title: row.get(3)?,
            description_seed: row.get(4)?,
            state: row.get(5)?,
            local_artifact: row.get(6)?,
            published_at: row.get(7)?,
            last_error: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_job(self) -> Result<Job, StoreError> {
        let state = self
            .state
            .parse::<JobState>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Job {
            id: self.id,
            seq: self.seq,
            source_reference: self.source_reference,
            title: self.title,
            description_seed: self.description_seed,
            state,
            local_artifact: self.local_artifact.map(PathBuf::from),
            published_at: self.published_at.map(from_millis).transpose()?,
            last_error: self.last_error,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

fn query_jobs(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Job>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, JobRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(JobRow::into_job).collect()
}

fn query_job(conn: &Connection, id: &str) -> Result<Option<Job>, StoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
    conn.query_row(&sql, params![id], JobRow::from_row)
        .optional()?
        .map(JobRow::into_job)
        .transpose()
}

impl JobStore for SqliteJobStore {
    async fn insert(&self, new: NewJob) -> Result<Job, StoreError> {
        self.call(move |conn| {
            // seq is assigned by SQLite; the placeholder is replaced below.
            let mut job = Job::from_new(new, 0);
            conn.execute(
                "INSERT INTO jobs (id, source_reference, title, description_seed, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job.id,
                    job.source_reference,
                    job.title,
                    job.description_seed,
                    job.state.as_str(),
                    to_millis(job.created_at),
                    to_millis(job.updated_at),
                ],
            )?;
            job.seq = conn.last_insert_rowid();
            debug!(job_id = %job.id, seq = job.seq, "Inserted job");
            Ok(job)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let id = id.to_string();
        self.call(move |conn| query_job(conn, &id)).await
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        self.call(|conn| {
            let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY seq");
            query_jobs(conn, &sql, [])
        })
        .await
    }

    async fn find_eligible_for_acquired_or_pending(&self) -> Result<Option<Job>, StoreError> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE state IN ('acquired', 'pending')
                 ORDER BY CASE state WHEN 'acquired' THEN 0 ELSE 1 END, seq
                 LIMIT 1"
            );
            Ok(query_jobs(conn, &sql, [])?.into_iter().next())
        })
        .await
    }

    async fn count_published_since(&self, since: DateTime<Utc>) -> Result<u32, StoreError> {
        self.call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE state = 'published' AND published_at >= ?1",
                params![to_millis(since)],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
        .await
    }

    async fn compare_and_set_state(
        &self,
        id: &str,
        expected: JobState,
        update: JobUpdate,
    ) -> Result<Job, StoreError> {
        let id = id.to_string();
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut job = query_job(&tx, &id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
            if job.state != expected {
                return Err(StoreError::PreconditionConflict {
                    id,
                    expected,
                    actual: job.state,
                });
            }

            update.apply_to(&mut job, Utc::now());
            let changed = tx.execute(
                "UPDATE jobs
                 SET state = ?1, local_artifact = ?2, published_at = ?3, last_error = ?4, updated_at = ?5
                 WHERE id = ?6 AND state = ?7",
                params![
                    job.state.as_str(),
                    job.local_artifact
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned()),
                    job.published_at.map(to_millis),
                    job.last_error,
                    to_millis(job.updated_at),
                    job.id,
                    expected.as_str(),
                ],
            )?;
            if changed != 1 {
                return Err(StoreError::Corrupt(format!(
                    "compare-and-set on {} touched {changed} rows",
                    job.id
                )));
            }
            tx.commit()?;
            Ok(job)
        })
        .await
    }

    async fn find_published_with_artifact(&self) -> Result<Vec<Job>, StoreError> {
        self.call(|conn| {
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE state = 'published' AND local_artifact IS NOT NULL
                 ORDER BY seq"
            );
            query_jobs(conn, &sql, [])
        })
        .await
    }

    async fn claim_lease(&self, owner: &str, ttl: Duration) -> Result<LeaseClaim, StoreError> {
        let owner = owner.to_string();
        self.call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = Utc::now();
            let current: Option<(String, i64)> = tx
                .query_row(
                    "SELECT owner, expires_at FROM queue_lease WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((holder, expires_at)) = current
                && holder != owner
                && expires_at > to_millis(now)
            {
                return Ok(LeaseClaim::Held {
                    owner: holder,
                    expires_at: from_millis(expires_at)?,
                });
            }

            tx.execute(
                "INSERT INTO queue_lease (id, owner, expires_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at",
                params![owner, to_millis(lease_expiry(now, ttl))],
            )?;
            tx.commit()?;
            Ok(LeaseClaim::Granted)
        })
        .await
    }

    async fn release_lease(&self, owner: &str) -> Result<(), StoreError> {
        let owner = owner.to_string();
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM queue_lease WHERE id = 1 AND owner = ?1",
                params![owner],
            )?;
            Ok(())
        })
        .await
    }
}
