//! Persisted request ledger.
//!
//! A dedicated worker thread owns the SQLite connection; async callers
//! submit closures over a channel and await the reply on a oneshot. All
//! mutations are single-row and keyed by `request_id`, so row-level
//! atomicity is sufficient - no cross-row transactions are needed.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;
use tracing::{error, info};

mod migrations;

use crate::error::PipelineError;
use crate::models::{AnalysisRequest, RequestStatus};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn row_to_request(row: &Row) -> Result<AnalysisRequest> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(AnalysisRequest {
        request_id: row.get("request_id")?,
        user_id: row.get("user_id")?,
        file_key: row.get("file_key")?,
        status: status.parse::<RequestStatus>().map_err(|e| anyhow!(e))?,
        created_at: parse_datetime(&created_at)?,
        completed_at: completed_at.map(|s| parse_datetime(&s)).transpose()?,
        error_message: row.get("error_message")?,
    })
}

/// Handle to the request ledger. Cheap to clone; all clones share the
/// same worker thread.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    /// Open (or create) the database at `db_path`, run migrations, and
    /// spawn the worker thread.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("boardroom-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Request ledger initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Insert a new request row. A duplicate `request_id` is a
    /// `Conflict`; any other storage failure is surfaced as-is.
    pub async fn create(&self, request: &AnalysisRequest) -> Result<(), PipelineError> {
        let record = request.clone();
        let request_id = record.request_id.clone();

        let inserted = self
            .execute(move |conn| {
                let result = conn.execute(
                    "INSERT INTO analysis_requests
                     (request_id, user_id, file_key, status, created_at, completed_at, error_message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.request_id,
                        record.user_id,
                        record.file_key,
                        record.status.as_str(),
                        record.created_at.to_rfc3339(),
                        record.completed_at.as_ref().map(|dt| dt.to_rfc3339()),
                        record.error_message,
                    ],
                );

                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(anyhow::Error::new(e).context("failed to insert request")),
                }
            })
            .await?;

        if inserted {
            Ok(())
        } else {
            Err(PipelineError::Conflict(request_id))
        }
    }

    /// Look up a request by id. Absence is not an error.
    pub async fn find_by_id(
        &self,
        request_id: &str,
    ) -> Result<Option<AnalysisRequest>, PipelineError> {
        let request_id = request_id.to_string();
        let found = self
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT request_id, user_id, file_key, status, created_at, completed_at, error_message
                     FROM analysis_requests
                     WHERE request_id = ?1",
                )?;

                let mut rows = stmt.query(params![request_id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_request(row)?)),
                    None => Ok(None),
                }
            })
            .await?;

        Ok(found)
    }

    /// Transition a request to `status`.
    ///
    /// One operation regardless of whether an error message is supplied:
    /// the generated statement includes the error column only when it is,
    /// so an unset field is never clobbered with NULL. The
    /// status/completed_at/error_message invariant is validated before
    /// any SQL runs.
    pub async fn update_status(
        &self,
        request_id: &str,
        status: RequestStatus,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> Result<(), PipelineError> {
        if status.is_terminal() != completed_at.is_some() {
            return Err(PipelineError::Validation(format!(
                "completed_at must be set exactly for terminal states (status={status})"
            )));
        }
        if error_message.is_some() && status != RequestStatus::Failed {
            return Err(PipelineError::Validation(format!(
                "error_message is only valid for failed requests (status={status})"
            )));
        }

        let request_id = request_id.to_string();
        let id_for_error = request_id.clone();

        let rows_affected = self
            .execute(move |conn| {
                let mut sql = String::from(
                    "UPDATE analysis_requests SET status = ?1, completed_at = ?2",
                );
                if error_message.is_some() {
                    sql.push_str(", error_message = ?4");
                }
                sql.push_str(" WHERE request_id = ?3");

                let completed = completed_at.map(|dt| dt.to_rfc3339());
                let affected = match &error_message {
                    Some(message) => conn.execute(
                        &sql,
                        params![status.as_str(), completed, request_id, message],
                    )?,
                    None => conn.execute(&sql, params![status.as_str(), completed, request_id])?,
                };

                Ok(affected)
            })
            .await?;

        if rows_affected == 0 {
            return Err(PipelineError::NotFound(id_for_error));
        }

        Ok(())
    }

    /// Count a user's requests created at or after `window_start`.
    /// Backs the admission controller's sliding window.
    pub async fn count_since(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<u32, PipelineError> {
        let user_id = user_id.to_string();
        let count = self
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM analysis_requests
                     WHERE user_id = ?1 AND created_at >= ?2",
                    params![user_id, window_start.to_rfc3339()],
                    |row| row.get(0),
                )?;
                Ok(count as u32)
            })
            .await?;

        Ok(count)
    }

    /// The oldest in-window `created_at` for a user, if any. Used to
    /// compute when a rejected user's window resets.
    pub async fn oldest_since(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, PipelineError> {
        let user_id = user_id.to_string();
        let oldest = self
            .execute(move |conn| {
                let oldest: Option<String> = conn.query_row(
                    "SELECT MIN(created_at) FROM analysis_requests
                     WHERE user_id = ?1 AND created_at >= ?2",
                    params![user_id, window_start.to_rfc3339()],
                    |row| row.get(0),
                )?;
                oldest.map(|s| parse_datetime(&s)).transpose()
            })
            .await?;

        Ok(oldest)
    }
}
