//! Durable task store (§4.3): a single embedded SQLite database holding the
//! `tasks` and `task_results` tables, guarded by a single-writer mutex so
//! status transitions are atomic without needing a distributed lock.

use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{ResearchError, Result};
use crate::models::{Depth, ResultRecord, SourceSummary, TaskRecord, TaskStatus};

pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                user_id TEXT,
                depth TEXT NOT NULL DEFAULT 'standard',
                status TEXT NOT NULL DEFAULT 'queued',
                current_agent TEXT,
                progress INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS task_results (
                task_id TEXT PRIMARY KEY REFERENCES tasks(task_id),
                report TEXT NOT NULL,
                sources TEXT NOT NULL,
                confidence_score REAL NOT NULL DEFAULT 0.0,
                needs_hitl INTEGER NOT NULL DEFAULT 0,
                blob_url TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// `create(query, user_id?, depth) -> task_id` (§4.3).
    pub fn create(&self, query: &str, user_id: Option<&str>, depth: Depth) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tasks (task_id, query, user_id, depth, status, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?5)",
            params![task_id, query, user_id, depth.to_string(), now.to_rfc3339()],
        )?;
        Ok(task_id)
    }

    pub fn get_status(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT task_id, query, user_id, depth, status, current_agent, progress,
                        error_message, created_at, updated_at
                 FROM tasks WHERE task_id = ?1",
                params![task_id],
                row_to_task_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_result(&self, task_id: &str) -> Result<Option<(TaskRecord, ResultRecord)>> {
        let task = match self.get_status(task_id)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT task_id, report, sources, confidence_score, needs_hitl, blob_url,
                        metadata, created_at
                 FROM task_results WHERE task_id = ?1",
                params![task_id],
                row_to_result_record,
            )
            .optional()?;
        Ok(result.map(|r| (task, r)))
    }

    /// `update(task_id, status?, current_agent?, progress?, error?)` (§4.3).
    /// Validates the transition against the state machine before writing.
    pub fn update(
        &self,
        task_id: &str,
        status: Option<TaskStatus>,
        current_agent: Option<&str>,
        progress: Option<u8>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if let Some(next) = status {
            let current: String = conn.query_row(
                "SELECT status FROM tasks WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;
            let current = TaskStatus::from_str(&current)?;
            if !current.can_transition_to(next) {
                return Err(ResearchError::Conflict(format!(
                    "illegal status transition {current} -> {next}"
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET
                status = COALESCE(?2, status),
                current_agent = COALESCE(?3, current_agent),
                progress = COALESCE(?4, progress),
                error_message = COALESCE(?5, error_message),
                updated_at = ?6
             WHERE task_id = ?1",
            params![
                task_id,
                status.map(|s| s.to_string()),
                current_agent,
                progress.map(|p| p as i64),
                error_message,
                now,
            ],
        )?;
        Ok(())
    }

    /// `store_result(...)`: writes the ResultRecord and the terminal status
    /// transition in one critical section (§4.3).
    pub fn store_result(
        &self,
        task_id: &str,
        report: &str,
        sources: &[SourceSummary],
        confidence: f64,
        needs_hitl: bool,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let terminal = if needs_hitl {
            TaskStatus::PendingReview
        } else {
            TaskStatus::Completed
        };

        let conn = self.conn.lock().unwrap();
        let current: String = conn.query_row(
            "SELECT status FROM tasks WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        let current = TaskStatus::from_str(&current)?;
        if !current.can_transition_to(terminal) {
            return Err(ResearchError::Conflict(format!(
                "illegal status transition {current} -> {terminal}"
            )));
        }

        let now = Utc::now();
        let sources_json = serde_json::to_string(sources)?;
        let metadata_json = serde_json::to_string(&metadata)?;

        conn.execute(
            "INSERT OR REPLACE INTO task_results
                (task_id, report, sources, confidence_score, needs_hitl, blob_url, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)",
            params![
                task_id,
                report,
                sources_json,
                confidence,
                needs_hitl as i64,
                metadata_json,
                now.to_rfc3339(),
            ],
        )?;
        conn.execute(
            "UPDATE tasks SET status = ?2, progress = 100, updated_at = ?3 WHERE task_id = ?1",
            params![task_id, terminal.to_string(), now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// `mark_failed(task_id, error)` (§4.3).
    pub fn mark_failed(&self, task_id: &str, error: &str) -> Result<()> {
        self.update(task_id, Some(TaskStatus::Failed), None, None, Some(error))
    }

    /// `approve(task_id)`. Idempotent: approving an already-approved task is
    /// a no-op (§8 round-trip property).
    pub fn approve(&self, task_id: &str) -> Result<()> {
        let current = self
            .get_status(task_id)?
            .ok_or_else(|| ResearchError::NotFound(format!("task {task_id} not found")))?
            .status;
        if current == TaskStatus::Approved {
            return Ok(());
        }
        self.update(task_id, Some(TaskStatus::Approved), None, Some(100), None)
    }

    /// `edit(task_id, new_report)`: replaces the report text and approves.
    pub fn edit(&self, task_id: &str, new_report: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current: String = conn.query_row(
            "SELECT status FROM tasks WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        let current = TaskStatus::from_str(&current)?;
        if !current.can_transition_to(TaskStatus::Approved) {
            return Err(ResearchError::Conflict(format!(
                "task is not pending review (status: {current})"
            )));
        }
        conn.execute(
            "UPDATE task_results SET report = ?2 WHERE task_id = ?1",
            params![task_id, new_report],
        )?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET status = 'approved', updated_at = ?2 WHERE task_id = ?1",
            params![task_id, now],
        )?;
        Ok(())
    }

    /// `reject(task_id, reason) -> original_query`: returns the task back to
    /// *processing* for a bounded regeneration, or fails the task once
    /// `MAX_REGEN` is exceeded. Regeneration counting lives in the executor,
    /// which calls this after checking the bound.
    pub fn reject_for_regeneration(&self, task_id: &str) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let (current, query): (String, String) = conn.query_row(
            "SELECT status, query FROM tasks WHERE task_id = ?1",
            params![task_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let current = TaskStatus::from_str(&current)?;
        if !current.can_transition_to(TaskStatus::Processing) {
            return Err(ResearchError::Conflict(format!(
                "task is not pending review (status: {current})"
            )));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET status = 'processing', progress = 0, current_agent = 'search',
                error_message = NULL, updated_at = ?2 WHERE task_id = ?1",
            params![task_id, now],
        )?;
        Ok(query)
    }

    pub fn list(
        &self,
        status: Option<TaskStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = if status.is_some() {
            conn.prepare(
                "SELECT task_id, query, user_id, depth, status, current_agent, progress,
                        error_message, created_at, updated_at
                 FROM tasks WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            )?
        } else {
            conn.prepare(
                "SELECT task_id, query, user_id, depth, status, current_agent, progress,
                        error_message, created_at, updated_at
                 FROM tasks ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            )?
        };

        let status_param = status.map(|s| s.to_string()).unwrap_or_default();
        let rows = stmt.query_map(
            params![status_param, limit, offset],
            row_to_task_record,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn row_to_task_record(row: &rusqlite::Row) -> rusqlite::Result<TaskRecord> {
    let status_str: String = row.get(4)?;
    let depth_str: String = row.get(3)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;
    Ok(TaskRecord {
        task_id: row.get(0)?,
        query: row.get(1)?,
        user_id: row.get(2)?,
        depth: Depth::from_str(&depth_str).unwrap_or(Depth::Standard),
        status: TaskStatus::from_str(&status_str)
            .unwrap_or(TaskStatus::Queued),
        current_agent: row.get(5)?,
        progress: row.get::<_, i64>(6)? as u8,
        error_message: row.get(7)?,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

fn row_to_result_record(row: &rusqlite::Row) -> rusqlite::Result<ResultRecord> {
    let sources_json: String = row.get(2)?;
    let metadata_json: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    Ok(ResultRecord {
        task_id: row.get(0)?,
        report: row.get(1)?,
        sources: serde_json::from_str(&sources_json).unwrap_or_default(),
        confidence_score: row.get(3)?,
        needs_hitl: row.get::<_, i64>(4)? != 0,
        blob_url: row.get(5)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        created_at: parse_timestamp(&created_at_str),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_status_round_trips_query_and_user_id() {
        let store = TaskStore::open_in_memory().unwrap();
        let task_id = store
            .create("what are attention mechanisms?", Some("user-1"), Depth::Standard)
            .unwrap();
        let record = store.get_status(&task_id).unwrap().unwrap();
        assert_eq!(record.query, "what are attention mechanisms?");
        assert_eq!(record.user_id.as_deref(), Some("user-1"));
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let store = TaskStore::open_in_memory().unwrap();
        let task_id = store.create("q", None, Depth::Standard).unwrap();
        let err = store
            .update(&task_id, Some(TaskStatus::Completed), None, None, None)
            .unwrap_err();
        assert!(matches!(err, ResearchError::Conflict(_)));
    }

    #[test]
    fn store_result_picks_pending_review_when_needs_hitl() {
        let store = TaskStore::open_in_memory().unwrap();
        let task_id = store.create("q", None, Depth::Standard).unwrap();
        store
            .update(&task_id, Some(TaskStatus::Processing), None, None, None)
            .unwrap();
        store
            .store_result(&task_id, "draft", &[], 0.55, true, serde_json::json!({}))
            .unwrap();
        let record = store.get_status(&task_id).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::PendingReview);
    }

    #[test]
    fn approve_is_idempotent() {
        let store = TaskStore::open_in_memory().unwrap();
        let task_id = store.create("q", None, Depth::Standard).unwrap();
        store
            .update(&task_id, Some(TaskStatus::Processing), None, None, None)
            .unwrap();
        store
            .store_result(&task_id, "draft", &[], 0.55, true, serde_json::json!({}))
            .unwrap();
        store.approve(&task_id).unwrap();
        store.approve(&task_id).unwrap();
        let record = store.get_status(&task_id).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Approved);
    }

    #[test]
    fn reject_returns_original_query_and_resets_to_processing() {
        let store = TaskStore::open_in_memory().unwrap();
        let task_id = store.create("original query", None, Depth::Standard).unwrap();
        store
            .update(&task_id, Some(TaskStatus::Processing), None, None, None)
            .unwrap();
        store
            .store_result(&task_id, "draft", &[], 0.4, true, serde_json::json!({}))
            .unwrap();
        let query = store.reject_for_regeneration(&task_id).unwrap();
        assert_eq!(query, "original query");
        let record = store.get_status(&task_id).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Processing);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn list_returns_newest_first() {
        let store = TaskStore::open_in_memory().unwrap();
        let first = store.create("q1", None, Depth::Standard).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.create("q2", None, Depth::Standard).unwrap();
        let tasks = store.list(None, 10, 0).unwrap();
        assert_eq!(tasks[0].task_id, second);
        assert_eq!(tasks[1].task_id, first);
    }
}
