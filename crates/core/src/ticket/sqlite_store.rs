//! SQLite-backed ticket store implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;

use super::{
    CreateTicketRequest, SubtaskKind, SubtaskRecord, SubtaskStatus, Ticket, TicketError,
    TicketFilter, TicketResult, TicketStatus, TicketStore,
};

const TICKET_COLUMNS: &str =
    "id, problem_id, requester_name, status, result, failure, created_at, updated_at";

/// How long a connection waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed ticket store.
///
/// Each subtask lives in its own row of `ticket_subtasks`, so concurrent
/// workers never rewrite each other's records. Several processes may share
/// one database file; every conditional write is a single statement.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = Connection::open(path).map_err(|e| TicketError::Database(e.to_string()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                problem_id TEXT NOT NULL,
                requester_name TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                failure TEXT,
                finalize_claim TEXT,
                finalize_claimed_at INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticket_subtasks (
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT,
                error TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (ticket_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_requester ON tickets(requester_name);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at);
            "#,
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TicketError> {
        self.conn
            .lock()
            .map_err(|_| TicketError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref requester_name) = filter.requester_name {
            conditions.push("requester_name = ?");
            params.push(Box::new(requester_name.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let id: String = row.get(0)?;
        let problem_id: String = row.get(1)?;
        let requester_name: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let result_json: Option<String> = row.get(4)?;
        let failure: Option<String> = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;

        let status: TicketStatus = status_str
            .parse()
            .map_err(|e: String| conversion_error(3, e))?;

        let result: Option<TicketResult> = result_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| conversion_error(4, e.to_string()))?;

        Ok(Ticket {
            id,
            problem_id,
            requester_name,
            status,
            subtasks: BTreeMap::new(),
            result,
            failure,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn row_to_subtask(row: &rusqlite::Row) -> rusqlite::Result<(String, SubtaskRecord)> {
        let name: String = row.get(0)?;
        let status_str: String = row.get(1)?;
        let data_json: Option<String> = row.get(2)?;
        let error: Option<String> = row.get(3)?;
        let attempts: u32 = row.get(4)?;
        let updated_at_str: String = row.get(5)?;

        let status: SubtaskStatus = status_str
            .parse()
            .map_err(|e: String| conversion_error(1, e))?;

        let data: Option<Value> = data_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| conversion_error(2, e.to_string()))?;

        Ok((
            name,
            SubtaskRecord {
                status,
                data,
                error,
                attempts,
                updated_at: parse_timestamp(&updated_at_str),
            },
        ))
    }

    fn load_subtasks(
        conn: &Connection,
        ticket_id: &str,
    ) -> Result<BTreeMap<SubtaskKind, SubtaskRecord>, TicketError> {
        let mut stmt = conn
            .prepare(
                "SELECT name, status, data, error, attempts, updated_at FROM ticket_subtasks WHERE ticket_id = ?",
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![ticket_id], Self::row_to_subtask)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut subtasks = BTreeMap::new();
        for row_result in rows {
            let (name, record) = row_result.map_err(|e| TicketError::Database(e.to_string()))?;
            let kind: SubtaskKind = name.parse().map_err(TicketError::Database)?;
            subtasks.insert(kind, record);
        }

        Ok(subtasks)
    }

    fn load_ticket(conn: &Connection, id: &str) -> Result<Option<Ticket>, TicketError> {
        let sql = format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS);
        let ticket = conn
            .query_row(&sql, params![id], Self::row_to_ticket)
            .optional()
            .map_err(|e| TicketError::Database(e.to_string()))?;

        match ticket {
            Some(mut ticket) => {
                ticket.subtasks = Self::load_subtasks(conn, id)?;
                Ok(Some(ticket))
            }
            None => Ok(None),
        }
    }

    fn ticket_exists(conn: &Connection, id: &str) -> Result<bool, TicketError> {
        conn.query_row("SELECT 1 FROM tickets WHERE id = ?", params![id], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn read_subtask(
        conn: &Connection,
        id: &str,
        kind: SubtaskKind,
    ) -> Result<SubtaskRecord, TicketError> {
        let row = conn
            .query_row(
                "SELECT name, status, data, error, attempts, updated_at FROM ticket_subtasks WHERE ticket_id = ? AND name = ?",
                params![id, kind.as_str()],
                Self::row_to_subtask,
            )
            .optional()
            .map_err(|e| TicketError::Database(e.to_string()))?;

        match row {
            Some((_, record)) => Ok(record),
            None if Self::ticket_exists(conn, id)? => Err(TicketError::SubtaskNotFound {
                ticket_id: id.to_string(),
                subtask: kind.to_string(),
            }),
            None => Err(TicketError::NotFound(id.to_string())),
        }
    }

    /// Apply a conditional subtask update and return the record as it stands.
    ///
    /// `apply` receives the transaction and the write timestamp and must only
    /// touch non-terminal rows.
    fn write_subtask<F>(
        &self,
        id: &str,
        kind: SubtaskKind,
        apply: F,
    ) -> Result<SubtaskRecord, TicketError>
    where
        F: FnOnce(&Connection, &str) -> rusqlite::Result<usize>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let now = timestamp(Utc::now());
        let changed = apply(&tx, &now).map_err(|e| TicketError::Database(e.to_string()))?;

        if changed > 0 {
            tx.execute(
                "UPDATE tickets SET updated_at = ? WHERE id = ?",
                params![now, id],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;
        }

        let record = Self::read_subtask(&tx, id, kind)?;
        tx.commit()
            .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(record)
    }
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        let mut conn = self.lock()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = timestamp(now);
        let status = TicketStatus::Processing;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO tickets (id, problem_id, requester_name, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.problem_id,
                request.requester_name,
                status.as_str(),
                now_str,
                now_str,
            ],
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut subtasks = BTreeMap::new();
        for kind in SubtaskKind::ALL {
            tx.execute(
                "INSERT INTO ticket_subtasks (ticket_id, name, status, updated_at) VALUES (?, ?, ?, ?)",
                params![id, kind.as_str(), SubtaskStatus::Pending.as_str(), now_str],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;
            subtasks.insert(kind, SubtaskRecord::pending(now));
        }

        tx.commit()
            .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(Ticket {
            id,
            problem_id: request.problem_id,
            requester_name: request.requester_name,
            status,
            subtasks,
            result: None,
            failure: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.lock()?;
        Self::load_ticket(&conn, id)
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            TICKET_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        // Build parameter slice with limit and offset
        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut tickets = Vec::new();
        for row_result in rows {
            let mut ticket = row_result.map_err(|e| TicketError::Database(e.to_string()))?;
            ticket.subtasks = Self::load_subtasks(&conn, &ticket.id)?;
            tickets.push(ticket);
        }

        Ok(tickets)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(count)
    }

    fn mark_subtask_processing(
        &self,
        id: &str,
        kind: SubtaskKind,
    ) -> Result<SubtaskRecord, TicketError> {
        self.write_subtask(id, kind, |conn, now| {
            conn.execute(
                "UPDATE ticket_subtasks SET status = 'processing', attempts = attempts + 1, updated_at = ?1 \
                 WHERE ticket_id = ?2 AND name = ?3 AND status IN ('pending', 'processing')",
                params![now, id, kind.as_str()],
            )
        })
    }

    fn complete_subtask(
        &self,
        id: &str,
        kind: SubtaskKind,
        data: Value,
    ) -> Result<SubtaskRecord, TicketError> {
        let data_json =
            serde_json::to_string(&data).map_err(|e| TicketError::Database(e.to_string()))?;
        self.write_subtask(id, kind, |conn, now| {
            conn.execute(
                "UPDATE ticket_subtasks SET status = 'completed', data = ?1, error = NULL, updated_at = ?2 \
                 WHERE ticket_id = ?3 AND name = ?4 AND status IN ('pending', 'processing')",
                params![data_json, now, id, kind.as_str()],
            )
        })
    }

    fn fail_subtask(
        &self,
        id: &str,
        kind: SubtaskKind,
        error: &str,
    ) -> Result<SubtaskRecord, TicketError> {
        self.write_subtask(id, kind, |conn, now| {
            conn.execute(
                "UPDATE ticket_subtasks SET status = 'error', error = ?1, data = NULL, updated_at = ?2 \
                 WHERE ticket_id = ?3 AND name = ?4 AND status IN ('pending', 'processing')",
                params![error, now, id, kind.as_str()],
            )
        })
    }

    fn claim_finalization(
        &self,
        id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, TicketError> {
        let conn = self.lock()?;

        let now_ms = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let stale_before = now_ms.saturating_sub(ttl_ms);

        let changed = conn
            .execute(
                "UPDATE tickets SET finalize_claim = ?1, finalize_claimed_at = ?2 \
                 WHERE id = ?3 AND status = 'processing' \
                   AND (finalize_claim IS NULL OR finalize_claimed_at <= ?4) \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM ticket_subtasks \
                       WHERE ticket_id = ?3 AND status IN ('pending', 'processing'))",
                params![token, now_ms, id, stale_before],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        if changed == 0 && !Self::ticket_exists(&conn, id)? {
            return Err(TicketError::NotFound(id.to_string()));
        }

        Ok(changed == 1)
    }

    fn finalize(&self, id: &str, token: &str, result: &TicketResult) -> Result<bool, TicketError> {
        let conn = self.lock()?;

        let result_json =
            serde_json::to_string(result).map_err(|e| TicketError::Database(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE tickets SET status = 'completed', result = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = 'processing' AND finalize_claim = ?4",
                params![result_json, timestamp(Utc::now()), id, token],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        if changed == 0 && !Self::ticket_exists(&conn, id)? {
            return Err(TicketError::NotFound(id.to_string()));
        }

        Ok(changed == 1)
    }

    fn release_finalization(&self, id: &str, token: &str) -> Result<bool, TicketError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE tickets SET finalize_claim = NULL, finalize_claimed_at = NULL \
                 WHERE id = ?1 AND status = 'processing' AND finalize_claim = ?2",
                params![id, token],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(changed == 1)
    }

    fn mark_failed(&self, id: &str, reason: &str) -> Result<bool, TicketError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE tickets SET status = 'failed', failure = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = 'processing'",
                params![reason, timestamp(Utc::now()), id],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        if changed == 0 && !Self::ticket_exists(&conn, id)? {
            return Err(TicketError::NotFound(id.to_string()));
        }

        Ok(changed == 1)
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}
