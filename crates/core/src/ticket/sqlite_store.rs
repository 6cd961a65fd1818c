//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CreateTicketRequest, PriorityTier, Ticket, TicketError, TicketFilter, TicketStatus,
    TicketStore, TicketUpdate,
};

const TICKET_COLUMNS: &str = "id, channel_id, queue_number, service_date, patient_ref, \
     priority_tier, status, enqueued_at, called_at, service_started_at, completed_at, \
     cancelled_at, skipped_at, skip_count, recall_count, notes, updated_at";

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, TicketError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                queue_number INTEGER NOT NULL,
                service_date TEXT NOT NULL,
                patient_ref TEXT NOT NULL,
                priority_tier TEXT NOT NULL,
                status TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                called_at TEXT,
                service_started_at TEXT,
                completed_at TEXT,
                cancelled_at TEXT,
                skipped_at TEXT,
                skip_count INTEGER NOT NULL DEFAULT 0,
                recall_count INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE (channel_id, service_date, queue_number)
            );

            CREATE TABLE IF NOT EXISTS queue_counters (
                channel_id TEXT NOT NULL,
                service_date TEXT NOT NULL,
                last_number INTEGER NOT NULL,
                PRIMARY KEY (channel_id, service_date)
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_channel_status ON tickets(channel_id, status);
            CREATE INDEX IF NOT EXISTS idx_tickets_service_date ON tickets(service_date);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TicketError> {
        self.conn
            .lock()
            .map_err(|_| TicketError::Unavailable("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref channel_id) = filter.channel_id {
            conditions.push("channel_id = ?".to_string());
            params.push(Box::new(channel_id.clone()));
        }

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            conditions.push(format!("status IN ({})", placeholders));
            for status in &filter.statuses {
                params.push(Box::new(status.as_str()));
            }
        }

        if let Some(date) = filter.service_date {
            conditions.push("service_date = ?".to_string());
            params.push(Box::new(date.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let service_date: String = row.get(3)?;
        let priority_tier: String = row.get(5)?;
        let status: String = row.get(6)?;

        Ok(Ticket {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            queue_number: row.get(2)?,
            service_date: NaiveDate::parse_from_str(&service_date, "%Y-%m-%d")
                .map_err(|e| conversion_err(3, e))?,
            patient_ref: row.get(4)?,
            priority_tier: priority_tier
                .parse::<PriorityTier>()
                .map_err(|e| conversion_err(5, BadValue(e)))?,
            status: status
                .parse::<TicketStatus>()
                .map_err(|e| conversion_err(6, BadValue(e)))?,
            enqueued_at: parse_timestamp(7, row.get(7)?)?,
            called_at: parse_optional_timestamp(8, row.get(8)?)?,
            service_started_at: parse_optional_timestamp(9, row.get(9)?)?,
            completed_at: parse_optional_timestamp(10, row.get(10)?)?,
            cancelled_at: parse_optional_timestamp(11, row.get(11)?)?,
            skipped_at: parse_optional_timestamp(12, row.get(12)?)?,
            skip_count: row.get(13)?,
            recall_count: row.get(14)?,
            estimated_wait_minutes: None,
            notes: row.get(15)?,
            updated_at: parse_timestamp(16, row.get(16)?)?,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Ticket>, TicketError> {
        conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
            params![id],
            Self::row_to_ticket,
        )
        .optional()
        .map_err(db_err)
    }
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        let service_date = request.service_date.to_string();

        // Counter bump and insert commit together, so numbers never repeat
        // for a (channel, date) even across processes sharing the file.
        let queue_number: u32 = tx
            .query_row(
                "INSERT INTO queue_counters (channel_id, service_date, last_number) VALUES (?, ?, 1)
                 ON CONFLICT(channel_id, service_date) DO UPDATE SET last_number = last_number + 1
                 RETURNING last_number",
                params![request.channel_id, service_date],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().trunc_subsecs(6);
        let status = TicketStatus::Waiting;

        tx.execute(
            "INSERT INTO tickets (id, channel_id, queue_number, service_date, patient_ref, priority_tier, status, enqueued_at, notes, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.channel_id,
                queue_number,
                service_date,
                request.patient_ref,
                request.priority_tier.as_str(),
                status.as_str(),
                ts(now),
                request.notes,
                ts(now),
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Ok(Ticket {
            id,
            channel_id: request.channel_id,
            queue_number,
            service_date: request.service_date,
            patient_ref: request.patient_ref,
            priority_tier: request.priority_tier,
            status,
            enqueued_at: now,
            called_at: None,
            service_started_at: None,
            completed_at: None,
            cancelled_at: None,
            skipped_at: None,
            skip_count: 0,
            recall_count: 0,
            estimated_wait_minutes: None,
            notes: request.notes,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY enqueued_at ASC, queue_number ASC LIMIT ? OFFSET ?",
            TICKET_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        // SQLite reads a negative LIMIT as "no limit".
        all_params.push(Box::new(filter.limit.unwrap_or(-1)));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(db_err)?;

        let mut tickets = Vec::new();
        for row_result in rows {
            tickets.push(row_result.map_err(db_err)?);
        }

        Ok(tickets)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn update_if_status(
        &self,
        id: &str,
        expected: TicketStatus,
        update: TicketUpdate,
    ) -> Result<Ticket, TicketError> {
        let conn = self.conn()?;
        let now = Utc::now();

        let changed = conn
            .execute(
                "UPDATE tickets SET
                    status = ?,
                    called_at = COALESCE(?, called_at),
                    service_started_at = COALESCE(?, service_started_at),
                    completed_at = COALESCE(?, completed_at),
                    cancelled_at = COALESCE(?, cancelled_at),
                    skipped_at = COALESCE(?, skipped_at),
                    recall_count = recall_count + ?,
                    skip_count = skip_count + ?,
                    updated_at = ?
                 WHERE id = ? AND status = ?",
                params![
                    update.status.as_str(),
                    update.called_at.map(ts),
                    update.service_started_at.map(ts),
                    update.completed_at.map(ts),
                    update.cancelled_at.map(ts),
                    update.skipped_at.map(ts),
                    update.increment_recall as i64,
                    update.increment_skip as i64,
                    ts(now),
                    id,
                    expected.as_str(),
                ],
            )
            .map_err(db_err)?;

        let current = Self::fetch(&conn, id)?.ok_or_else(|| TicketError::NotFound(id.to_string()))?;

        if changed == 0 {
            return Err(TicketError::Conflict {
                ticket_id: id.to_string(),
                expected,
                actual: current.status,
            });
        }

        Ok(current)
    }
}

/// Fixed-width RFC 3339 so text order matches time order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn db_err(e: rusqlite::Error) -> TicketError {
    TicketError::Unavailable(e.to_string())
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Unparseable enum text read back from the database.
#[derive(Debug)]
struct BadValue(String);

impl std::fmt::Display for BadValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BadValue {}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_optional_timestamp(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(idx, v)).transpose()
}
