//! SQLite-backed channel registry.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{Channel, ChannelError, ChannelStore, NewChannel, OperatingStatus};

const CHANNEL_COLUMNS: &str = "id, code, name, operating_status, auto_call, created_at, updated_at";

/// SQLite-backed channel store.
pub struct SqliteChannelStore {
    conn: Mutex<Connection>,
}

impl SqliteChannelStore {
    /// Open (or create) the channel table in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, ChannelError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory channel store (useful for testing).
    pub fn in_memory() -> Result<Self, ChannelError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, ChannelError> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                operating_status TEXT NOT NULL,
                auto_call INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ChannelError> {
        self.conn
            .lock()
            .map_err(|_| ChannelError::Unavailable("connection mutex poisoned".to_string()))
    }

    fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<Channel> {
        let status: String = row.get(3)?;
        let operating_status = status.parse::<OperatingStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
        })?;

        Ok(Channel {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            operating_status,
            auto_call: row.get(4)?,
            created_at: parse_timestamp(5, row.get(5)?)?,
            updated_at: parse_timestamp(6, row.get(6)?)?,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Channel>, ChannelError> {
        conn.query_row(
            &format!("SELECT {} FROM channels WHERE id = ?", CHANNEL_COLUMNS),
            params![id],
            Self::row_to_channel,
        )
        .optional()
        .map_err(db_err)
    }

    fn update_column(
        &self,
        id: &str,
        column: &str,
        value: &dyn rusqlite::ToSql,
    ) -> Result<Channel, ChannelError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!("UPDATE channels SET {} = ?, updated_at = ? WHERE id = ?", column),
                params![value, ts(Utc::now()), id],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(ChannelError::NotFound(id.to_string()));
        }

        Self::fetch(&conn, id)?.ok_or_else(|| ChannelError::NotFound(id.to_string()))
    }
}

impl ChannelStore for SqliteChannelStore {
    fn create(&self, channel: NewChannel) -> Result<Channel, ChannelError> {
        let conn = self.conn()?;
        let now = Utc::now().trunc_subsecs(6);
        let status = OperatingStatus::Active;

        let result = conn.execute(
            "INSERT INTO channels (id, code, name, operating_status, auto_call, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                channel.id,
                channel.code,
                channel.name,
                status.as_str(),
                channel.auto_call,
                ts(now),
                ts(now),
            ],
        );

        match result {
            Ok(_) => Ok(Channel {
                id: channel.id,
                code: channel.code,
                name: channel.name,
                operating_status: status,
                auto_call: channel.auto_call,
                created_at: now,
                updated_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(ChannelError::AlreadyExists(channel.id))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    fn get(&self, id: &str) -> Result<Option<Channel>, ChannelError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self) -> Result<Vec<Channel>, ChannelError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM channels ORDER BY id ASC", CHANNEL_COLUMNS))
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], Self::row_to_channel)
            .map_err(db_err)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row.map_err(db_err)?);
        }
        Ok(channels)
    }

    fn set_operating_status(
        &self,
        id: &str,
        status: OperatingStatus,
    ) -> Result<Channel, ChannelError> {
        self.update_column(id, "operating_status", &status.as_str())
    }

    fn set_auto_call(&self, id: &str, enabled: bool) -> Result<Channel, ChannelError> {
        self.update_column(id, "auto_call", &enabled)
    }
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn db_err(e: rusqlite::Error) -> ChannelError {
    ChannelError::Unavailable(e.to_string())
}
