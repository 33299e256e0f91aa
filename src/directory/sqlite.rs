//! Support Directory auf SQLite
//!
//! Speichert Listener (Name, Schwerpunkte, Status, Bewertung) und die
//! Historie abgeschlossener Support-Sessions.

use super::{
    DirectoryError, Listener, ListenerStatus, NewListener, NewSessionRecord, SessionChannel,
    SessionRecord, SupportDirectory,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::path::{Path, PathBuf};

/// Listener aus dem ursprünglichen Prototyp
const DEMO_LISTENERS: [(&str, [&str; 2], ListenerStatus, f64); 4] = [
    ("Listener1", ["Anxiety", "Stress"], ListenerStatus::Available, 4.9),
    ("Listener2", ["Depression", "Grief"], ListenerStatus::Available, 4.8),
    ("Listener3", ["Relationships", "Family"], ListenerStatus::Busy, 4.7),
    ("Listener4", ["Work", "Career"], ListenerStatus::Available, 4.9),
];

// ============================================================================
// DATABASE
// ============================================================================

/// SQLite-Datenbank für das Verzeichnis (Thread-safe durch Mutex)
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    /// Öffnet oder erstellt die Datenbank
    pub fn open(db_path: &Path) -> Result<Self, DirectoryError> {
        // Parent-Verzeichnis erstellen
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening directory at {:?}", db_path);

        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// In-Memory Datenbank für Tests und Demos
    pub fn open_in_memory() -> Result<Self, DirectoryError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Ermittelt den Standardpfad zur Datenbank-Datei
    pub fn default_path() -> Result<PathBuf, DirectoryError> {
        let proj_dirs = directories::ProjectDirs::from("org", "breathbound", "breathbound")
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine app data directory",
                )
            })?;

        let mut path = proj_dirs.data_dir().to_path_buf();
        path.push("directory.db");
        Ok(path)
    }

    /// Initialisiert das Datenbank-Schema
    fn init_schema(&self) -> Result<(), DirectoryError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS listeners (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                specialties TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'available',
                rating REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL,
                listener_id INTEGER NOT NULL REFERENCES listeners(id),
                channel TEXT NOT NULL,
                started_at TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_client_id ON sessions(client_id);
            "#,
        )?;
        Ok(())
    }

    /// Fügt die Demo-Listener ein, falls das Verzeichnis leer ist
    pub fn seed_demo_listeners(&self) -> Result<usize, DirectoryError> {
        let existing: i64 = {
            let conn = self.conn.lock();
            conn.query_row("SELECT COUNT(*) FROM listeners", [], |row| row.get(0))?
        };
        if existing > 0 {
            return Ok(0);
        }

        for (name, specialties, status, rating) in DEMO_LISTENERS {
            self.add_listener(NewListener {
                name: name.to_string(),
                specialties: specialties.iter().map(|s| s.to_string()).collect(),
                status,
                rating,
            })?;
        }

        tracing::info!("Seeded {} demo listeners", DEMO_LISTENERS.len());
        Ok(DEMO_LISTENERS.len())
    }

    fn listener_from_row(row: &Row<'_>) -> SqliteResult<Listener> {
        let specialties: String = row.get(2)?;
        let status: String = row.get(3)?;

        Ok(Listener {
            id: row.get(0)?,
            name: row.get(1)?,
            specialties: serde_json::from_str(&specialties)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
            status: ListenerStatus::parse(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    Type::Text,
                    format!("unknown listener status '{status}'").into(),
                )
            })?,
            rating: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn session_from_row(row: &Row<'_>) -> SqliteResult<SessionRecord> {
        let channel: String = row.get(3)?;
        let started_at: String = row.get(4)?;
        let duration_seconds: i64 = row.get(5)?;

        Ok(SessionRecord {
            id: row.get(0)?,
            client_id: row.get(1)?,
            listener_id: row.get(2)?,
            channel: SessionChannel::parse(&channel).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    Type::Text,
                    format!("unknown session channel '{channel}'").into(),
                )
            })?,
            started_at: DateTime::parse_from_rfc3339(&started_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
            duration_seconds: duration_seconds.max(0) as u64,
        })
    }

    /// Interne Hilfsfunktion mit Connection-Referenz
    fn get_listener_inner(conn: &Connection, id: i64) -> Result<Listener, DirectoryError> {
        conn.query_row(
            r#"
            SELECT id, name, specialties, status, rating, created_at
            FROM listeners
            WHERE id = ?1
            "#,
            params![id],
            Self::listener_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DirectoryError::ListenerNotFound(id),
            other => DirectoryError::Sqlite(other),
        })
    }
}

impl SupportDirectory for SqliteDirectory {
    fn listeners(&self) -> Result<Vec<Listener>, DirectoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, specialties, status, rating, created_at
            FROM listeners
            ORDER BY name ASC
            "#,
        )?;

        let listeners = stmt
            .query_map([], Self::listener_from_row)?
            .collect::<SqliteResult<Vec<Listener>>>()?;

        Ok(listeners)
    }

    fn listener(&self, id: i64) -> Result<Listener, DirectoryError> {
        let conn = self.conn.lock();
        Self::get_listener_inner(&conn, id)
    }

    fn add_listener(&self, listener: NewListener) -> Result<Listener, DirectoryError> {
        let specialties = serde_json::to_string(&listener.specialties)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO listeners (name, specialties, status, rating)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                listener.name,
                specialties,
                listener.status.as_str(),
                listener.rating
            ],
        )?;

        Self::get_listener_inner(&conn, conn.last_insert_rowid())
    }

    fn set_listener_status(&self, id: i64, status: ListenerStatus) -> Result<(), DirectoryError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            r#"
            UPDATE listeners
            SET status = ?2
            WHERE id = ?1
            "#,
            params![id, status.as_str()],
        )?;

        if updated == 0 {
            return Err(DirectoryError::ListenerNotFound(id));
        }
        Ok(())
    }

    fn record_session(&self, record: NewSessionRecord) -> Result<SessionRecord, DirectoryError> {
        let duration_seconds = i64::try_from(record.duration_seconds)
            .map_err(|_| DirectoryError::DurationOutOfRange(record.duration_seconds))?;

        let conn = self.conn.lock();
        Self::get_listener_inner(&conn, record.listener_id)?;

        conn.execute(
            r#"
            INSERT INTO sessions (client_id, listener_id, channel, started_at, duration_seconds)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.client_id,
                record.listener_id,
                record.channel.as_str(),
                record.started_at.to_rfc3339(),
                duration_seconds
            ],
        )?;

        Ok(SessionRecord {
            id: conn.last_insert_rowid(),
            client_id: record.client_id,
            listener_id: record.listener_id,
            channel: record.channel,
            started_at: record.started_at,
            duration_seconds: record.duration_seconds,
        })
    }

    fn sessions_for_client(&self, client_id: &str) -> Result<Vec<SessionRecord>, DirectoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, client_id, listener_id, channel, started_at, duration_seconds
            FROM sessions
            WHERE client_id = ?1
            ORDER BY started_at DESC, id DESC
            "#,
        )?;

        let sessions = stmt
            .query_map(params![client_id], Self::session_from_row)?
            .collect::<SqliteResult<Vec<SessionRecord>>>()?;

        Ok(sessions)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seeded() -> SqliteDirectory {
        let db = SqliteDirectory::open_in_memory().unwrap();
        db.seed_demo_listeners().unwrap();
        db
    }

    #[test]
    fn test_seed_is_idempotent() {
        let db = seeded();
        assert_eq!(db.seed_demo_listeners().unwrap(), 0);

        let listeners = db.listeners().unwrap();
        assert_eq!(listeners.len(), 4);
        assert_eq!(listeners[0].name, "Listener1");
        assert_eq!(listeners[0].specialties, vec!["Anxiety", "Stress"]);
        assert_eq!(listeners[2].status, ListenerStatus::Busy);
    }

    #[test]
    fn test_search_by_name_or_specialty() {
        let db = seeded();

        let grief = db.search_listeners("GRIEF").unwrap();
        assert_eq!(grief.len(), 1);
        assert_eq!(grief[0].name, "Listener2");

        let by_name = db.search_listeners("listener3").unwrap();
        assert_eq!(by_name[0].specialties, vec!["Relationships", "Family"]);

        assert_eq!(db.search_listeners("  ").unwrap().len(), 4);
        assert!(db.search_listeners("astronomy").unwrap().is_empty());
    }

    #[test]
    fn test_set_status_unknown_listener() {
        let db = seeded();
        db.set_listener_status(1, ListenerStatus::Busy).unwrap();
        assert_eq!(db.listener(1).unwrap().status, ListenerStatus::Busy);

        assert!(matches!(
            db.set_listener_status(99, ListenerStatus::Available),
            Err(DirectoryError::ListenerNotFound(99))
        ));
    }

    #[test]
    fn test_session_history_newest_first() {
        let db = seeded();
        let now = Utc::now();

        db.record_session(NewSessionRecord {
            client_id: "user".into(),
            listener_id: 1,
            channel: SessionChannel::Text,
            started_at: now - Duration::days(5),
            duration_seconds: 45 * 60,
        })
        .unwrap();
        db.record_session(NewSessionRecord {
            client_id: "user".into(),
            listener_id: 3,
            channel: SessionChannel::Video,
            started_at: now,
            duration_seconds: 30 * 60,
        })
        .unwrap();

        let history = db.sessions_for_client("user").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].listener_id, 3);
        assert_eq!(history[0].channel, SessionChannel::Video);
        assert_eq!(history[1].duration_seconds, 45 * 60);
        assert!(db.sessions_for_client("someone-else").unwrap().is_empty());
    }

    #[test]
    fn test_record_session_requires_listener() {
        let db = seeded();
        let result = db.record_session(NewSessionRecord {
            client_id: "user".into(),
            listener_id: 42,
            channel: SessionChannel::Audio,
            started_at: Utc::now(),
            duration_seconds: 10,
        });
        assert!(matches!(result, Err(DirectoryError::ListenerNotFound(42))));
    }

    #[test]
    fn test_record_session_rejects_oversized_duration() {
        let db = seeded();
        let result = db.record_session(NewSessionRecord {
            client_id: "user".into(),
            listener_id: 1,
            channel: SessionChannel::Video,
            started_at: Utc::now(),
            duration_seconds: u64::MAX,
        });
        assert!(matches!(
            result,
            Err(DirectoryError::DurationOutOfRange(u64::MAX))
        ));
        assert!(db.sessions_for_client("user").unwrap().is_empty());
    }
}
