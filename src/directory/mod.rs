//! Directory Module - Listener und Session-Historie
//!
//! Dieses Modul stellt die Datenzugriffs-Schnittstelle bereit:
//! - Listener mit Schwerpunkten, Status und Bewertung
//! - Suche nach Name oder Schwerpunkt
//! - Historie abgeschlossener Support-Sessions
//!

mod sqlite;

pub use sqlite::SqliteDirectory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Failed to encode specialties: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Listener not found: {0}")]
    ListenerNotFound(i64),

    #[error("Session duration out of range: {0}s")]
    DurationOutOfRange(u64),
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerStatus {
    Available,
    Busy,
}

impl ListenerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenerStatus::Available => "available",
            ListenerStatus::Busy => "busy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(ListenerStatus::Available),
            "busy" => Some(ListenerStatus::Busy),
            _ => None,
        }
    }
}

/// Ein freiwilliger Listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub id: i64,
    pub name: String,
    pub specialties: Vec<String>,
    pub status: ListenerStatus,
    pub rating: f64,
    pub created_at: String,
}

impl Listener {
    /// Case-insensitive Treffer auf Name oder einen Schwerpunkt
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&query)
            || self
                .specialties
                .iter()
                .any(|s| s.to_lowercase().contains(&query))
    }
}

/// Neuer Listener ohne ID (für INSERT)
#[derive(Debug, Clone)]
pub struct NewListener {
    pub name: String,
    pub specialties: Vec<String>,
    pub status: ListenerStatus,
    pub rating: f64,
}

/// Über welchen Kanal eine Session lief
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionChannel {
    Text,
    Audio,
    Video,
}

impl SessionChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionChannel::Text => "text",
            SessionChannel::Audio => "audio",
            SessionChannel::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(SessionChannel::Text),
            "audio" => Some(SessionChannel::Audio),
            "video" => Some(SessionChannel::Video),
            _ => None,
        }
    }
}

/// Eine abgeschlossene Support-Session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub client_id: String,
    pub listener_id: i64,
    pub channel: SessionChannel,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct NewSessionRecord {
    pub client_id: String,
    pub listener_id: i64,
    pub channel: SessionChannel,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
}

// ============================================================================
// DATA ACCESS
// ============================================================================

/// Datenzugriff für Listener und Session-Historie
pub trait SupportDirectory: Send + Sync {
    /// Alle Listener, nach Name sortiert
    fn listeners(&self) -> Result<Vec<Listener>, DirectoryError>;

    fn listener(&self, id: i64) -> Result<Listener, DirectoryError>;

    fn add_listener(&self, listener: NewListener) -> Result<Listener, DirectoryError>;

    fn set_listener_status(&self, id: i64, status: ListenerStatus) -> Result<(), DirectoryError>;

    /// Speichert eine abgeschlossene Session
    fn record_session(&self, record: NewSessionRecord) -> Result<SessionRecord, DirectoryError>;

    /// Sessions eines Clients, neueste zuerst
    fn sessions_for_client(&self, client_id: &str) -> Result<Vec<SessionRecord>, DirectoryError>;

    /// Sucht nach Name oder Schwerpunkt; eine leere Suche liefert alle
    fn search_listeners(&self, query: &str) -> Result<Vec<Listener>, DirectoryError> {
        Ok(self
            .listeners()?
            .into_iter()
            .filter(|l| l.matches(query))
            .collect())
    }
}
