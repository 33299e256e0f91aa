//! BreathBound - Call Session Core
//!
//! Kern der anonymen Peer-Support-Plattform mit:
//! - Call Session Controller für Audio/Video-Anrufe
//! - Geräte-Schnittstelle für Kamera, Mikrofon und Bildschirm
//! - Chat-Raum als Host der Anrufe
//! - SQLite-Verzeichnis für Listener und Session-Historie

pub mod call_session;
pub mod chat;
pub mod config;
pub mod directory;

pub use call_session::{CallMode, CallSession, CallSummary, ConnectionState, SessionTimings};
pub use chat::ChatRoom;
pub use config::AppConfig;
pub use directory::{SqliteDirectory, SupportDirectory};

use once_cell::sync::OnceCell;

static LOGGING: OnceCell<()> = OnceCell::new();

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging (mehrfacher Aufruf ist unschädlich)
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        let mut filter = tracing_subscriber::EnvFilter::from_default_env();
        if let Ok(directive) = "breathbound=debug".parse() {
            filter = filter.add_directive(directive);
        }
        if let Ok(directive) = "breathbound_lib=debug".parse() {
            filter = filter.add_directive(directive);
        }

        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
