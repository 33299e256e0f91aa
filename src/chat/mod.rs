//! Chat Module - Unterhaltung zwischen Client und Listener
//!
//! Der Chat-Raum ist der Host der CallSession:
//! - Nachrichten und ausstehende Listener-Antworten
//! - Eingehende Anrufe annehmen oder ablehnen
//! - Beendete Anrufe in der Session-Historie ablegen
//!

mod room;

pub use room::{ChatError, ChatMessage, ChatRoom, MessageAuthor};
