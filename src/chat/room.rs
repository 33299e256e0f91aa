//! Chat Room - Host für Nachrichten und Anrufe
//!
//! Ein Raum ist eine Unterhaltung zwischen einem Client und einem
//! Listener. Er bettet die CallSession ein und schreibt beendete Anrufe
//! in die Session-Historie.
//!
//! Eingehende Anrufe und Listener-Antworten sind explizite Trigger,
//! keine Timer.

use crate::call_session::{
    CallMode, CallSession, CallSessionError, CallSummary, ConnectionState, MediaDevices,
    SessionTimings,
};
use crate::directory::{
    DirectoryError, Listener, NewSessionRecord, SessionChannel, SupportDirectory,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

const LISTENER_GREETING: &str = "Hi there! I'm here to listen. How are you feeling today?";
const LISTENER_REPLY: &str =
    "Thank you for sharing that with me. Can you tell me more about how that made you feel?";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Call(#[from] CallSessionError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

// ============================================================================
// MESSAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAuthor {
    Client,
    Listener,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: u64,
    pub author: MessageAuthor,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// CHAT ROOM
// ============================================================================

pub struct ChatRoom {
    client_id: String,
    listener: Listener,
    messages: Vec<ChatMessage>,
    pending_replies: usize,
    incoming_call: Option<CallMode>,
    active_call: Option<CallSession>,
    call_ended_tx: mpsc::UnboundedSender<CallSummary>,
    call_ended_rx: mpsc::UnboundedReceiver<CallSummary>,
    directory: Arc<dyn SupportDirectory>,
    devices: Arc<dyn MediaDevices>,
    timings: SessionTimings,
}

impl ChatRoom {
    /// Öffnet einen Raum mit dem Listener `listener_id`
    pub fn open(
        client_id: impl Into<String>,
        listener_id: i64,
        directory: Arc<dyn SupportDirectory>,
        devices: Arc<dyn MediaDevices>,
        timings: SessionTimings,
    ) -> Result<Self, ChatError> {
        let listener = directory.listener(listener_id)?;
        let (call_ended_tx, call_ended_rx) = mpsc::unbounded_channel();

        let greeting = ChatMessage {
            id: 1,
            author: MessageAuthor::Listener,
            text: LISTENER_GREETING.to_string(),
            timestamp: Utc::now() - Duration::minutes(5),
        };

        tracing::info!("Opened chat room with {}", listener.name);

        Ok(Self {
            client_id: client_id.into(),
            listener,
            messages: vec![greeting],
            pending_replies: 0,
            incoming_call: None,
            active_call: None,
            call_ended_tx,
            call_ended_rx,
            directory,
            devices,
            timings,
        })
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn pending_replies(&self) -> usize {
        self.pending_replies
    }

    pub fn incoming_call(&self) -> Option<CallMode> {
        self.incoming_call
    }

    pub fn active_call(&self) -> Option<&CallSession> {
        self.active_call.as_ref()
    }

    fn push_message(&mut self, author: MessageAuthor, text: String) -> &ChatMessage {
        let id = self.messages.len() as u64 + 1;
        self.messages.push(ChatMessage {
            id,
            author,
            text,
            timestamp: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Sendet eine Nachricht des Clients; leere Eingaben werden ignoriert
    pub fn send_message(&mut self, text: &str) -> Option<&ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.pending_replies += 1;
        Some(self.push_message(MessageAuthor::Client, text.to_string()))
    }

    /// Liefert eine ausstehende Listener-Antwort aus
    pub fn deliver_listener_reply(&mut self) -> Option<&ChatMessage> {
        if self.pending_replies == 0 {
            return None;
        }
        self.pending_replies -= 1;
        Some(self.push_message(MessageAuthor::Listener, LISTENER_REPLY.to_string()))
    }

    /// Meldet einen eingehenden Anruf, sofern der Raum frei ist
    pub fn offer_incoming_call(&mut self, mode: CallMode) -> bool {
        if self.active_call.is_some() || self.incoming_call.is_some() {
            return false;
        }
        tracing::info!("Incoming {:?} call from {}", mode, self.listener.name);
        self.incoming_call = Some(mode);
        true
    }

    /// Wie `offer_incoming_call`, Audio oder Video je zur Hälfte
    pub fn offer_random_incoming_call<R: Rng>(&mut self, rng: &mut R) -> Option<CallMode> {
        let mode = if rng.gen_bool(0.5) {
            CallMode::Audio
        } else {
            CallMode::Video
        };
        self.offer_incoming_call(mode).then_some(mode)
    }

    pub fn decline_incoming_call(&mut self) -> Result<CallMode, ChatError> {
        let mode = self
            .incoming_call
            .take()
            .ok_or(CallSessionError::NoIncomingCall)?;
        tracing::info!("Declined {:?} call from {}", mode, self.listener.name);
        Ok(mode)
    }

    pub fn accept_incoming_call(&mut self) -> Result<&CallSession, ChatError> {
        let mode = self.incoming_call.ok_or(CallSessionError::NoIncomingCall)?;
        self.start_call(mode)
    }

    /// Startet einen Anruf zwischen Client und Listener
    pub fn start_call(&mut self, mode: CallMode) -> Result<&CallSession, ChatError> {
        // Eine direkt aufgelegte Session zuerst abschließen
        if matches!(&self.active_call, Some(call) if call.state() == ConnectionState::Disposed) {
            self.end_call()?;
        }
        if self.active_call.is_some() {
            return Err(CallSessionError::AlreadyInCall.into());
        }

        self.incoming_call = None;
        let call_ended_tx = self.call_ended_tx.clone();
        let session = CallSession::start(
            mode,
            self.client_id.clone(),
            self.listener.name.clone(),
            Arc::clone(&self.devices),
            self.timings,
            move |summary| {
                let _ = call_ended_tx.send(summary);
            },
        );

        let session: &CallSession = self.active_call.insert(session);
        Ok(session)
    }

    /// Legt auf und trägt den Anruf in die Historie ein
    pub fn end_call(&mut self) -> Result<CallSummary, ChatError> {
        let session = self
            .active_call
            .take()
            .ok_or(CallSessionError::NoActiveCall)?;
        session.end();

        // Nach `dispose()` kommt keine Benachrichtigung mehr
        let summary = match self.call_ended_rx.try_recv() {
            Ok(summary) => summary,
            Err(_) => session.summary(),
        };
        drop(session);

        let channel = match summary.mode {
            CallMode::Audio => SessionChannel::Audio,
            CallMode::Video => SessionChannel::Video,
        };
        if let Err(e) = self.directory.record_session(NewSessionRecord {
            client_id: self.client_id.clone(),
            listener_id: self.listener.id,
            channel,
            started_at: summary.started_at,
            duration_seconds: summary.elapsed_seconds,
        }) {
            tracing::error!("Failed to record call {}: {}", summary.session_id, e);
        }

        Ok(summary)
    }
}

impl std::fmt::Debug for ChatRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRoom")
            .field("client_id", &self.client_id)
            .field("listener", &self.listener.name)
            .field("messages", &self.messages.len())
            .field("incoming_call", &self.incoming_call)
            .field("active_call", &self.active_call)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_session::SimulatedDevices;
    use crate::directory::SqliteDirectory;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn room() -> (ChatRoom, Arc<SqliteDirectory>, Arc<SimulatedDevices>) {
        let directory = Arc::new(SqliteDirectory::open_in_memory().unwrap());
        directory.seed_demo_listeners().unwrap();
        let devices = Arc::new(SimulatedDevices::new());
        let room = ChatRoom::open(
            "user",
            1,
            directory.clone(),
            devices.clone(),
            SessionTimings::default(),
        )
        .unwrap();
        (room, directory, devices)
    }

    #[tokio::test]
    async fn test_messages_and_replies() {
        let (mut room, _, _) = room();
        assert_eq!(room.messages().len(), 1);
        assert_eq!(room.messages()[0].author, MessageAuthor::Listener);

        assert!(room.send_message("   ").is_none());
        assert!(room.deliver_listener_reply().is_none());

        let sent = room.send_message("  I had a rough day ").unwrap();
        assert_eq!(sent.text, "I had a rough day");
        assert_eq!(sent.id, 2);
        assert_eq!(room.pending_replies(), 1);

        let reply = room.deliver_listener_reply().unwrap();
        assert_eq!(reply.author, MessageAuthor::Listener);
        assert_eq!(reply.id, 3);
        assert!(room.deliver_listener_reply().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_call_accept_and_end_records_history() {
        let (mut room, directory, _) = room();

        assert!(room.offer_incoming_call(CallMode::Video));
        assert!(!room.offer_incoming_call(CallMode::Audio));

        let session = room.accept_incoming_call().unwrap();
        assert_eq!(session.mode(), CallMode::Video);
        assert!(room.incoming_call().is_none());
        assert!(!room.offer_incoming_call(CallMode::Audio));

        tokio::time::sleep(std::time::Duration::from_millis(7500)).await;
        let summary = room.end_call().unwrap();
        assert_eq!(summary.elapsed_seconds, 5);
        assert_eq!(summary.receiver_id, "Listener1");
        assert!(room.active_call().is_none());

        let history = directory.sessions_for_client("user").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].channel, SessionChannel::Video);
        assert_eq!(history[0].duration_seconds, 5);
    }

    #[tokio::test]
    async fn test_cannot_start_two_calls() {
        let (mut room, _, _) = room();
        room.start_call(CallMode::Audio).unwrap();

        assert!(matches!(
            room.start_call(CallMode::Video),
            Err(ChatError::Call(CallSessionError::AlreadyInCall))
        ));
    }

    #[tokio::test]
    async fn test_session_ended_directly_is_reaped() {
        let (mut room, directory, _) = room();
        room.start_call(CallMode::Audio).unwrap();
        assert!(room.active_call().unwrap().end());

        room.start_call(CallMode::Video).unwrap();
        assert_eq!(room.active_call().unwrap().mode(), CallMode::Video);
        assert_eq!(directory.sessions_for_client("user").unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_session_still_records_history() {
        let (mut room, directory, _) = room();
        room.start_call(CallMode::Audio).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(4500)).await;
        assert!(room.active_call().unwrap().dispose());

        room.start_call(CallMode::Video).unwrap();
        assert_eq!(room.active_call().unwrap().mode(), CallMode::Video);

        let history = directory.sessions_for_client("user").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].channel, SessionChannel::Audio);
        assert_eq!(history[0].duration_seconds, 2);
    }

    #[tokio::test]
    async fn test_decline_and_missing_call_errors() {
        let (mut room, _, _) = room();
        assert!(matches!(
            room.decline_incoming_call(),
            Err(ChatError::Call(CallSessionError::NoIncomingCall))
        ));
        assert!(matches!(
            room.end_call(),
            Err(ChatError::Call(CallSessionError::NoActiveCall))
        ));

        let mut rng = StdRng::seed_from_u64(7);
        let mode = room.offer_random_incoming_call(&mut rng).unwrap();
        assert_eq!(room.decline_incoming_call().unwrap(), mode);
        assert!(room.incoming_call().is_none());
    }

    #[tokio::test]
    async fn test_end_call_releases_devices() {
        let (mut room, _, devices) = room();
        room.start_call(CallMode::Video).unwrap();
        room.end_call().unwrap();
        assert!(devices.live_tracks().is_empty());
    }
}
