//! Call Session Controller
//!
//! Steuert den Lebenszyklus eines einzelnen Audio/Video-Anrufs:
//! Connecting -> Connected -> Disposed, lokale Medien, Mute/Kamera/
//! Bildschirmfreigabe und den Gesprächstimer.
//!
//! Es gibt keinen Signaling-Server und keine Peer Connection; der
//! "Remote"-Stream ist für die Vorschau dasselbe Handle wie der lokale.

use super::devices::{MediaConstraints, MediaDevices};
use super::media::{MediaError, MediaStream, MediaTrack, TrackSource};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallSessionError {
    #[error("No active call")]
    NoActiveCall,

    #[error("Already in a call")]
    AlreadyInCall,

    #[error("No incoming call")]
    NoIncomingCall,
}

// ============================================================================
// CALL STATE
// ============================================================================

/// Art des Anrufs, fest für die gesamte Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMode {
    Audio,
    Video,
}

/// Verbindungsstatus eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Verbindung wird (simuliert) hergestellt
    Connecting,
    /// Anruf aktiv, Timer läuft
    Connected,
    /// Abgebaut, endgültig
    Disposed,
}

/// Events die von der CallSession ausgelöst werden
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    Tick { elapsed_seconds: u64 },
    LocalStreamAttached,
    RemoteStreamAttached,
    ScreenShareChanged(bool),
    MediaUnavailable(MediaError),
}

/// Zeitkonstanten der Simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub connect_delay: Duration,
    pub remote_preview_delay: Duration,
    pub tick_period: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(2000),
            remote_preview_delay: Duration::from_millis(1000),
            tick_period: Duration::from_secs(1),
        }
    }
}

/// Wird beim Auflegen genau einmal an den Host übergeben
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSummary {
    pub session_id: Uuid,
    pub mode: CallMode,
    pub caller_id: String,
    pub receiver_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
}

/// Serialisierbare Sicht auf den aktuellen Zustand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub session_id: Uuid,
    pub mode: CallMode,
    pub state: ConnectionState,
    pub caller_id: String,
    pub receiver_id: String,
    pub elapsed_seconds: u64,
    pub duration: String,
    pub microphone_muted: bool,
    pub camera_disabled: bool,
    pub screen_sharing: bool,
    pub has_local_stream: bool,
    pub has_remote_stream: bool,
}

/// Formatiert Sekunden als MM:SS
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

// ============================================================================
// SESSION INTERNALS
// ============================================================================

type EndCallback = Box<dyn FnOnce(CallSummary) + Send>;

struct SessionState {
    connection: ConnectionState,
    elapsed_seconds: u64,
    microphone_muted: bool,
    camera_disabled: bool,
    screen_sharing: bool,
    /// Eine Bildschirm- oder Kamera-Anfrage ist unterwegs
    acquisition_pending: bool,
    share_generation: u64,
    local_stream: Option<MediaStream>,
    remote_stream: Option<MediaStream>,
    tasks: Vec<AbortHandle>,
    screen_watch: Option<JoinHandle<()>>,
}

struct SessionInner {
    id: Uuid,
    mode: CallMode,
    caller_id: String,
    receiver_id: String,
    started_at: DateTime<Utc>,
    timings: SessionTimings,
    devices: Arc<dyn MediaDevices>,
    state: Mutex<SessionState>,
    on_end: Mutex<Option<EndCallback>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Registriert einen Hintergrund-Task; nach dem Abbau wird er sofort abgebrochen
    fn track_task(&self, handle: AbortHandle) {
        let mut state = self.state.lock();
        if state.connection == ConnectionState::Disposed {
            handle.abort();
        } else {
            state.tasks.retain(|task| !task.is_finished());
            state.tasks.push(handle);
        }
    }

    async fn run_connect(self: Arc<Self>) {
        tokio::time::sleep(self.timings.connect_delay).await;

        {
            let mut state = self.state.lock();
            if state.connection != ConnectionState::Connecting {
                return;
            }
            state.connection = ConnectionState::Connected;
        }
        tracing::info!("Call {} connected", self.id);
        self.emit(SessionEvent::StateChanged(ConnectionState::Connected));

        let ticker = tokio::spawn(Arc::clone(&self).run_ticker());
        self.track_task(ticker.abort_handle());

        if self.mode == CallMode::Video {
            self.acquire_local_media().await;
        }
    }

    async fn run_ticker(self: Arc<Self>) {
        let period = self.timings.tick_period;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            interval.tick().await;

            let elapsed_seconds = {
                let mut state = self.state.lock();
                if state.connection != ConnectionState::Connected {
                    break;
                }
                state.elapsed_seconds += 1;
                state.elapsed_seconds
            };
            tracing::trace!("Call {} at {}s", self.id, elapsed_seconds);
            self.emit(SessionEvent::Tick { elapsed_seconds });
        }
    }

    async fn acquire_local_media(&self) {
        let stream = match self
            .devices
            .get_user_media(MediaConstraints::AUDIO_VIDEO)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Error accessing media devices: {}", e);
                self.emit(SessionEvent::MediaUnavailable(e));
                return;
            }
        };

        {
            let mut state = self.state.lock();
            if state.connection == ConnectionState::Disposed {
                drop(state);
                tracing::debug!("Call {} already disposed, releasing media", self.id);
                stream.stop_all();
                return;
            }

            for track in stream.audio_tracks() {
                track.set_enabled(!state.microphone_muted);
            }
            for track in stream.video_tracks() {
                track.set_enabled(!state.camera_disabled);
            }
            state.local_stream = Some(stream);
        }
        tracing::info!("Call {}: local media attached", self.id);
        self.emit(SessionEvent::LocalStreamAttached);

        // Ohne echten Peer wird der lokale Stream als Remote-Vorschau gezeigt
        tokio::time::sleep(self.timings.remote_preview_delay).await;

        {
            let mut state = self.state.lock();
            if state.connection != ConnectionState::Connected {
                return;
            }
            let Some(local) = state.local_stream.clone() else {
                return;
            };
            state.remote_stream = Some(local);
        }
        self.emit(SessionEvent::RemoteStreamAttached);
    }

    async fn toggle_screen_share(self: Arc<Self>) -> bool {
        let turning_on = {
            let mut state = self.state.lock();
            if state.connection != ConnectionState::Connected {
                return state.screen_sharing;
            }
            if state.acquisition_pending {
                tracing::debug!("Ignoring screen share toggle, acquisition in flight");
                return state.screen_sharing;
            }
            state.acquisition_pending = true;

            if state.screen_sharing {
                state.screen_sharing = false;
                state.share_generation += 1;
                if let Some(watch) = state.screen_watch.take() {
                    watch.abort();
                }
                false
            } else {
                true
            }
        };

        if turning_on {
            self.start_screen_share().await
        } else {
            tracing::info!("Call {}: screen sharing stopped", self.id);
            self.emit(SessionEvent::ScreenShareChanged(false));
            self.restore_camera().await;
            false
        }
    }

    async fn start_screen_share(self: Arc<Self>) -> bool {
        let result = self.devices.get_display_media().await;

        let mut state = self.state.lock();
        state.acquisition_pending = false;

        let screen = match result {
            Ok(screen) => screen,
            Err(e) => {
                drop(state);
                tracing::warn!("Error sharing screen: {}", e);
                self.emit(SessionEvent::MediaUnavailable(e));
                return false;
            }
        };

        if state.connection == ConnectionState::Disposed {
            drop(state);
            screen.stop_all();
            return false;
        }

        let Some(screen_track) = screen.video_tracks().into_iter().next() else {
            drop(state);
            tracing::warn!("Display capture returned no video track");
            screen.stop_all();
            return false;
        };

        match state.local_stream.clone() {
            Some(local) => {
                if let Some(camera) = local.replace_video_track(screen_track.clone()) {
                    camera.stop();
                }
            }
            None => state.local_stream = Some(MediaStream::new(vec![screen_track.clone()])),
        }

        state.screen_sharing = true;
        state.share_generation += 1;
        let generation = state.share_generation;
        state.screen_watch = Some(tokio::spawn(
            Arc::clone(&self).watch_screen_end(screen_track, generation),
        ));
        drop(state);

        tracing::info!("Call {}: screen sharing started", self.id);
        self.emit(SessionEvent::ScreenShareChanged(true));
        true
    }

    /// Reagiert auf das native "Freigabe beenden" der Plattform
    async fn watch_screen_end(self: Arc<Self>, track: MediaTrack, generation: u64) {
        if !track.ended().await {
            return;
        }

        {
            let mut state = self.state.lock();
            if state.connection != ConnectionState::Connected
                || !state.screen_sharing
                || state.share_generation != generation
            {
                return;
            }
            state.screen_sharing = false;
            state.acquisition_pending = true;
        }

        tracing::info!("Call {}: screen capture ended by platform", self.id);
        self.emit(SessionEvent::ScreenShareChanged(false));
        self.restore_camera().await;
    }

    async fn restore_camera(&self) {
        let result = self
            .devices
            .get_user_media(MediaConstraints::VIDEO_ONLY)
            .await;

        let mut state = self.state.lock();
        state.acquisition_pending = false;

        if state.connection == ConnectionState::Disposed {
            drop(state);
            if let Ok(camera) = result {
                camera.stop_all();
            }
            return;
        }

        let camera = match result {
            Ok(camera) => camera,
            Err(e) => {
                Self::release_screen_tracks(&state);
                drop(state);
                tracing::warn!("Error restoring camera: {}", e);
                self.emit(SessionEvent::MediaUnavailable(e));
                return;
            }
        };

        let Some(camera_track) = camera.video_tracks().into_iter().next() else {
            Self::release_screen_tracks(&state);
            drop(state);
            camera.stop_all();
            tracing::warn!("Camera capture returned no video track");
            return;
        };
        camera_track.set_enabled(!state.camera_disabled);

        match state.local_stream.clone() {
            Some(local) => {
                if let Some(screen) = local.replace_video_track(camera_track) {
                    screen.stop();
                }
            }
            None => state.local_stream = Some(MediaStream::new(vec![camera_track])),
        }
        drop(state);
        tracing::info!("Call {}: camera restored", self.id);
    }

    /// Entfernt und stoppt Bildschirm-Tracks im lokalen Stream (ohne Video weiter)
    fn release_screen_tracks(state: &SessionState) {
        if let Some(local) = &state.local_stream {
            for track in local.video_tracks() {
                if track.source() == TrackSource::Screen {
                    local.remove_track(&track);
                    track.stop();
                }
            }
        }
    }

    /// Baut die Session ab. Gibt `false` zurück falls bereits abgebaut.
    fn teardown(&self) -> bool {
        let (streams, tasks, screen_watch) = {
            let mut state = self.state.lock();
            if state.connection == ConnectionState::Disposed {
                return false;
            }
            state.connection = ConnectionState::Disposed;
            state.screen_sharing = false;
            let streams = [state.local_stream.take(), state.remote_stream.take()];
            (
                streams,
                std::mem::take(&mut state.tasks),
                state.screen_watch.take(),
            )
        };

        for task in tasks {
            task.abort();
        }
        if let Some(watch) = screen_watch {
            watch.abort();
        }
        for stream in streams.into_iter().flatten() {
            stream.stop_all();
        }

        tracing::info!("Call {} disposed", self.id);
        self.emit(SessionEvent::StateChanged(ConnectionState::Disposed));
        true
    }

    fn summary(&self) -> CallSummary {
        CallSummary {
            session_id: self.id,
            mode: self.mode,
            caller_id: self.caller_id.clone(),
            receiver_id: self.receiver_id.clone(),
            started_at: self.started_at,
            elapsed_seconds: self.state.lock().elapsed_seconds,
        }
    }
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Ein einzelner Anruf
///
/// Das Handle besitzt die Session: wird es verworfen, wird die Session
/// ohne Callback abgebaut.
pub struct CallSession {
    inner: Arc<SessionInner>,
}

impl CallSession {
    /// Startet eine neue Session im Zustand Connecting.
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn start<F>(
        mode: CallMode,
        caller_id: impl Into<String>,
        receiver_id: impl Into<String>,
        devices: Arc<dyn MediaDevices>,
        timings: SessionTimings,
        on_end: F,
    ) -> Self
    where
        F: FnOnce(CallSummary) + Send + 'static,
    {
        let (event_tx, _) = broadcast::channel(100);

        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            mode,
            caller_id: caller_id.into(),
            receiver_id: receiver_id.into(),
            started_at: Utc::now(),
            timings,
            devices,
            state: Mutex::new(SessionState {
                connection: ConnectionState::Connecting,
                elapsed_seconds: 0,
                microphone_muted: false,
                camera_disabled: false,
                screen_sharing: false,
                acquisition_pending: false,
                share_generation: 0,
                local_stream: None,
                remote_stream: None,
                tasks: Vec::new(),
                screen_watch: None,
            }),
            on_end: Mutex::new(Some(Box::new(on_end))),
            event_tx,
        });

        tracing::info!(
            "Starting {:?} call {} ({} -> {})",
            mode,
            inner.id,
            inner.caller_id,
            inner.receiver_id
        );

        let connect = tokio::spawn(Arc::clone(&inner).run_connect());
        inner.track_task(connect.abort_handle());

        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn mode(&self) -> CallMode {
        self.inner.mode
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.inner.state.lock().elapsed_seconds
    }

    pub fn is_muted(&self) -> bool {
        self.inner.state.lock().microphone_muted
    }

    pub fn is_camera_disabled(&self) -> bool {
        self.inner.state.lock().camera_disabled
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.inner.state.lock().screen_sharing
    }

    pub fn local_stream(&self) -> Option<MediaStream> {
        self.inner.state.lock().local_stream.clone()
    }

    pub fn remote_stream(&self) -> Option<MediaStream> {
        self.inner.state.lock().remote_stream.clone()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let state = self.inner.state.lock();
        CallSnapshot {
            session_id: self.inner.id,
            mode: self.inner.mode,
            state: state.connection,
            caller_id: self.inner.caller_id.clone(),
            receiver_id: self.inner.receiver_id.clone(),
            elapsed_seconds: state.elapsed_seconds,
            duration: format_duration(state.elapsed_seconds),
            microphone_muted: state.microphone_muted,
            camera_disabled: state.camera_disabled,
            screen_sharing: state.screen_sharing,
            has_local_stream: state.local_stream.is_some(),
            has_remote_stream: state.remote_stream.is_some(),
        }
    }

    /// Schaltet das Mikrofon stumm bzw. wieder an. Gibt den neuen Status zurück.
    pub fn toggle_mute(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.connection == ConnectionState::Disposed {
            return state.microphone_muted;
        }

        state.microphone_muted = !state.microphone_muted;
        if let Some(stream) = &state.local_stream {
            for track in stream.audio_tracks() {
                track.set_enabled(!state.microphone_muted);
            }
        }
        tracing::debug!("Call {}: muted = {}", self.inner.id, state.microphone_muted);
        state.microphone_muted
    }

    /// Schaltet die Kamera ab bzw. an. Bei Audio-Anrufen ohne Wirkung.
    pub fn toggle_video(&self) -> bool {
        let mut state = self.inner.state.lock();
        if self.inner.mode == CallMode::Audio || state.connection == ConnectionState::Disposed {
            return state.camera_disabled;
        }

        state.camera_disabled = !state.camera_disabled;
        if let Some(stream) = &state.local_stream {
            for track in stream.video_tracks() {
                track.set_enabled(!state.camera_disabled);
            }
        }
        tracing::debug!(
            "Call {}: camera disabled = {}",
            self.inner.id,
            state.camera_disabled
        );
        state.camera_disabled
    }

    /// Startet bzw. beendet die Bildschirmfreigabe.
    ///
    /// Nur bei verbundenen Video-Anrufen wirksam. Solange eine vorherige
    /// Anfrage noch läuft, wird der Aufruf ignoriert.
    pub async fn toggle_screen_share(&self) -> bool {
        if self.inner.mode == CallMode::Audio {
            return false;
        }

        // Läuft als eigener Task weiter, auch wenn der Aufrufer abbricht
        let toggle = tokio::spawn(Arc::clone(&self.inner).toggle_screen_share());
        self.inner.track_task(toggle.abort_handle());
        match toggle.await {
            Ok(sharing) => sharing,
            Err(_) => self.inner.state.lock().screen_sharing,
        }
    }

    /// Legt auf und benachrichtigt den Host genau einmal.
    ///
    /// Gibt `false` zurück falls die Session bereits abgebaut war.
    pub fn end(&self) -> bool {
        if !self.inner.teardown() {
            return false;
        }

        let summary = self.inner.summary();
        let on_end = self.inner.on_end.lock().take();
        if let Some(on_end) = on_end {
            on_end(summary);
        }
        true
    }

    /// Baut die Session ab ohne den Host zu benachrichtigen
    pub fn dispose(&self) -> bool {
        self.inner.teardown()
    }

    /// Aktuelle Zusammenfassung, auch nach `dispose()` abrufbar
    pub fn summary(&self) -> CallSummary {
        self.inner.summary()
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("state", &self.state())
            .field("elapsed_seconds", &self.elapsed_seconds())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
