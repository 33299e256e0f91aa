//! Media Streams und Tracks
//!
//! Modelliert die widerrufbaren Stream-Handles, die vom Geräte-Layer
//! ausgegeben werden. Ein Stream ist ein geteiltes Handle über eine
//! geordnete Liste von Tracks; Klone zeigen auf denselben Stream.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Capture not supported: {0}")]
    Unsupported(String),
}

// ============================================================================
// TRACK TYPES
// ============================================================================

/// Art eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Quelle eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    pub fn kind(self) -> TrackKind {
        match self {
            TrackSource::Microphone => TrackKind::Audio,
            TrackSource::Camera | TrackSource::Screen => TrackKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Live,
    Ended,
}

struct TrackInner {
    id: String,
    source: TrackSource,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
    /// Wird nur gesetzt wenn die Quelle selbst endet (z.B. natives "Freigabe beenden")
    source_ended: watch::Sender<bool>,
}

/// Ein einzelner Audio- oder Video-Track
///
/// `stop()` beendet den Track lokal ohne Ended-Benachrichtigung,
/// `end_from_source()` beendet ihn und weckt alle `ended()`-Wartenden.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(source: TrackSource, label: impl Into<String>) -> Self {
        let (source_ended, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                source,
                label: label.into(),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                source_ended,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.source.kind()
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.inner.stopped.load(Ordering::SeqCst) {
            ReadyState::Ended
        } else {
            ReadyState::Live
        }
    }

    pub fn is_live(&self) -> bool {
        self.ready_state() == ReadyState::Live
    }

    /// Stoppt den Track und gibt das Gerät frei
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stopped {:?} track {}", self.inner.source, self.inner.id);
        }
    }

    /// Die Quelle hat den Track beendet
    pub fn end_from_source(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.source_ended.send_replace(true);
    }

    /// Wartet bis die Quelle den Track beendet.
    ///
    /// Gibt `false` zurück falls der Track verworfen wird ohne je
    /// von der Quelle beendet worden zu sein.
    pub async fn ended(&self) -> bool {
        let mut rx = self.inner.source_ended.subscribe();
        let ended = rx.wait_for(|ended| *ended).await.is_ok();
        ended
    }

    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("enabled", &self.is_enabled())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

// ============================================================================
// MEDIA STREAM
// ============================================================================

struct StreamInner {
    id: String,
    tracks: Mutex<Vec<MediaTrack>>,
}

/// Geteiltes Handle auf einen Media Stream
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4().to_string(),
                tracks: Mutex::new(tracks),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.inner.tracks.lock().clone()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.inner
            .tracks
            .lock()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn add_track(&self, track: MediaTrack) {
        let mut tracks = self.inner.tracks.lock();
        if !tracks.iter().any(|t| t.same_track(&track)) {
            tracks.push(track);
        }
    }

    pub fn remove_track(&self, track: &MediaTrack) -> bool {
        let mut tracks = self.inner.tracks.lock();
        let before = tracks.len();
        tracks.retain(|t| !t.same_track(track));
        tracks.len() != before
    }

    /// Ersetzt den ersten Video-Track und gibt den entfernten zurück
    pub fn replace_video_track(&self, replacement: MediaTrack) -> Option<MediaTrack> {
        let mut tracks = self.inner.tracks.lock();
        let previous = tracks
            .iter()
            .position(|t| t.kind() == TrackKind::Video)
            .map(|idx| tracks.remove(idx));
        tracks.push(replacement);
        previous
    }

    pub fn stop_all(&self) {
        for track in self.inner.tracks.lock().iter() {
            track.stop();
        }
    }

    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("tracks", &*self.inner.tracks.lock())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_video_track_keeps_audio() {
        let mic = MediaTrack::new(TrackSource::Microphone, "mic");
        let cam = MediaTrack::new(TrackSource::Camera, "cam");
        let stream = MediaStream::new(vec![mic.clone(), cam.clone()]);

        let screen = MediaTrack::new(TrackSource::Screen, "screen");
        let removed = stream.replace_video_track(screen.clone()).unwrap();

        assert!(removed.same_track(&cam));
        assert_eq!(stream.audio_tracks().len(), 1);
        assert!(stream.video_tracks()[0].same_track(&screen));
    }

    #[test]
    fn test_clones_share_tracks() {
        let stream = MediaStream::new(vec![]);
        let other = stream.clone();
        other.add_track(MediaTrack::new(TrackSource::Microphone, "mic"));

        assert!(stream.same_stream(&other));
        assert_eq!(stream.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_local_stop_does_not_signal_ended() {
        let track = MediaTrack::new(TrackSource::Screen, "screen");
        track.stop();
        assert!(!track.is_live());

        let waiter = track.clone();
        let handle = tokio::spawn(async move { waiter.ended().await });
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        track.end_from_source();
        assert!(handle.await.unwrap());
    }
}
