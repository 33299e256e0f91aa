//! Geräte-Schnittstelle für Kamera, Mikrofon und Bildschirmaufnahme
//!
//! `MediaDevices` ist die einzige Grenze zwischen der Call Session und
//! den Capture-Fähigkeiten der Plattform. `SimulatedDevices` liefert
//! In-Process-Geräte mit konfigurierbarer Latenz und Fehlern.

use super::media::{MediaError, MediaStream, MediaTrack, TrackSource};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::time::Duration;

// ============================================================================
// CONSTRAINTS
// ============================================================================

/// Welche Tracks bei `get_user_media` angefordert werden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub const AUDIO_VIDEO: Self = Self {
        audio: true,
        video: true,
    };

    pub const VIDEO_ONLY: Self = Self {
        audio: false,
        video: true,
    };
}

// ============================================================================
// DEVICE CAPABILITY
// ============================================================================

/// Capture-Fähigkeiten der Plattform
pub trait MediaDevices: Send + Sync {
    /// Fordert Kamera und/oder Mikrofon an
    fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> BoxFuture<'_, Result<MediaStream, MediaError>>;

    /// Fordert eine Bildschirmaufnahme an
    fn get_display_media(&self) -> BoxFuture<'_, Result<MediaStream, MediaError>>;
}

// ============================================================================
// SIMULATED DEVICES
// ============================================================================

#[derive(Default)]
struct SimulatedState {
    issued: Vec<MediaTrack>,
    camera_error: Option<MediaError>,
    display_error: Option<MediaError>,
    camera_missing: bool,
    user_media_requests: usize,
    display_media_requests: usize,
}

/// In-Process-Geräte für Demo und Tests
///
/// Jeder ausgegebene Track wird protokolliert, sodass geprüft werden kann,
/// dass nach dem Abbau kein Gerät mehr aktiv ist.
pub struct SimulatedDevices {
    latency: Duration,
    state: Mutex<SimulatedState>,
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            state: Mutex::new(SimulatedState::default()),
        }
    }

    /// Lässt künftige Kamera/Mikrofon-Anfragen fehlschlagen
    pub fn fail_user_media(&self, error: MediaError) {
        self.state.lock().camera_error = Some(error);
    }

    /// Lässt künftige Bildschirm-Anfragen fehlschlagen
    pub fn fail_display_media(&self, error: MediaError) {
        self.state.lock().display_error = Some(error);
    }

    /// Künftige Kamera-Anfragen liefern keinen Video-Track
    pub fn omit_camera_tracks(&self) {
        self.state.lock().camera_missing = true;
    }

    pub fn issued_tracks(&self) -> Vec<MediaTrack> {
        self.state.lock().issued.clone()
    }

    pub fn live_tracks(&self) -> Vec<MediaTrack> {
        self.state
            .lock()
            .issued
            .iter()
            .filter(|t| t.is_live())
            .cloned()
            .collect()
    }

    pub fn user_media_requests(&self) -> usize {
        self.state.lock().user_media_requests
    }

    pub fn display_media_requests(&self) -> usize {
        self.state.lock().display_media_requests
    }

    /// Simuliert das native "Freigabe beenden" des Betriebssystems.
    ///
    /// Gibt `true` zurück falls eine aktive Bildschirmaufnahme beendet wurde.
    pub fn end_screen_capture(&self) -> bool {
        let screens: Vec<MediaTrack> = self
            .state
            .lock()
            .issued
            .iter()
            .filter(|t| t.source() == TrackSource::Screen && t.is_live())
            .cloned()
            .collect();

        for track in &screens {
            track.end_from_source();
        }
        !screens.is_empty()
    }

    fn issue(&self, sources: &[(TrackSource, &str)]) -> MediaStream {
        let tracks: Vec<MediaTrack> = sources
            .iter()
            .map(|(source, label)| MediaTrack::new(*source, *label))
            .collect();
        self.state.lock().issued.extend(tracks.iter().cloned());
        MediaStream::new(tracks)
    }
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for SimulatedDevices {
    fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> BoxFuture<'_, Result<MediaStream, MediaError>> {
        async move {
            self.state.lock().user_media_requests += 1;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let camera_missing = {
                let state = self.state.lock();
                if let Some(err) = state.camera_error.clone() {
                    return Err(err);
                }
                state.camera_missing
            };

            let mut sources = Vec::new();
            if constraints.audio {
                sources.push((TrackSource::Microphone, "Simulated Microphone"));
            }
            if constraints.video && !camera_missing {
                sources.push((TrackSource::Camera, "Simulated Camera"));
            }
            Ok(self.issue(&sources))
        }
        .boxed()
    }

    fn get_display_media(&self) -> BoxFuture<'_, Result<MediaStream, MediaError>> {
        async move {
            self.state.lock().display_media_requests += 1;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            if let Some(err) = self.state.lock().display_error.clone() {
                return Err(err);
            }

            Ok(self.issue(&[(TrackSource::Screen, "Simulated Screen")]))
        }
        .boxed()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_session::media::TrackKind;

    #[tokio::test]
    async fn test_user_media_respects_constraints() {
        let devices = SimulatedDevices::new();

        let stream = devices
            .get_user_media(MediaConstraints::VIDEO_ONLY)
            .await
            .unwrap();
        assert!(stream.audio_tracks().is_empty());
        assert_eq!(stream.video_tracks()[0].kind(), TrackKind::Video);

        let stream = devices
            .get_user_media(MediaConstraints::AUDIO_VIDEO)
            .await
            .unwrap();
        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(devices.user_media_requests(), 2);
    }

    #[tokio::test]
    async fn test_denied_camera() {
        let devices = SimulatedDevices::new();
        devices.fail_user_media(MediaError::PermissionDenied("camera".into()));

        let result = devices.get_user_media(MediaConstraints::AUDIO_VIDEO).await;
        assert_eq!(
            result.unwrap_err(),
            MediaError::PermissionDenied("camera".into())
        );
        assert!(devices.issued_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_missing_camera_yields_no_video() {
        let devices = SimulatedDevices::new();
        devices.omit_camera_tracks();

        let stream = devices
            .get_user_media(MediaConstraints::AUDIO_VIDEO)
            .await
            .unwrap();
        assert_eq!(stream.audio_tracks().len(), 1);
        assert!(stream.video_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_end_screen_capture_only_hits_live_screens() {
        let devices = SimulatedDevices::new();
        assert!(!devices.end_screen_capture());

        let screen = devices.get_display_media().await.unwrap();
        assert!(devices.end_screen_capture());
        assert!(!screen.video_tracks()[0].is_live());
        assert!(!devices.end_screen_capture());
    }
}
