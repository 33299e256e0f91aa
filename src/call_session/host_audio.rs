//! Host-Audio über cpal
//!
//! Prüft das Standard-Eingabegerät des Hosts und liefert einen
//! Mikrofon-Track. Kamera und Bildschirmaufnahme sind hier nicht verfügbar.

use super::devices::{MediaConstraints, MediaDevices};
use super::media::{MediaError, MediaStream, MediaTrack, TrackSource};
use cpal::traits::{DeviceTrait, HostTrait};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;

/// Repräsentiert ein Audio-Gerät
#[derive(Debug, Clone, Serialize)]
pub struct AudioDevice {
    pub name: String,
    pub is_default: bool,
}

/// Gibt alle verfügbaren Eingabegeräte zurück
pub fn input_devices() -> Result<Vec<AudioDevice>, MediaError> {
    let host = cpal::default_host();
    let default_input = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?
        .filter_map(|d| {
            d.name().ok().map(|name| AudioDevice {
                is_default: Some(&name) == default_input.as_ref(),
                name,
            })
        })
        .collect();

    Ok(devices)
}

/// Geräte-Backend für den lokalen Host
#[derive(Debug, Default)]
pub struct HostAudioDevices;

impl HostAudioDevices {
    pub fn new() -> Self {
        Self
    }
}

impl MediaDevices for HostAudioDevices {
    fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> BoxFuture<'_, Result<MediaStream, MediaError>> {
        async move {
            if constraints.video {
                return Err(MediaError::Unsupported("camera capture".into()));
            }
            if !constraints.audio {
                return Ok(MediaStream::new(Vec::new()));
            }

            let name = tokio::task::spawn_blocking(|| {
                cpal::default_host()
                    .default_input_device()
                    .and_then(|d| d.name().ok())
            })
            .await
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?
            .ok_or_else(|| MediaError::DeviceUnavailable("no audio input device".into()))?;

            tracing::info!("Using host input device: {}", name);
            Ok(MediaStream::new(vec![MediaTrack::new(
                TrackSource::Microphone,
                name,
            )]))
        }
        .boxed()
    }

    fn get_display_media(&self) -> BoxFuture<'_, Result<MediaStream, MediaError>> {
        async { Err(MediaError::Unsupported("screen capture".into())) }.boxed()
    }
}
