//! Call Session Module - Anruf-Lebenszyklus und Medien
//!
//! Dieses Modul verwaltet:
//! - Den Zustand eines einzelnen Audio/Video-Anrufs
//! - Kamera/Mikrofon- und Bildschirmaufnahme über `MediaDevices`
//! - Mute, Kamera und Bildschirmfreigabe
//! - Den Gesprächstimer

mod devices;
#[cfg(feature = "host-audio")]
mod host_audio;
mod media;
mod session;

pub use devices::{MediaConstraints, MediaDevices, SimulatedDevices};
#[cfg(feature = "host-audio")]
pub use host_audio::{input_devices, AudioDevice, HostAudioDevices};
pub use media::{MediaError, MediaStream, MediaTrack, ReadyState, TrackKind, TrackSource};
pub use session::{
    format_duration, CallMode, CallSession, CallSessionError, CallSnapshot, CallSummary,
    ConnectionState, SessionEvent, SessionTimings,
};
