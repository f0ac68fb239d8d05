pub mod engine;
#[cfg(feature = "audio")]
pub mod player;
pub mod scanner;
pub mod track;

pub use engine::{AudioEngine, CompletionSignal, EngineError};
#[cfg(feature = "audio")]
pub use player::RodioEngine;
pub use scanner::MusicScanner;
pub use track::{Track, TrackMetadata};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub volume: f32,      // 0.0 to 1.0
    pub volume_step: f32, // how much +/- moves the volume
    pub fade_in_ms: u64,  // milliseconds for smooth track start
    pub fade_out_ms: u64, // milliseconds for smooth track stop
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 0.7,
            volume_step: 0.1,
            fade_in_ms: 150,
            fade_out_ms: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Mp4,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            "ogg" => AudioFormat::Ogg,
            "mp4" => AudioFormat::Mp4,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(AudioFormat::from_extension)
            .unwrap_or(AudioFormat::Unknown)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown)
    }
}
