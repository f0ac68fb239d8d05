// EchoVault Library - core of the terminal music player
// Library index, playback session, end-of-track monitor and the folder/track store.
// The TUI and the rodio engine sit behind the `tui` and `audio` features.

pub mod audio;      // engine seam, scanning, track metadata
pub mod config;     // settings and preferences
pub mod controller; // the one place commands mutate state
pub mod error;      // shared error type
pub mod library;    // watched directories + ordered track list
pub mod playback;   // session state machine + end-of-track monitor
pub mod store;      // SQLite folders/tracks/artists
#[cfg(feature = "tui")]
pub mod ui;         // terminal interface

pub use audio::{AudioEngine, CompletionSignal, MusicScanner, Track, TrackMetadata};
pub use config::{Config, MonitorConfig};
pub use controller::{Command, Controller, Outcome};
pub use error::{Result, VaultError};
pub use library::LibraryIndex;
pub use playback::{EndOfTrackMonitor, MonitorEvent, PlaybackSession, PlaybackState, SessionSnapshot};
pub use store::MetadataStore;
