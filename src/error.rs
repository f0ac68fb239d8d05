// Error taxonomy shared by the library index, playback session and store.
// Scan and load failures come back as values so the UI can show them and move on.

use crate::audio::EngineError;
use crate::playback::PlaybackState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("not an existing directory: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("directory already added: {}", .0.display())]
    DuplicateDirectory(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("track index {index} is out of range ({len} tracks)")]
    OutOfRange { index: usize, len: usize },

    #[error("failed to load '{}': {source}", path.display())]
    LoadError {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("scan error at '{}': {message}", path.display())]
    ScanIoError { path: PathBuf, message: String },

    #[error("a library scan is already in progress")]
    ScanInProgress,

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: PlaybackState,
    },

    #[error("metadata store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;
