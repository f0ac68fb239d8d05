//! Audio engine seam.
//!
//! The playback session owns exactly one engine and is the only caller of its
//! control methods. The end-of-track monitor only ever holds a
//! [`CompletionSignal`], which it reads.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot open file: {0}")]
    Open(#[from] std::io::Error),

    #[error("unsupported format or corrupted file: {0}")]
    Decode(String),

    #[error("audio output unavailable: {0}")]
    Output(String),
}

pub trait AudioEngine {
    /// Replaces whatever is loaded with `path`, ready to play from the start.
    fn load(&mut self, path: &Path) -> Result<(), EngineError>;
    fn play(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn set_volume(&mut self, volume: f32);
    /// Seconds into the loaded track, or a negative value when unknown.
    fn position(&self) -> f64;
    fn is_busy(&self) -> bool;
    fn completion_signal(&self) -> CompletionSignal;
}

/// Lock-free "track finished" flag shared between an engine and its watcher.
///
/// Every load gets a fresh id. A completion is only recorded for the load that
/// is still current, so a track that was stopped or replaced never reports.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    inner: Arc<SignalState>,
}

#[derive(Debug, Default)]
struct SignalState {
    current: AtomicU64,
    finished: AtomicU64,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new load and returns its id (ids start at 1).
    pub fn begin_load(&self) -> u64 {
        self.inner.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Makes any pending completion stale, e.g. after `stop()`.
    pub fn invalidate(&self) {
        self.inner.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current_load(&self) -> u64 {
        self.inner.current.load(Ordering::SeqCst)
    }

    /// Called from the audio side when load `id` plays to its end.
    pub fn mark_finished(&self, id: u64) -> bool {
        if self.current_load() != id {
            return false;
        }
        self.inner.finished.store(id, Ordering::SeqCst);
        true
    }

    /// Id of the most recent load that finished naturally, 0 if none yet.
    pub fn last_finished(&self) -> u64 {
        self.inner.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[derive(Debug, Clone, PartialEq)]
    pub enum EngineCall {
        Load(PathBuf),
        Play,
        Pause,
        Resume,
        Stop,
        Volume(f32),
    }

    /// Records every command; files listed in `broken` fail to load.
    #[derive(Debug, Default)]
    pub struct MockEngine {
        pub calls: Vec<EngineCall>,
        pub broken: HashSet<PathBuf>,
        pub position: f64,
        pub busy: bool,
        signal: CompletionSignal,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self {
                position: -1.0,
                ..Default::default()
            }
        }

        /// Pretends the current track played to its end.
        pub fn finish_current(&self) -> u64 {
            let id = self.signal.current_load();
            self.signal.mark_finished(id);
            id
        }
    }

    impl AudioEngine for MockEngine {
        fn load(&mut self, path: &Path) -> Result<(), EngineError> {
            self.calls.push(EngineCall::Load(path.to_path_buf()));
            self.signal.invalidate();
            if self.broken.contains(path) {
                self.busy = false;
                return Err(EngineError::Decode("mock decoder refused".to_string()));
            }
            self.signal.begin_load();
            self.position = 0.0;
            Ok(())
        }

        fn play(&mut self) {
            self.calls.push(EngineCall::Play);
            self.busy = true;
        }

        fn pause(&mut self) {
            self.calls.push(EngineCall::Pause);
            self.busy = false;
        }

        fn resume(&mut self) {
            self.calls.push(EngineCall::Resume);
            self.busy = true;
        }

        fn stop(&mut self) {
            self.calls.push(EngineCall::Stop);
            self.signal.invalidate();
            self.busy = false;
            self.position = -1.0;
        }

        fn set_volume(&mut self, volume: f32) {
            self.calls.push(EngineCall::Volume(volume));
        }

        fn position(&self) -> f64 {
            self.position
        }

        fn is_busy(&self) -> bool {
            self.busy
        }

        fn completion_signal(&self) -> CompletionSignal {
            self.signal.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_only_counts_for_current_load() {
        let signal = CompletionSignal::new();
        let first = signal.begin_load();
        let second = signal.begin_load();

        assert!(!signal.mark_finished(first));
        assert_eq!(signal.last_finished(), 0);

        assert!(signal.mark_finished(second));
        assert_eq!(signal.last_finished(), second);
    }

    #[test]
    fn test_invalidate_discards_pending_completion() {
        let signal = CompletionSignal::new();
        let id = signal.begin_load();
        signal.invalidate();

        assert!(!signal.mark_finished(id));
        assert_eq!(signal.last_finished(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let signal = CompletionSignal::new();
        let watcher = signal.clone();
        let id = signal.begin_load();
        signal.mark_finished(id);
        assert_eq!(watcher.last_finished(), id);
    }
}
