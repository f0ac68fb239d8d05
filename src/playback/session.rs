//! Playback session state machine.
//!
//! `PlaybackSession` owns the audio engine and decides what plays next. It
//! never holds the track list itself: every transition is given the library's
//! current sequence, so the index it keeps is always checked against the
//! list it is about to be used with.

use crate::audio::{AudioEngine, CompletionSignal, Track};
use crate::error::{Result, VaultError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing is audible. The index may still point at the last track.
    #[default]
    Idle,
    /// A track is loaded and paused.
    Loaded,
    Playing,
}

/// Immutable view handed to the presentation layer after each transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub current_index: Option<usize>,
    pub loaded_path: Option<PathBuf>,
    pub is_playing: bool,
    pub volume: f32,
    pub position_seconds: f64,
    pub shuffle: bool,
    pub repeat: bool,
}

pub struct PlaybackSession<E: AudioEngine> {
    engine: E,
    state: PlaybackState,
    current_index: Option<usize>,
    loaded_path: Option<PathBuf>,
    volume: f32,
    position_seconds: f64,
    shuffle: bool,
    repeat: bool,
    // Load id of the track the engine is playing for us, if any.
    load_id: Option<u64>,
    rng: StdRng,
}

impl<E: AudioEngine> PlaybackSession<E> {
    pub fn new(engine: E, volume: f32) -> Self {
        Self::with_rng(engine, volume, StdRng::from_entropy())
    }

    /// Same as `new` with a caller-provided generator for shuffle picks.
    pub fn with_rng(mut engine: E, volume: f32, rng: StdRng) -> Self {
        let volume = sanitize_volume(volume, 0.7);
        engine.set_volume(volume);

        Self {
            engine,
            state: PlaybackState::Idle,
            current_index: None,
            loaded_path: None,
            volume,
            position_seconds: 0.0,
            shuffle: false,
            repeat: false,
            load_id: None,
            rng,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn loaded_path(&self) -> Option<&Path> {
        self.loaded_path.as_deref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn position_seconds(&self) -> f64 {
        self.position_seconds
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Handle for the end-of-track monitor. Reading only.
    pub fn completion_signal(&self) -> CompletionSignal {
        self.engine.completion_signal()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            current_index: self.current_index,
            loaded_path: self.loaded_path.clone(),
            is_playing: self.state == PlaybackState::Playing,
            volume: self.volume,
            position_seconds: self.position_seconds,
            shuffle: self.shuffle,
            repeat: self.repeat,
        }
    }

    /// Loads and plays `tracks[index]` from the top.
    ///
    /// An out-of-range index changes nothing. A load failure still moves the
    /// index to the failed track, so a following `next()` skips past it.
    pub fn select(&mut self, tracks: &[Track], index: usize) -> Result<()> {
        let track = tracks.get(index).ok_or(VaultError::OutOfRange {
            index,
            len: tracks.len(),
        })?;

        self.current_index = Some(index);
        self.loaded_path = Some(track.path.clone());
        self.position_seconds = 0.0;

        if let Err(source) = self.engine.load(&track.path) {
            warn!("Could not load {}: {}", track.path.display(), source);
            self.engine.stop();
            self.state = PlaybackState::Idle;
            self.load_id = None;
            return Err(VaultError::LoadError {
                path: track.path.clone(),
                source,
            });
        }

        self.load_id = Some(self.engine.completion_signal().current_load());
        self.engine.play();
        self.state = PlaybackState::Playing;
        info!("Playing #{} {}", index, track.path.display());
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Err(self.invalid("pause"));
        }
        self.refresh_position();
        self.engine.pause();
        self.state = PlaybackState::Loaded;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != PlaybackState::Loaded || self.loaded_path.is_none() {
            return Err(self.invalid("resume"));
        }
        self.engine.resume();
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Silences playback and rewinds. The index is kept so `play()` can start
    /// the same track again.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == PlaybackState::Idle {
            return Err(self.invalid("stop"));
        }
        self.engine.stop();
        self.state = PlaybackState::Idle;
        self.position_seconds = 0.0;
        self.load_id = None;
        Ok(())
    }

    /// Plays without choosing: resumes a paused track, restarts a stopped one,
    /// or behaves like `next()` when nothing was ever selected.
    pub fn play(&mut self, tracks: &[Track]) -> Result<Option<usize>> {
        match (self.state, self.current_index) {
            (PlaybackState::Playing, index) => Ok(index),
            (PlaybackState::Loaded, index) => self.resume().map(|_| index),
            (PlaybackState::Idle, Some(index)) if index < tracks.len() => {
                self.select(tracks, index).map(|_| Some(index))
            }
            (PlaybackState::Idle, _) => self.next(tracks),
        }
    }

    pub fn toggle_play_pause(&mut self, tracks: &[Track]) -> Result<Option<usize>> {
        match self.state {
            PlaybackState::Playing => self.pause().map(|_| self.current_index),
            _ => self.play(tracks),
        }
    }

    /// Random pick when shuffling (repeats allowed), otherwise the following
    /// track with wrap-around. No selection counts as index -1.
    pub fn next(&mut self, tracks: &[Track]) -> Result<Option<usize>> {
        if tracks.is_empty() {
            return Ok(None);
        }
        let len = tracks.len();
        let index = if self.shuffle {
            self.rng.gen_range(0..len)
        } else {
            self.current_index.map_or(0, |current| (current + 1) % len)
        };

        self.select(tracks, index).map(|_| Some(index))
    }

    /// The preceding track with wrap-around; shuffle has no effect here.
    pub fn previous(&mut self, tracks: &[Track]) -> Result<Option<usize>> {
        if tracks.is_empty() {
            return Ok(None);
        }
        let len = tracks.len();
        let index = self
            .current_index
            .map_or(len - 1, |current| (current % len + len - 1) % len);

        self.select(tracks, index).map(|_| Some(index))
    }

    /// Reaction to the engine finishing load `load_id`.
    ///
    /// Completions for a load that was stopped, replaced or already handled
    /// are ignored and return `Ok(None)`. A completion that lands after the
    /// user paused still advances; the following track is left paused.
    pub fn on_track_end(&mut self, tracks: &[Track], load_id: u64) -> Result<Option<usize>> {
        if !self.is_current_load(load_id) {
            debug!("Ignoring stale completion for load #{}", load_id);
            return Ok(None);
        }
        let was_paused = self.state == PlaybackState::Loaded;
        self.load_id = None;

        let advanced = match self.current_index {
            Some(index) if self.repeat && index < tracks.len() => {
                self.select(tracks, index).map(|_| Some(index))
            }
            _ => self.next(tracks),
        }?;

        if was_paused && self.state == PlaybackState::Playing {
            self.pause()?;
        }
        Ok(advanced)
    }

    /// True when `load_id` is the load this session is still holding.
    /// `stop` and every new selection retire the previous id.
    pub fn is_current_load(&self, load_id: u64) -> bool {
        self.load_id == Some(load_id)
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = sanitize_volume(volume, self.volume);
        self.engine.set_volume(self.volume);
    }

    pub fn adjust_volume(&mut self, delta: f32) -> f32 {
        self.set_volume(self.volume + delta);
        self.volume
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        self.shuffle
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat = !self.repeat;
        self.repeat
    }

    /// Pulls the position from the engine. A negative reading means the
    /// engine doesn't know; the last value is kept.
    pub fn refresh_position(&mut self) -> f64 {
        if self.state != PlaybackState::Idle {
            let position = self.engine.position();
            if position >= 0.0 {
                self.position_seconds = position;
            }
        }
        self.position_seconds
    }

    /// Stops and forgets the current track entirely.
    pub fn invalidate(&mut self) {
        if self.state != PlaybackState::Idle {
            self.engine.stop();
        }
        self.state = PlaybackState::Idle;
        self.current_index = None;
        self.loaded_path = None;
        self.position_seconds = 0.0;
        self.load_id = None;
    }

    /// Re-resolves the index after the sequence changed underneath us.
    /// Invalidates when the loaded track is gone.
    pub fn reindex(&mut self, tracks: &[Track]) {
        let Some(path) = self.loaded_path.as_deref() else {
            self.current_index = None;
            return;
        };

        match tracks.iter().position(|t| t.path == path) {
            Some(index) => self.current_index = Some(index),
            None => {
                info!("Loaded track {} left the library", path.display());
                self.invalidate();
            }
        }
    }

    fn invalid(&self, action: &'static str) -> VaultError {
        VaultError::InvalidState {
            action,
            state: self.state,
        }
    }
}

impl<E: AudioEngine> Drop for PlaybackSession<E> {
    fn drop(&mut self) {
        if self.state != PlaybackState::Idle {
            self.engine.stop();
        }
    }
}

fn sanitize_volume(volume: f32, fallback: f32) -> f32 {
    if volume.is_nan() {
        fallback
    } else {
        volume.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::mock::{EngineCall, MockEngine};

    fn tracks(n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| Track::new(PathBuf::from(format!("/music/rock/{}.mp3", i))))
            .collect()
    }

    fn session() -> PlaybackSession<MockEngine> {
        PlaybackSession::with_rng(MockEngine::new(), 0.7, StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_initial_state() {
        let session = session();
        let snap = session.snapshot();
        assert_eq!(snap.state, PlaybackState::Idle);
        assert_eq!(snap.current_index, None);
        assert_eq!(snap.loaded_path, None);
        assert!((snap.volume - 0.7).abs() < f32::EPSILON);
        assert!(!snap.shuffle && !snap.repeat && !snap.is_playing);
    }

    #[test]
    fn test_select_loads_and_plays() {
        let list = tracks(3);
        let mut session = session();

        session.select(&list, 1).unwrap();

        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(session.current_index(), Some(1));
        assert_eq!(session.loaded_path(), Some(list[1].path.as_path()));
        assert_eq!(session.position_seconds(), 0.0);
        let calls = &session.engine().calls;
        assert_eq!(calls[calls.len() - 2], EngineCall::Load(list[1].path.clone()));
        assert_eq!(calls[calls.len() - 1], EngineCall::Play);
    }

    #[test]
    fn test_select_out_of_range_keeps_index() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 2).unwrap();

        let err = session.select(&list, 5).unwrap_err();

        assert!(matches!(err, VaultError::OutOfRange { index: 5, len: 3 }));
        assert_eq!(session.current_index(), Some(2));
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_next_wraps_around() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 0).unwrap();

        for expected in [1, 2, 0] {
            assert_eq!(session.next(&list).unwrap(), Some(expected));
        }
        assert_eq!(session.current_index(), Some(0));
    }

    #[test]
    fn test_next_then_previous_returns_home() {
        for len in 1..6 {
            let list = tracks(len);
            for start in 0..len {
                let mut session = session();
                session.select(&list, start).unwrap();
                session.next(&list).unwrap();
                session.previous(&list).unwrap();
                assert_eq!(session.current_index(), Some(start), "len {len} start {start}");
            }
        }
    }

    #[test]
    fn test_unselected_next_starts_at_zero_and_previous_at_last() {
        let list = tracks(4);
        let mut session = session();
        assert_eq!(session.next(&list).unwrap(), Some(0));

        let mut session = self::session();
        assert_eq!(session.previous(&list).unwrap(), Some(3));
    }

    #[test]
    fn test_empty_sequence_navigation_is_noop() {
        let mut session = session();
        let before = session.snapshot();

        assert_eq!(session.next(&[]).unwrap(), None);
        assert_eq!(session.previous(&[]).unwrap(), None);

        assert_eq!(session.snapshot(), before);
        assert!(session.engine().calls.iter().all(|c| matches!(c, EngineCall::Volume(_))));
    }

    #[test]
    fn test_shuffle_picks_valid_indices_and_previous_ignores_it() {
        let list = tracks(5);
        let mut session = session();
        session.toggle_shuffle();

        for _ in 0..50 {
            let index = session.next(&list).unwrap().unwrap();
            assert!(index < list.len());
        }

        session.select(&list, 3).unwrap();
        assert_eq!(session.previous(&list).unwrap(), Some(2));
    }

    #[test]
    fn test_pause_resume_stop_transitions() {
        let list = tracks(2);
        let mut session = session();

        assert!(matches!(session.pause(), Err(VaultError::InvalidState { .. })));
        assert!(matches!(session.resume(), Err(VaultError::InvalidState { .. })));
        assert!(matches!(session.stop(), Err(VaultError::InvalidState { .. })));

        session.select(&list, 1).unwrap();
        session.pause().unwrap();
        assert_eq!(session.state(), PlaybackState::Loaded);
        assert!(matches!(session.pause(), Err(VaultError::InvalidState { .. })));

        session.resume().unwrap();
        assert_eq!(session.state(), PlaybackState::Playing);

        session.stop().unwrap();
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.current_index(), Some(1));
        assert_eq!(session.position_seconds(), 0.0);
    }

    #[test]
    fn test_stop_from_paused_then_play_restarts_same_track() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 2).unwrap();
        session.pause().unwrap();
        session.stop().unwrap();

        assert_eq!(session.play(&list).unwrap(), Some(2));
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(
            session.engine().calls.iter().filter(|c| matches!(c, EngineCall::Load(_))).count(),
            2
        );
    }

    #[test]
    fn test_toggle_play_pause_cycles() {
        let list = tracks(2);
        let mut session = session();

        assert_eq!(session.toggle_play_pause(&list).unwrap(), Some(0));
        assert_eq!(session.state(), PlaybackState::Playing);
        session.toggle_play_pause(&list).unwrap();
        assert_eq!(session.state(), PlaybackState::Loaded);
        session.toggle_play_pause(&list).unwrap();
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(session.current_index(), Some(0));
    }

    #[test]
    fn test_track_end_with_repeat_restarts_same_index() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 1).unwrap();
        session.engine.position = 42.0;
        session.refresh_position();
        session.toggle_repeat();

        let load_id = session.engine().finish_current();
        assert_eq!(session.on_track_end(&list, load_id).unwrap(), Some(1));

        assert_eq!(session.current_index(), Some(1));
        assert_eq!(session.position_seconds(), 0.0);
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_track_end_without_repeat_advances() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 2).unwrap();

        let load_id = session.engine().finish_current();
        assert_eq!(session.on_track_end(&list, load_id).unwrap(), Some(0));
    }

    #[test]
    fn test_stale_or_duplicate_track_end_is_ignored() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 0).unwrap();
        let first = session.engine().finish_current();

        assert_eq!(session.on_track_end(&list, first).unwrap(), Some(1));
        // Same completion delivered twice.
        assert_eq!(session.on_track_end(&list, first).unwrap(), None);
        assert_eq!(session.current_index(), Some(1));

        // Completion arriving after the user stopped.
        let second = session.engine().finish_current();
        session.stop().unwrap();
        assert_eq!(session.on_track_end(&list, second).unwrap(), None);
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_track_end_after_pause_still_advances() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 0).unwrap();
        let load_id = session.engine().finish_current();
        session.pause().unwrap();

        assert_eq!(session.on_track_end(&list, load_id).unwrap(), Some(1));
        assert_eq!(session.current_index(), Some(1));
        assert_eq!(session.state(), PlaybackState::Loaded);

        // The next track picks up where the user left off.
        session.resume().unwrap();
        let next_id = session.engine().finish_current();
        assert_ne!(next_id, load_id);
        assert_eq!(session.on_track_end(&list, next_id).unwrap(), Some(2));
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_load_failure_is_reported_and_next_moves_past_it() {
        let list = tracks(3);
        let mut engine = MockEngine::new();
        engine.broken.insert(list[1].path.clone());
        let mut session = PlaybackSession::with_rng(engine, 0.7, StdRng::seed_from_u64(1));
        session.select(&list, 0).unwrap();

        let err = session.next(&list).unwrap_err();
        assert!(matches!(err, VaultError::LoadError { .. }));
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.current_index(), Some(1));

        assert_eq!(session.next(&list).unwrap(), Some(2));
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut session = session();
        session.set_volume(1.7);
        assert_eq!(session.volume(), 1.0);
        session.set_volume(-3.0);
        assert_eq!(session.volume(), 0.0);
        session.set_volume(f32::NAN);
        assert_eq!(session.volume(), 0.0);
        assert!((session.adjust_volume(0.25) - 0.25).abs() < f32::EPSILON);
        assert_eq!(session.engine().calls.last(), Some(&EngineCall::Volume(0.25)));
    }

    #[test]
    fn test_toggles_do_not_touch_playback() {
        let list = tracks(2);
        let mut session = session();
        session.select(&list, 0).unwrap();
        let calls = session.engine().calls.len();

        assert!(session.toggle_shuffle());
        assert!(session.toggle_repeat());
        assert!(!session.toggle_shuffle());

        assert_eq!(session.engine().calls.len(), calls);
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_negative_position_keeps_last_value() {
        let list = tracks(1);
        let mut session = session();
        session.select(&list, 0).unwrap();
        session.engine.position = 12.5;
        assert_eq!(session.refresh_position(), 12.5);
        session.engine.position = -1.0;
        assert_eq!(session.refresh_position(), 12.5);
    }

    #[test]
    fn test_reindex_follows_or_invalidates() {
        let list = tracks(3);
        let mut session = session();
        session.select(&list, 2).unwrap();

        let shorter: Vec<Track> = list[1..].to_vec();
        session.reindex(&shorter);
        assert_eq!(session.current_index(), Some(1));
        assert_eq!(session.state(), PlaybackState::Playing);

        let without: Vec<Track> = list[..2].to_vec();
        session.reindex(&without);
        assert_eq!(session.current_index(), None);
        assert_eq!(session.loaded_path(), None);
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.engine().calls.last(), Some(&EngineCall::Stop));
    }
}
