//! Single-writer façade over the library, the playback session and the store.
//!
//! The presentation layer sends [`Command`]s and reads snapshots back; the
//! end-of-track monitor's events come in through [`Controller::handle_monitor_event`].
//! Everything that mutates the library or the session goes through here, on
//! one task, so the index and the sequence can't drift apart.

use crate::audio::{AudioEngine, CompletionSignal, Track};
use crate::error::{Result, VaultError};
use crate::library::{LibraryIndex, ScanJob, ScanOutcome, ScanReport};
use crate::playback::{MonitorEvent, PlaybackSession, SessionSnapshot};
use crate::store::MetadataStore;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddDirectory(PathBuf),
    RemoveDirectory(PathBuf),
    ScanAll,
    Select(usize),
    Play,
    Pause,
    Resume,
    TogglePlayPause,
    Stop,
    Next,
    Previous,
    ToggleShuffle,
    ToggleRepeat,
    AdjustVolume(f32),
}

/// What a command did, for the notification line.
#[derive(Debug)]
pub enum Outcome {
    DirectoryAdded { path: PathBuf, report: ScanReport },
    DirectoryRemoved { path: PathBuf, dropped: usize },
    Scanned(ScanReport),
    Playing(usize),
    Paused,
    Resumed,
    Stopped,
    ShuffleChanged(bool),
    RepeatChanged(bool),
    VolumeChanged(f32),
    /// Documented no-ops, e.g. next/previous on an empty library.
    Nothing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub scanned: bool,
    pub files: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub title: String,
    pub artist: Option<String>,
    pub parent: PathBuf,
    pub path: PathBuf,
    pub is_liked: bool,
    pub play_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LibraryListing {
    pub directories: Vec<DirectoryEntry>,
    pub tracks: Vec<TrackEntry>,
}

pub struct Controller<E: AudioEngine> {
    library: LibraryIndex,
    session: PlaybackSession<E>,
    store: Option<MetadataStore>,
    volume_step: f32,
}

impl<E: AudioEngine> Controller<E> {
    pub fn new(session: PlaybackSession<E>, store: Option<MetadataStore>, volume_step: f32) -> Self {
        Self::with_library(LibraryIndex::new(), session, store, volume_step)
    }

    pub fn with_library(
        library: LibraryIndex,
        session: PlaybackSession<E>,
        store: Option<MetadataStore>,
        volume_step: f32,
    ) -> Self {
        Self {
            library,
            session,
            store,
            volume_step,
        }
    }

    pub fn library(&self) -> &LibraryIndex {
        &self.library
    }

    pub fn session(&self) -> &PlaybackSession<E> {
        &self.session
    }

    pub fn store(&self) -> Option<&MetadataStore> {
        self.store.as_ref()
    }

    pub fn volume_step(&self) -> f32 {
        self.volume_step
    }

    pub fn completion_signal(&self) -> CompletionSignal {
        self.session.completion_signal()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.session
            .current_index()
            .and_then(|i| self.library.tracks().get(i))
    }

    pub fn library_listing(&self) -> LibraryListing {
        let directories = self
            .library
            .directories()
            .iter()
            .map(|d| DirectoryEntry {
                path: d.path.clone(),
                scanned: d.scanned,
                files: self.library.track_count_in(&d.path),
            })
            .collect();

        let tracks = self
            .library
            .tracks()
            .iter()
            .map(|t| TrackEntry {
                title: t.title.clone(),
                artist: t.artist.clone(),
                parent: t.path.parent().map(Path::to_path_buf).unwrap_or_default(),
                path: t.path.clone(),
                is_liked: t.is_liked,
                play_count: t.play_count,
            })
            .collect();

        LibraryListing { directories, tracks }
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome> {
        debug!("Executing {:?}", command);
        let tracks = self.library.tracks();

        let outcome = match command {
            Command::AddDirectory(path) => {
                let report = self.add_directory(&path)?;
                Outcome::DirectoryAdded { path, report }
            }
            Command::RemoveDirectory(path) => {
                let dropped = self.remove_directory(&path)?;
                Outcome::DirectoryRemoved { path, dropped }
            }
            Command::ScanAll => Outcome::Scanned(self.scan_all()?),
            Command::Select(index) => {
                self.session.select(tracks, index)?;
                Outcome::Playing(index)
            }
            Command::Play => playing(self.session.play(tracks)?),
            Command::Pause => {
                self.session.pause()?;
                Outcome::Paused
            }
            Command::Resume => {
                self.session.resume()?;
                Outcome::Resumed
            }
            Command::TogglePlayPause => {
                let was_playing = self.session.snapshot().is_playing;
                let index = self.session.toggle_play_pause(tracks)?;
                if was_playing {
                    Outcome::Paused
                } else {
                    playing(index)
                }
            }
            Command::Stop => {
                self.session.stop()?;
                Outcome::Stopped
            }
            Command::Next => playing(self.session.next(tracks)?),
            Command::Previous => playing(self.session.previous(tracks)?),
            Command::ToggleShuffle => Outcome::ShuffleChanged(self.session.toggle_shuffle()),
            Command::ToggleRepeat => Outcome::RepeatChanged(self.session.toggle_repeat()),
            Command::AdjustVolume(delta) => Outcome::VolumeChanged(self.session.adjust_volume(delta)),
        };

        Ok(outcome)
    }

    /// Watches and scans a directory, registering it in the store as well.
    pub fn add_directory(&mut self, path: &Path) -> Result<ScanReport> {
        let report = self.library.add_directory(path)?;

        if let Some(directory) = self.library.directories().last() {
            let folder = directory.path.to_string_lossy().into_owned();
            if let Some(store) = &self.store {
                if let Err(e) = store.add_folder(&folder) {
                    warn!("Could not record folder {} in store: {}", folder, e);
                }
            }
        }

        self.hydrate_from_store();
        Ok(report)
    }

    /// Stops watching a directory. If the loaded track went with it, playback
    /// stops and the selection is cleared. Returns how many tracks dropped.
    pub fn remove_directory(&mut self, path: &Path) -> Result<usize> {
        let removed = self.library.remove_directory(path)?;

        let lost_current = self
            .session
            .loaded_path()
            .is_some_and(|loaded| removed.dropped.iter().any(|p| p == loaded));
        if lost_current {
            info!("Current track was in {}, stopping", removed.directory.path.display());
            self.session.invalidate();
        } else {
            self.session.reindex(self.library.tracks());
        }

        if let Err(e) = self.forget_folder(&removed.directory.path, &removed.dropped) {
            warn!(
                "Could not remove folder {} from store: {}",
                removed.directory.path.display(),
                e
            );
        }

        Ok(removed.dropped.len())
    }

    /// Rebuilds the whole track list. The selection never survives this.
    pub fn scan_all(&mut self) -> Result<ScanReport> {
        let job = self.library.begin_rescan()?;
        Ok(self.finish_scan(job.run()))
    }

    /// Takes a full rescan out so it can run off the control loop. A second
    /// request before `finish_scan` fails with `ScanInProgress`.
    pub fn begin_scan_all(&mut self) -> Result<ScanJob> {
        self.library.begin_rescan()
    }

    pub fn finish_scan(&mut self, outcome: ScanOutcome) -> ScanReport {
        let report = self.library.finish_scan(outcome);
        self.session.invalidate();
        self.hydrate_from_store();
        report
    }

    pub fn abort_scan(&mut self) {
        self.library.abort_scan();
    }

    /// Feeds a monitor message into the session. Returns the index that
    /// started playing, if the completion was current.
    pub fn handle_monitor_event(&mut self, event: MonitorEvent) -> Result<Option<usize>> {
        match event {
            MonitorEvent::TrackFinished { load_id } => {
                // Only a completion the session accepts counts as a play.
                let finished = self
                    .session
                    .is_current_load(load_id)
                    .then(|| self.session.loaded_path().map(Path::to_path_buf))
                    .flatten();

                let result = self.session.on_track_end(self.library.tracks(), load_id);
                if let Some(path) = finished {
                    self.count_play(&path);
                }
                result
            }
        }
    }

    /// Refreshes the play position for the status line.
    pub fn tick(&mut self) -> f64 {
        self.session.refresh_position()
    }

    /// Writes every in-memory track to the store. Returns how many were written.
    pub fn sync_store(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut written = 0;
        for directory in self.library.directories() {
            let folder_id = store.add_folder(&directory.path.to_string_lossy())?;
            for track in self
                .library
                .tracks()
                .iter()
                .filter(|t| t.folder_path == directory.path)
            {
                store.upsert_track(track, Some(folder_id))?;
                written += 1;
            }
        }
        info!("Synced {} tracks to the metadata store", written);
        Ok(written)
    }

    pub fn set_liked(&mut self, index: usize, liked: bool) -> Result<()> {
        let len = self.library.tracks().len();
        let track = self
            .library
            .tracks_mut()
            .get_mut(index)
            .ok_or(VaultError::OutOfRange { index, len })?;
        track.is_liked = liked;

        if let Some(store) = &self.store {
            let path = track.path.to_string_lossy();
            if !store.set_liked(&path, liked)? {
                let folder_id = store
                    .folder_by_path(&track.folder_path.to_string_lossy())?
                    .map(|f| f.id);
                store.upsert_track(track, folder_id)?;
            }
        }
        Ok(())
    }

    /// Stops playback and closes the store. The engine is released when the
    /// controller is dropped at the end of this call.
    pub fn shutdown(mut self) {
        self.session.invalidate();
        if let Some(store) = self.store.take() {
            if let Err(e) = store.close() {
                warn!("Metadata store did not close cleanly: {}", e);
            }
        }
        info!("Controller shut down");
    }

    /// Mirrors a directory removal in the store. Dropped tracks lose their
    /// rows; tracks another watched directory still owns move to its folder.
    fn forget_folder(&self, directory: &Path, dropped: &[PathBuf]) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let Some(folder) = store.folder_by_path(&directory.to_string_lossy())? else {
            return Ok(());
        };

        for path in dropped {
            store.delete_track(&path.to_string_lossy())?;
        }
        for record in store.get_tracks_by_folder(folder.id)? {
            let owner = match self.library.owning_directory(Path::new(&record.file_path)) {
                Some(owner) => store.folder_by_path(&owner.path.to_string_lossy())?,
                None => None,
            };
            match owner {
                Some(owner) => {
                    store.set_track_folder(&record.file_path, Some(owner.id))?;
                }
                None => {
                    store.delete_track(&record.file_path)?;
                }
            }
        }

        store.delete_folder(folder.id)?;
        Ok(())
    }

    fn count_play(&mut self, path: &Path) {
        if let Some(track) = self.library.tracks_mut().iter_mut().find(|t| t.path == path) {
            track.play_count += 1;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.record_play(&path.to_string_lossy()) {
                warn!("Could not record play for {}: {}", path.display(), e);
            }
        }
    }

    fn hydrate_from_store(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        for track in self.library.tracks_mut() {
            match store.track_stats(&track.path.to_string_lossy()) {
                Ok(Some((liked, plays))) => {
                    track.is_liked = liked;
                    track.play_count = plays;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Could not read stored stats: {}", e);
                    return;
                }
            }
        }
    }
}

fn playing(index: Option<usize>) -> Outcome {
    match index {
        Some(index) => Outcome::Playing(index),
        None => Outcome::Nothing,
    }
}
