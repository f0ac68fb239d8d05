// Library index - the watched directories and the tracks found under them
// Tracks are kept in scan order; that order is what next/previous walk through.

use crate::audio::{MusicScanner, Track};
use crate::audio::scanner::RootScan;
use crate::error::{Result, VaultError};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub path: PathBuf,
    pub scanned: bool,
}

/// Result of one scan request. `errors` only ever holds `ScanIoError`s.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub added: usize,
    pub errors: Vec<VaultError>,
}

/// What `remove_directory` took out of the library.
#[derive(Debug, Clone)]
pub struct RemovedDirectory {
    pub directory: Directory,
    pub dropped: Vec<PathBuf>,
}

/// A scan taken out of the index. It owns everything it needs, so `run` can
/// happen on another thread; hand the outcome back with `finish_scan`.
#[derive(Debug)]
pub struct ScanJob {
    roots: Vec<PathBuf>,
    scanner: MusicScanner,
    full_rescan: bool,
}

#[derive(Debug)]
pub struct ScanOutcome {
    full_rescan: bool,
    roots: Vec<RootScan>,
}

impl ScanJob {
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn run(self) -> ScanOutcome {
        let roots = self
            .roots
            .iter()
            .map(|root| self.scanner.scan_root(root))
            .collect();

        ScanOutcome {
            full_rescan: self.full_rescan,
            roots,
        }
    }
}

#[derive(Debug, Default)]
pub struct LibraryIndex {
    directories: Vec<Directory>,
    tracks: Vec<Track>,
    scanner: MusicScanner,
    scan_in_flight: bool,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Mutable access for metadata hydration. The sequence itself can't grow
    /// or shrink through this.
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_in_flight
    }

    /// Adds a directory and scans it right away.
    pub fn add_directory(&mut self, path: &Path) -> Result<ScanReport> {
        let resolved = resolve_path(path);
        if !resolved.is_dir() {
            return Err(VaultError::InvalidPath(path.to_path_buf()));
        }
        if self.find_directory(&resolved).is_some() {
            return Err(VaultError::DuplicateDirectory(resolved));
        }
        if self.scan_in_flight {
            return Err(VaultError::ScanInProgress);
        }

        info!("Watching directory {}", resolved.display());
        self.directories.push(Directory {
            path: resolved.clone(),
            scanned: false,
        });
        self.scan_directory(&resolved)
    }

    /// Stops watching a directory and drops every track it owns.
    ///
    /// A track under the removed path that still has another watched owner
    /// (a nested or enclosing directory) stays.
    pub fn remove_directory(&mut self, path: &Path) -> Result<RemovedDirectory> {
        let resolved = resolve_path(path);
        let position = self
            .find_directory(&resolved)
            .or_else(|| self.find_directory(path))
            .ok_or_else(|| VaultError::NotFound(path.to_path_buf()))?;

        let directory = self.directories.remove(position);
        let remaining = &self.directories;
        let mut dropped = Vec::new();

        self.tracks.retain(|track| {
            let keep = !track.path.starts_with(&directory.path)
                || longest_owner(remaining, &track.path).is_some();
            if !keep {
                dropped.push(track.path.clone());
            }
            keep
        });
        self.reassign_owners();

        info!(
            "Removed directory {} ({} tracks dropped)",
            directory.path.display(),
            dropped.len()
        );
        Ok(RemovedDirectory { directory, dropped })
    }

    /// Scans one watched directory and appends tracks not already present.
    pub fn scan_directory(&mut self, path: &Path) -> Result<ScanReport> {
        let resolved = resolve_path(path);
        let position = self
            .find_directory(&resolved)
            .ok_or_else(|| VaultError::NotFound(path.to_path_buf()))?;
        let root = self.directories[position].path.clone();

        let job = self.begin_scan(vec![root])?;
        Ok(self.finish_scan(job.run()))
    }

    /// Throws away the track list and scans every directory again, in the
    /// order they were added.
    pub fn rescan_all(&mut self) -> Result<ScanReport> {
        let job = self.begin_rescan()?;
        Ok(self.finish_scan(job.run()))
    }

    /// Reserves the scan slot for `roots`. Only one scan may be outstanding;
    /// a second request is rejected rather than queued.
    pub fn begin_scan(&mut self, roots: Vec<PathBuf>) -> Result<ScanJob> {
        self.reserve_scan(roots, false)
    }

    pub fn begin_rescan(&mut self) -> Result<ScanJob> {
        let roots = self.directories.iter().map(|d| d.path.clone()).collect();
        self.reserve_scan(roots, true)
    }

    /// Releases the scan slot without applying anything, e.g. when the worker
    /// running the job died.
    pub fn abort_scan(&mut self) {
        if self.scan_in_flight {
            warn!("Abandoning in-flight library scan");
        }
        self.scan_in_flight = false;
    }

    /// Applies a finished scan. Results for directories removed while the job
    /// was running are discarded.
    pub fn finish_scan(&mut self, outcome: ScanOutcome) -> ScanReport {
        self.scan_in_flight = false;

        if outcome.full_rescan {
            self.tracks.clear();
        }

        let mut known: HashSet<PathBuf> = self.tracks.iter().map(|t| t.path.clone()).collect();
        let mut report = ScanReport::default();

        for root_scan in outcome.roots {
            let Some(position) = self.find_directory(&root_scan.root) else {
                debug!("Dropping scan results for removed {}", root_scan.root.display());
                continue;
            };
            self.directories[position].scanned = true;
            report.errors.extend(root_scan.errors);

            for track in root_scan.tracks {
                if known.insert(track.path.clone()) {
                    self.tracks.push(track);
                    report.added += 1;
                }
            }
        }

        self.reassign_owners();
        info!(
            "Scan finished: {} new tracks, {} errors, {} total",
            report.added,
            report.errors.len(),
            self.tracks.len()
        );
        report
    }

    /// The watched directory that owns `track_path`: the longest watched path
    /// that is a prefix of it, compared component by component.
    pub fn owning_directory(&self, track_path: &Path) -> Option<&Directory> {
        longest_owner(&self.directories, track_path).map(|i| &self.directories[i])
    }

    /// Number of tracks whose owner is `directory`.
    pub fn track_count_in(&self, directory: &Path) -> usize {
        self.tracks
            .iter()
            .filter(|t| t.folder_path == directory)
            .count()
    }

    fn reserve_scan(&mut self, roots: Vec<PathBuf>, full_rescan: bool) -> Result<ScanJob> {
        if self.scan_in_flight {
            return Err(VaultError::ScanInProgress);
        }
        self.scan_in_flight = true;

        Ok(ScanJob {
            roots,
            scanner: self.scanner.clone(),
            full_rescan,
        })
    }

    fn find_directory(&self, path: &Path) -> Option<usize> {
        self.directories.iter().position(|d| d.path == path)
    }

    fn reassign_owners(&mut self) {
        for track in &mut self.tracks {
            if let Some(owner) = longest_owner(&self.directories, &track.path) {
                track.folder_path = self.directories[owner].path.clone();
            }
        }
    }
}

fn longest_owner(directories: &[Directory], track_path: &Path) -> Option<usize> {
    directories
        .iter()
        .enumerate()
        .filter(|(_, d)| track_path.starts_with(&d.path))
        .max_by_key(|(_, d)| d.path.components().count())
        .map(|(i, _)| i)
}

/// Expands `~`, then canonicalizes when the path exists. Paths that no longer
/// exist are made absolute against the working directory instead.
pub fn resolve_path(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    };

    if let Ok(canonical) = expanded.canonicalize() {
        return canonical;
    }
    if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    }
}
