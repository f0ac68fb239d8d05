use super::{AudioFormat, Track};
use crate::error::VaultError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recursive directory walker. Stateless, so a copy can run on a blocking
/// worker while the library keeps serving reads.
#[derive(Debug, Clone, Default)]
pub struct MusicScanner;

/// Everything one walk of a root produced. Entry-level I/O failures are kept
/// next to the tracks instead of aborting the walk.
#[derive(Debug, Default)]
pub struct RootScan {
    pub root: PathBuf,
    pub tracks: Vec<Track>,
    pub errors: Vec<VaultError>,
}

impl MusicScanner {
    pub fn new() -> Self {
        Self
    }

    /// Walks `root` in file-name order and returns every supported file.
    pub fn scan_root(&self, root: &Path) -> RootScan {
        let mut scan = RootScan {
            root: root.to_path_buf(),
            ..Default::default()
        };

        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    warn!("Skipping {} during scan: {}", path.display(), e);
                    scan.errors.push(VaultError::ScanIoError {
                        path,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if entry.file_type().is_file() && Self::is_supported_file(entry.path()) {
                scan.tracks.push(Track::from_file(entry.path()));
            }
        }

        debug!(
            "Scanned {}: {} tracks, {} errors",
            root.display(),
            scan.tracks.len(),
            scan.errors.len()
        );
        scan
    }

    pub fn is_supported_file(path: &Path) -> bool {
        AudioFormat::from_path(path).is_supported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_filters_extensions_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("album");
        fs::create_dir(&nested).unwrap();
        for name in ["b.mp3", "a.FLAC", "notes.txt", "cover.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::write(nested.join("c.ogg"), b"x").unwrap();
        fs::write(nested.join("d.m4a"), b"x").unwrap();

        let scan = MusicScanner::new().scan_root(dir.path());
        let names: Vec<String> = scan.tracks.iter().map(|t| t.file_name()).collect();

        assert_eq!(names, vec!["a.FLAC", "c.ogg", "b.mp3"]);
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn test_missing_root_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");

        let scan = MusicScanner::new().scan_root(&gone);
        assert!(scan.tracks.is_empty());
        assert_eq!(scan.errors.len(), 1);
        assert!(matches!(scan.errors[0], VaultError::ScanIoError { .. }));
    }
}
