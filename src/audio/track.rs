use super::AudioFormat;
use id3::TagLike;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A playable file discovered under one of the watched directories.
///
/// `path` is the identity: the library never holds two tracks with the same path.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub folder_path: PathBuf,
    pub duration: Option<Duration>,
    pub is_liked: bool,
    pub play_count: u32,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
}

impl Track {
    pub fn new(path: PathBuf) -> Self {
        let format = AudioFormat::from_path(&path);
        let title = file_stem(&path);
        let folder_path = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Self {
            path,
            title,
            album: None,
            artist: None,
            folder_path,
            duration: None,
            is_liked: false,
            play_count: 0,
            format,
        }
    }

    /// Builds a track from a file on disk, reading tags where the format has them.
    /// Unreadable tags are not an error: the file name becomes the title.
    pub fn from_file(path: &Path) -> Self {
        let track = Track::new(path.to_path_buf());
        let metadata = match track.format {
            AudioFormat::Mp3 => TrackMetadata::read_id3(path),
            AudioFormat::Mp4 => TrackMetadata::read_mp4(path),
            _ => None,
        };

        match metadata {
            Some(metadata) => track.with_metadata(metadata),
            None => track,
        }
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        if let Some(title) = metadata.title.filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
        self.artist = metadata.artist;
        self.album = metadata.album;
        if let Some(duration_ms) = metadata.duration_ms {
            self.duration = Some(Duration::from_millis(duration_ms));
        }
        self
    }

    pub fn display_artist(&self) -> String {
        self.artist
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.title.clone())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64())
    }
}

impl TrackMetadata {
    pub fn from_id3_tag(tag: &id3::Tag) -> Self {
        Self {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            duration_ms: tag.duration().map(|d| d as u64),
        }
    }

    fn read_id3(path: &Path) -> Option<Self> {
        id3::Tag::read_from_path(path)
            .ok()
            .map(|tag| Self::from_id3_tag(&tag))
    }

    fn read_mp4(path: &Path) -> Option<Self> {
        let tag = mp4ameta::Tag::read_from_path(path).ok()?;
        Some(Self {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            duration_ms: tag.duration().map(|d| d.as_millis() as u64),
        })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("Unknown")
        .to_string()
}
