// Metadata store - durable folders/tracks/artists in SQLite
// Mirrors the library but is only synced explicitly; playback never waits on it.

use crate::audio::Track;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct FolderRecord {
    pub id: i64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub id: i64,
    pub file_path: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist_id: Option<i64>,
    pub folder_id: Option<i64>,
    pub duration: Option<f64>,
    pub is_liked: bool,
    pub play_count: u32,
}

/// A track row joined with its folder path and artist name.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrack {
    pub record: TrackRecord,
    pub folder_path: Option<String>,
    pub artist_name: Option<String>,
}

pub struct MetadataStore {
    conn: Connection,
}

const TRACK_COLUMNS: &str =
    "tracks.id, tracks.file_path, tracks.title, tracks.album, tracks.artist_id, \
     tracks.folder_id, tracks.duration, tracks.isLiked, tracks.noOfPlays";

impl MetadataStore {
    /// Opens (or creates) the database file, creating its directory first.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        debug!("Opened metadata store at {}", db_path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        // Bundled SQLite enforces foreign keys by default. Folder rows are
        // deleted independently of their tracks, so enforcement stays off.
        self.conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS artists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL UNIQUE,
                title TEXT,
                album TEXT,
                artist_id INTEGER REFERENCES artists(id),
                folder_id INTEGER REFERENCES folders(id),
                duration REAL,
                isLiked INTEGER NOT NULL DEFAULT 0,
                noOfPlays INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_tracks_folder_id ON tracks(folder_id);",
        )?;
        Ok(())
    }

    pub fn get_folders(&self) -> Result<Vec<FolderRecord>> {
        let mut stmt = self.conn.prepare("SELECT id, path FROM folders ORDER BY id")?;
        let folders = stmt
            .query_map([], |row| {
                Ok(FolderRecord {
                    id: row.get(0)?,
                    path: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    pub fn folder_by_path(&self, path: &str) -> Result<Option<FolderRecord>> {
        let folder = self
            .conn
            .query_row(
                "SELECT id, path FROM folders WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FolderRecord {
                        id: row.get(0)?,
                        path: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(folder)
    }

    /// Every track with its folder and artist, ordered by title ignoring case.
    pub fn get_tracks(&self) -> Result<Vec<StoredTrack>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS}, folders.path, artists.name
             FROM tracks
             LEFT JOIN folders ON tracks.folder_id = folders.id
             LEFT JOIN artists ON tracks.artist_id = artists.id
             ORDER BY tracks.title COLLATE NOCASE"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map([], |row| {
                Ok(StoredTrack {
                    record: row_to_track(row)?,
                    folder_path: row.get(9)?,
                    artist_name: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    pub fn get_tracks_by_folder(&self, folder_id: i64) -> Result<Vec<TrackRecord>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE folder_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map(params![folder_id], row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    /// Adds a folder unless it is already there. Returns its id either way.
    pub fn add_folder(&self, path: &str) -> Result<i64> {
        self.conn
            .execute("INSERT OR IGNORE INTO folders(path) VALUES(?1)", params![path])?;
        let id = self.conn.query_row(
            "SELECT id FROM folders WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Deletes the folder row only. Its tracks stay until
    /// `delete_tracks_by_folder` is called.
    pub fn delete_folder(&self, folder_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM folders WHERE id = ?1", params![folder_id])?;
        Ok(deleted > 0)
    }

    pub fn delete_tracks_by_folder(&self, folder_id: i64) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM tracks WHERE folder_id = ?1", params![folder_id])?;
        Ok(deleted)
    }

    /// Inserts or refreshes the scanned fields of a track. A new row takes the
    /// track's like and play count; an existing row keeps its own.
    pub fn upsert_track(&self, track: &Track, folder_id: Option<i64>) -> Result<i64> {
        let artist_id = match track.artist.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(self.artist_id(name)?),
            _ => None,
        };
        let file_path = track.path.to_string_lossy();

        self.conn.execute(
            "INSERT INTO tracks
                (file_path, title, album, artist_id, folder_id, duration, isLiked, noOfPlays)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(file_path) DO UPDATE SET
                title = excluded.title,
                album = excluded.album,
                artist_id = excluded.artist_id,
                folder_id = excluded.folder_id,
                duration = excluded.duration",
            params![
                file_path,
                track.title,
                track.album,
                artist_id,
                folder_id,
                track.duration_seconds(),
                track.is_liked,
                track.play_count,
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM tracks WHERE file_path = ?1",
            params![file_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn delete_track(&self, file_path: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM tracks WHERE file_path = ?1", params![file_path])?;
        Ok(deleted > 0)
    }

    /// Moves a track to another folder, keeping its like and play count.
    pub fn set_track_folder(&self, file_path: &str, folder_id: Option<i64>) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE tracks SET folder_id = ?2 WHERE file_path = ?1",
            params![file_path, folder_id],
        )?;
        Ok(updated > 0)
    }

    pub fn set_liked(&self, file_path: &str, liked: bool) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE tracks SET isLiked = ?2 WHERE file_path = ?1",
            params![file_path, liked],
        )?;
        Ok(updated > 0)
    }

    /// Bumps the play counter. False when the track was never synced.
    pub fn record_play(&self, file_path: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE tracks SET noOfPlays = noOfPlays + 1 WHERE file_path = ?1",
            params![file_path],
        )?;
        Ok(updated > 0)
    }

    /// `(is_liked, play_count)` for a stored track.
    pub fn track_stats(&self, file_path: &str) -> Result<Option<(bool, u32)>> {
        let stats = self
            .conn
            .query_row(
                "SELECT isLiked, noOfPlays FROM tracks WHERE file_path = ?1",
                params![file_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(stats)
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    fn artist_id(&self, name: &str) -> Result<i64> {
        self.conn
            .execute("INSERT OR IGNORE INTO artists(name) VALUES(?1)", params![name])?;
        let id = self.conn.query_row(
            "SELECT id FROM artists WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}

fn row_to_track(row: &Row) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        title: row.get(2)?,
        album: row.get(3)?,
        artist_id: row.get(4)?,
        folder_id: row.get(5)?,
        duration: row.get(6)?,
        is_liked: row.get(7)?,
        play_count: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn track(path: &str, title: &str, artist: Option<&str>) -> Track {
        let mut track = Track::new(PathBuf::from(path));
        track.title = title.to_string();
        track.artist = artist.map(str::to_string);
        track
    }

    #[test]
    fn test_add_folder_is_idempotent() {
        let store = MetadataStore::open_in_memory().unwrap();
        let first = store.add_folder("/music/rock").unwrap();
        let again = store.add_folder("/music/rock").unwrap();

        assert_eq!(first, again);
        assert_eq!(store.get_folders().unwrap().len(), 1);
        assert_eq!(store.folder_by_path("/music/rock").unwrap().unwrap().id, first);
        assert!(store.folder_by_path("/music/jazz").unwrap().is_none());
    }

    #[test]
    fn test_tracks_join_and_sort_case_insensitively() {
        let store = MetadataStore::open_in_memory().unwrap();
        let folder = store.add_folder("/music/rock").unwrap();
        store.upsert_track(&track("/music/rock/1.mp3", "banana", Some("Band")), Some(folder)).unwrap();
        store.upsert_track(&track("/music/rock/2.mp3", "Apple", None), Some(folder)).unwrap();
        store.upsert_track(&track("/music/rock/3.mp3", "cherry", Some("Band")), None).unwrap();

        let tracks = store.get_tracks().unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.record.title.clone().unwrap()).collect();
        assert_eq!(titles, vec!["Apple", "banana", "cherry"]);

        assert_eq!(tracks[0].artist_name, None);
        assert_eq!(tracks[1].artist_name.as_deref(), Some("Band"));
        assert_eq!(tracks[1].folder_path.as_deref(), Some("/music/rock"));
        assert_eq!(tracks[2].folder_path, None);
        assert_eq!(tracks[1].record.artist_id, tracks[2].record.artist_id);

        assert_eq!(store.get_tracks_by_folder(folder).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_folder_does_not_cascade() {
        let store = MetadataStore::open_in_memory().unwrap();
        let folder = store.add_folder("/music/rock").unwrap();
        store.upsert_track(&track("/music/rock/1.mp3", "one", None), Some(folder)).unwrap();

        assert!(store.delete_folder(folder).unwrap());
        assert!(store.get_folders().unwrap().is_empty());
        assert_eq!(store.get_tracks_by_folder(folder).unwrap().len(), 1);

        assert_eq!(store.delete_tracks_by_folder(folder).unwrap(), 1);
        assert!(store.get_tracks().unwrap().is_empty());
        assert!(!store.delete_folder(folder).unwrap());
    }

    #[test]
    fn test_upsert_keeps_likes_and_plays() {
        let store = MetadataStore::open_in_memory().unwrap();
        let path = "/music/rock/1.mp3";
        store.upsert_track(&track(path, "one", None), None).unwrap();
        assert!(store.set_liked(path, true).unwrap());
        assert!(store.record_play(path).unwrap());
        assert!(store.record_play(path).unwrap());

        store.upsert_track(&track(path, "one (remaster)", None), None).unwrap();

        assert_eq!(store.track_stats(path).unwrap(), Some((true, 2)));
        assert_eq!(store.get_tracks().unwrap()[0].record.title.as_deref(), Some("one (remaster)"));
        assert!(!store.record_play("/missing.mp3").unwrap());
        assert_eq!(store.track_stats("/missing.mp3").unwrap(), None);
    }

    #[test]
    fn test_new_rows_take_track_stats() {
        let store = MetadataStore::open_in_memory().unwrap();
        let mut liked = track("/music/rock/1.mp3", "one", None);
        liked.is_liked = true;
        liked.play_count = 4;

        store.upsert_track(&liked, None).unwrap();
        assert_eq!(store.track_stats("/music/rock/1.mp3").unwrap(), Some((true, 4)));

        // An existing row is not overwritten by in-memory stats.
        liked.is_liked = false;
        liked.play_count = 0;
        store.upsert_track(&liked, None).unwrap();
        assert_eq!(store.track_stats("/music/rock/1.mp3").unwrap(), Some((true, 4)));
    }

    #[test]
    fn test_tracks_move_between_folders_and_delete_singly() {
        let store = MetadataStore::open_in_memory().unwrap();
        let rock = store.add_folder("/music").unwrap();
        let live = store.add_folder("/music/live").unwrap();
        store.upsert_track(&track("/music/live/1.mp3", "one", None), Some(live)).unwrap();
        store.upsert_track(&track("/music/live/2.mp3", "two", None), Some(live)).unwrap();
        store.set_liked("/music/live/1.mp3", true).unwrap();

        assert!(store.set_track_folder("/music/live/1.mp3", Some(rock)).unwrap());
        assert!(store.delete_track("/music/live/2.mp3").unwrap());
        assert!(store.delete_folder(live).unwrap());

        let moved = store.get_tracks_by_folder(rock).unwrap();
        assert_eq!(moved.len(), 1);
        assert!(moved[0].is_liked);
        assert!(store.get_tracks_by_folder(live).unwrap().is_empty());
        assert!(!store.delete_track("/music/live/2.mp3").unwrap());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state").join("echovault.db");

        let store = MetadataStore::open(&db_path).unwrap();
        store.add_folder("/music/rock").unwrap();
        store.close().unwrap();

        let store = MetadataStore::open(&db_path).unwrap();
        assert_eq!(store.get_folders().unwrap()[0].path, "/music/rock");
    }
}
