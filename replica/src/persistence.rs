//! Persistence bridge — snapshot save/load of the local scene.
//!
//! DESIGN
//! ======
//! Persistence is independent of replication. A [`SceneDocument`] is the
//! scene's objects with their stable ids, written whole on every save. On
//! startup the saved objects are adopted by the engine as unsynced local
//! state and pushed to the room at the next bootstrap.
//!
//! The JSON file backend keeps one `openboard_board_<id>.json` per board
//! plus an `openboard_boards.json` index of the most recently modified
//! boards. Writes go to a temporary file first and are renamed into place.
//!
//! ERROR HANDLING
//! ==============
//! Every failure carries the path involved. A missing board file is not an
//! error; `load_initial_state` returns `None`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use frames::{ObjectId, Shape};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::board::is_valid_board_id;

pub const DOCUMENT_VERSION: u32 = 1;
pub const MAX_RECENT_BOARDS: usize = 20;
const FILE_PREFIX: &str = "openboard_";
const INDEX_FILE: &str = "openboard_boards.json";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported document version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid board id: {0}")]
    InvalidBoardId(String),
}

// =============================================================================
// DOCUMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentObject {
    pub id: ObjectId,
    pub shape: Shape,
}

/// Full saved state of one board's scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    pub version: u32,
    pub objects: Vec<DocumentObject>,
}

impl SceneDocument {
    #[must_use]
    pub fn new(objects: impl IntoIterator<Item = (ObjectId, Shape)>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            objects: objects.into_iter().map(|(id, shape)| DocumentObject { id, shape }).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Entry in the recent-boards index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMetadata {
    pub id: String,
    pub name: String,
    pub last_modified: i64,
    pub created_at: i64,
}

/// Where scene snapshots are loaded from and saved to.
pub trait PersistenceBackend: Send + Sync {
    /// Saved document for `board_id`, or `None` if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the saved state exists but cannot be read.
    fn load_initial_state(&self, board_id: &str) -> Result<Option<SceneDocument>, PersistenceError>;

    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the document cannot be written.
    fn save_snapshot(&self, board_id: &str, document: &SceneDocument) -> Result<(), PersistenceError>;
}

// =============================================================================
// JSON FILE BACKEND
// =============================================================================

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn board_path(&self, board_id: &str) -> Result<PathBuf, PersistenceError> {
        if !is_valid_board_id(board_id) {
            return Err(PersistenceError::InvalidBoardId(board_id.to_owned()));
        }
        Ok(self.dir.join(format!("{FILE_PREFIX}board_{board_id}.json")))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Recently saved boards, most recent first.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the index exists but cannot be read.
    pub fn recent_boards(&self) -> Result<Vec<BoardMetadata>, PersistenceError> {
        Ok(read_json(&self.index_path())?.unwrap_or_default())
    }

    /// Remove a board file and its index entry.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] on i/o failure other than "not found".
    pub fn delete_board(&self, board_id: &str) -> Result<(), PersistenceError> {
        let path = self.board_path(board_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(PersistenceError::Io { path, source }),
        }
        let mut boards = self.recent_boards()?;
        boards.retain(|b| b.id != board_id);
        write_json(&self.index_path(), &boards)?;
        info!(board_id, "board deleted");
        Ok(())
    }

    fn touch_index(&self, board_id: &str) -> Result<(), PersistenceError> {
        let now = now_ms();
        let mut boards = self.recent_boards()?;
        match boards.iter_mut().find(|b| b.id == board_id) {
            Some(entry) => entry.last_modified = now,
            None => boards.push(BoardMetadata {
                id: board_id.to_owned(),
                name: format!("Board {board_id}"),
                last_modified: now,
                created_at: now,
            }),
        }
        boards.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        boards.truncate(MAX_RECENT_BOARDS);
        write_json(&self.index_path(), &boards)
    }
}

impl PersistenceBackend for JsonFileBackend {
    fn load_initial_state(&self, board_id: &str) -> Result<Option<SceneDocument>, PersistenceError> {
        let path = self.board_path(board_id)?;
        let Some(document) = read_json::<SceneDocument>(&path)? else {
            debug!(board_id, "no saved board");
            return Ok(None);
        };
        if document.version != DOCUMENT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(document.version));
        }
        info!(board_id, objects = document.objects.len(), "board loaded");
        Ok(Some(document))
    }

    fn save_snapshot(&self, board_id: &str, document: &SceneDocument) -> Result<(), PersistenceError> {
        let path = self.board_path(board_id)?;
        fs::create_dir_all(&self.dir).map_err(|source| PersistenceError::Io { path: self.dir.clone(), source })?;
        write_json(&path, document)?;
        self.touch_index(board_id)?;
        debug!(board_id, objects = document.objects.len(), "board saved");
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(PersistenceError::Io { path: path.to_owned(), source }),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| PersistenceError::Json { path: path.to_owned(), source })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Json { path: path.to_owned(), source })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|source| PersistenceError::Io { path: tmp.clone(), source })?;
    fs::rename(&tmp, path).map_err(|source| PersistenceError::Io { path: path.to_owned(), source })
}

fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// AUTO-SAVE
// =============================================================================

/// Debounces saves: each change pushes the deadline out by `delay`.
#[derive(Debug, Clone)]
pub struct AutoSave {
    delay: Duration,
    deadline: Option<Instant>,
}

impl AutoSave {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the quiet period has elapsed. Resets the debouncer.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Clear any scheduled save, returning whether one was pending.
    pub fn flush(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
