use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of a savegame: the file's base name, extension included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaveId(String);

impl SaveId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive the id from a save file path.
    ///
    /// Returns `None` for paths without a file name (`/`, `..`).
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .map(|name| Self(name.to_string_lossy().into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SaveId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Embedded screenshot of a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel of `pixels` (3 = RGB, 4 = RGBA).
    pub bytes_per_pixel: u8,
    #[serde(skip)]
    pub pixels: Vec<u8>,
}

impl Screenshot {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Structured metadata produced by a [`SaveDecoder`](crate::decoder::SaveDecoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub save_number: u32,
    pub character_name: String,
    pub level: u32,
    pub location: String,
    pub game_time: String,
    pub race: String,
    pub plugins: Vec<String>,
    pub screenshot: Screenshot,
    pub created_at: Option<DateTime<Utc>>,
}

/// Decoded metadata plus the flags the host needs to display a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAttributes {
    #[serde(flatten)]
    pub metadata: SaveMetadata,
    /// Users can toggle the record in list views.
    pub toggleable: bool,
}

/// One discovered savegame. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub id: SaveId,
    pub file_path: PathBuf,
    pub attributes: SaveAttributes,
}

impl SaveRecord {
    pub fn new(id: SaveId, file_path: PathBuf, metadata: SaveMetadata) -> Self {
        Self {
            id,
            file_path,
            attributes: SaveAttributes {
                metadata,
                toggleable: true,
            },
        }
    }
}

/// A file that could not be decoded, even after retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeFailure {
    pub file_name: String,
    pub message: String,
}

/// Outcome of one scan pass over a save directory.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Records whose id was not yet known when the pass ran.
    pub new_records: Vec<SaveRecord>,
    /// Per-file failures, in the order the files were visited.
    pub failures: Vec<DecodeFailure>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.new_records.is_empty() && self.failures.is_empty()
    }
}
