//! Path resolution for the routines data directory.
//!
//! The data directory is also the git working copy: it holds the store file,
//! uploaded media, and the snapshot documents.

use std::env;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "ROUTINES_DATA_DIR";
pub const DB_FILE: &str = "data.db";
/// Snapshot documents, relative to the data directory.
pub const SNAPSHOT_DIR: &str = "snapshots";
/// Uploaded media, relative to the data directory.
pub const MEDIA_DIR: &str = "static/videos";
/// Thumbnails, relative to the media directory.
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Resolve the data directory from an arbitrary variable lookup.
///
/// Order: `ROUTINES_DATA_DIR`, then `$XDG_DATA_HOME/routines`, then
/// `$HOME/.local/share/routines`, then `./routines`.
pub fn data_dir_from<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = non_empty(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    let data_home = non_empty("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty("HOME").map(|home| PathBuf::from(home).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_home.join("routines")
}

/// Get the data directory from the process environment.
pub fn get_data_dir() -> PathBuf {
    data_dir_from(|key| env::var(key).ok())
}

/// Store file inside a data directory.
pub fn get_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

/// Media directory inside a data directory.
pub fn get_media_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(MEDIA_DIR)
}

/// Thumbnail directory inside a data directory.
pub fn get_thumbnail_dir(data_dir: &Path) -> PathBuf {
    get_media_dir(data_dir).join(THUMBNAIL_DIR)
}
