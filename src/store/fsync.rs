//! Low-level fsync helpers for durable state writes.
//!
//! Renaming a file updates its directory entry; without an fsync on the
//! directory that entry may not survive a power loss even when the file
//! contents were synced. Both halves are needed for the atomic-replace
//! discipline in [`super::StateStore`].

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory, making renames and creations within it durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
