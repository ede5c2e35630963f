//! Archival of discovered files.
//!
//! Before the follow-on upload job is enqueued, the discovered file is moved
//! out of the scanned directory so the next scan does not re-discover it.
//! The move must survive an archive directory on another partition: a plain
//! rename fails across devices, so the fallback copies then unlinks.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PathError;
use crate::types::JobId;

use super::entry::DirmonEntry;

/// Token identifying archive directories during scans.
///
/// Any resolved path containing this token is skipped by `each`, so archived
/// files are never re-discovered even when the glob matches them.
pub const DEFAULT_ARCHIVE_DIRECTORY: &str = "archive";

impl DirmonEntry {
    /// Resolves the archive target directory for a discovered file.
    ///
    /// A relative `archive_directory` is resolved against the file's parent
    /// directory; an absolute one is used as-is.
    pub fn archive_pathname(&self, pathname: &Path) -> PathBuf {
        let dir = Path::new(&self.archive_directory);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            match pathname.parent() {
                Some(parent) => parent.join(dir),
                None => dir.to_path_buf(),
            }
        }
    }

    /// Moves a discovered file into the archive directory.
    ///
    /// The target directory tree is created on demand; the archived file is
    /// named `{job_id}_{basename}` so the upload job can always be traced
    /// back from the file on disk. Returns the full target path.
    ///
    /// # Errors
    ///
    /// Fails with a no-such-path error naming the attempted directory when
    /// the target tree cannot be created, or an IO error when the move
    /// itself fails.
    pub fn archive_file(&self, job_id: JobId, pathname: &Path) -> Result<PathBuf, PathError> {
        let target_dir = self.archive_pathname(pathname);
        std::fs::create_dir_all(&target_dir).map_err(|source| PathError::NoSuchPath {
            path: target_dir.clone(),
            source,
        })?;

        let Some(base) = pathname.file_name() else {
            return Err(PathError::Io {
                path: pathname.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            });
        };
        let target = target_dir.join(format!("{}_{}", job_id, base.to_string_lossy()));

        move_file(pathname, &target)?;
        debug!(
            source = %pathname.display(),
            target = %target.display(),
            "archived file"
        );
        Ok(target)
    }
}

/// Moves a file, falling back to copy + unlink when the rename crosses
/// devices.
fn move_file(source: &Path, target: &Path) -> Result<(), PathError> {
    match std::fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            std::fs::copy(source, target).map_err(|source_err| PathError::Io {
                path: target.to_path_buf(),
                source: source_err,
            })?;
            std::fs::remove_file(source).map_err(|source_err| PathError::Io {
                path: source.to_path_buf(),
                source: source_err,
            })?;
            Ok(())
        }
        Err(source_err) => Err(PathError::Io {
            path: source.to_path_buf(),
            source: source_err,
        }),
    }
}
