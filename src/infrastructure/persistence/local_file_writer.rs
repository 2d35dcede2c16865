//! Local file writer implementation
//!
//! Writes recovered files to the local filesystem. Names are claimed with
//! exclusive creation, so an existing file is never overwritten and
//! concurrent saves into one directory never collide.

use crate::domain::repositories::{FileWriterError, WriteResult};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffixes tried after the plain name before giving up
const MAX_SUFFIX: u32 = 9999;

/// Local file system writer
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileWriter;

impl LocalFileWriter {
    pub fn new() -> Self {
        Self
    }

    /// Creates `dir/name`, or `dir/<stem>_<n>.<ext>` for the first free `n`
    ///
    /// The directory is created when missing.
    pub fn reserve(&self, dir: &Path, name: &str) -> Result<ReservedFile, FileWriterError> {
        validate_name(name)?;
        fs::create_dir_all(dir).map_err(|e| map_io(e, dir))?;
        if !dir.is_dir() {
            return Err(FileWriterError::DirectoryNotFound(dir.display().to_string()));
        }

        let (stem, ext) = split_name(name);
        for suffix in 0..=MAX_SUFFIX {
            let candidate = match (suffix, ext) {
                (0, _) => name.to_string(),
                (n, Some(ext)) => format!("{stem}_{n}.{ext}"),
                (n, None) => format!("{stem}_{n}"),
            };
            let path = dir.join(&candidate);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    if suffix > 0 {
                        debug!("{name} exists, saving as {candidate}");
                    }
                    return Ok(ReservedFile::new(path, file));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(map_io(e, &path)),
            }
        }

        Err(FileWriterError::NameSpaceExhausted(name.to_string()))
    }
}

/// A destination file being written
///
/// Dropped before [`ReservedFile::commit`], the partial file is removed.
#[derive(Debug)]
pub struct ReservedFile {
    path: PathBuf,
    file: Option<File>,
    hasher: Sha256,
    written: u64,
}

impl ReservedFile {
    fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file: Some(file),
            hasher: Sha256::new(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), FileWriterError> {
        let Some(file) = self.file.as_mut() else {
            return Err(FileWriterError::IoError(io::Error::other("file already committed")));
        };
        file.write_all(data).map_err(|e| map_io(e, &self.path))?;
        self.hasher.update(data);
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flushes the file (and syncs it when `sync` is set) and keeps it
    pub fn commit(mut self, sync: bool) -> Result<WriteResult, FileWriterError> {
        let Some(mut file) = self.file.take() else {
            return Err(FileWriterError::IoError(io::Error::other("file already committed")));
        };
        let flushed = file.flush().and_then(|()| if sync { file.sync_all() } else { Ok(()) });
        if let Err(e) = flushed {
            drop(file);
            self.discard();
            return Err(map_io(e, &self.path));
        }

        let hasher = std::mem::take(&mut self.hasher);
        Ok(WriteResult {
            saved_path: std::mem::take(&mut self.path),
            saved_size: self.written,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Could not remove partial file {}: {e}", self.path.display());
        }
    }
}

impl Drop for ReservedFile {
    fn drop(&mut self) {
        // `file` is taken on commit
        if self.file.take().is_some() {
            self.discard();
        }
    }
}

fn validate_name(name: &str) -> Result<(), FileWriterError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(FileWriterError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Splits `a.b.c` into `("a.b", Some("c"))`; dotfiles keep their dot
fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], Some(&name[dot + 1..])),
        _ => (name, None),
    }
}

fn map_io(err: io::Error, path: &Path) -> FileWriterError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            FileWriterError::PermissionDenied(path.display().to_string())
        }
        io::ErrorKind::NotFound => FileWriterError::DirectoryNotFound(path.display().to_string()),
        io::ErrorKind::StorageFull => FileWriterError::DiskFull(path.display().to_string()),
        _ => FileWriterError::IoError(err),
    }
}
