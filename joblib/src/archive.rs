//! Tar codec for moving directory trees in and out of a workspace.

use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::result;
use tar::{Archive, Builder, Entry, EntryType};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("malformed archive: {0}")]
    Malformed(#[source] io::Error),
    #[error("failed to archive {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = result::Result<T, ArchiveError>;

/// Extract a tar archive into `dest`, which must already exist.
///
/// Entries that would land outside `dest` are refused rather than skipped.
/// Directories are restored after everything else, deepest first, so a
/// read-only directory mode never blocks writing its own contents.
///
/// Failures of the archive itself are [`ArchiveError::Malformed`]; failures
/// of the filesystem underneath (permissions, disk space) are
/// [`ArchiveError::Io`].
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = Archive::new(bytes);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let mut directories = Vec::new();
    for entry in archive.entries().map_err(ArchiveError::Malformed)? {
        let entry = entry.map_err(ArchiveError::Malformed)?;
        if entry.header().entry_type() == EntryType::Directory {
            directories.push(entry);
        } else {
            unpack_entry(entry, dest)?;
        }
    }

    directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
    for entry in directories {
        unpack_entry(entry, dest)?;
    }
    Ok(())
}

fn unpack_entry<R: Read>(mut entry: Entry<'_, R>, dest: &Path) -> Result<()> {
    let path = entry.path().map(|p| p.into_owned()).unwrap_or_default();
    let unpacked = entry.unpack_in(dest).map_err(|source| match source.kind() {
        // tar reports bad headers, paths and truncated data with these kinds
        ErrorKind::InvalidData
        | ErrorKind::UnexpectedEof
        | ErrorKind::InvalidInput
        | ErrorKind::Other => ArchiveError::Malformed(source),
        _ => ArchiveError::Io {
            path: dest.join(&path),
            source,
        },
    })?;
    if !unpacked {
        return Err(ArchiveError::Malformed(io::Error::new(
            ErrorKind::InvalidData,
            format!("entry {:?} escapes the destination", path),
        )));
    }
    Ok(())
}

/// Archive everything under `dir`, with paths relative to `dir`.
///
/// Entries are visited in file name order so the same tree always yields the
/// same entry sequence. Symlinks are stored as links, not followed.
pub fn pack(dir: &Path) -> Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    builder.follow_symlinks(false);

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry?;
        let file_type = entry.file_type();
        // sockets and the like have no tar representation
        if !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()) {
            tracing::debug!(path = ?entry.path(), "skipping special file");
            continue;
        }
        let rel_path = entry
            .path()
            .strip_prefix(dir)
            .map_err(|err| ArchiveError::Io {
                path: entry.path().to_path_buf(),
                source: io::Error::new(ErrorKind::InvalidInput, err),
            })?;
        builder
            .append_path_with_name(entry.path(), rel_path)
            .map_err(|source| ArchiveError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
    }

    builder.into_inner().map_err(|source| ArchiveError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// An archive with no entries.
pub fn empty() -> Result<Vec<u8>> {
    Builder::new(Vec::new())
        .into_inner()
        .map_err(|source| ArchiveError::Io {
            path: PathBuf::new(),
            source,
        })
}
