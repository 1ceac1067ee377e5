//! File copy for unmatched card files.
//!
//! The engine calls this once per unmatched entry when a copy destination
//! is configured. Copies never overwrite an existing destination file.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while copying a card file.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The source has no basename or is not a regular file.
    #[error("{0} is not a regular file")]
    NotRegular(PathBuf),
    /// The destination already exists; it is left untouched.
    #[error("{0} already exists")]
    DestinationExists(PathBuf),
    /// The copy itself failed.
    #[error("Failed to copy {src} to {dest}: {source}")]
    Io {
        /// Source path.
        src: PathBuf,
        /// Destination path.
        dest: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Copy `src` into `dest_dir`, keeping its basename.
///
/// Returns the destination path on success.
pub fn copy_into(src: &Path, dest_dir: &Path) -> Result<PathBuf, CopyError> {
    let name = src
        .file_name()
        .ok_or_else(|| CopyError::NotRegular(src.to_path_buf()))?;
    let dest = dest_dir.join(name);
    if dest.exists() {
        return Err(CopyError::DestinationExists(dest));
    }
    copy_file(src, &dest)?;
    Ok(dest)
}

#[cfg(not(windows))]
fn copy_file(src: &Path, dest: &Path) -> Result<(), CopyError> {
    let meta = std::fs::metadata(src).map_err(|source| CopyError::Io {
        src: src.to_path_buf(),
        dest: dest.to_path_buf(),
        source,
    })?;
    if !meta.is_file() {
        return Err(CopyError::NotRegular(src.to_path_buf()));
    }
    std::fs::copy(src, dest).map_err(|source| CopyError::Io {
        src: src.to_path_buf(),
        dest: dest.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(windows)]
fn copy_file(src: &Path, dest: &Path) -> Result<(), CopyError> {
    use windows::Win32::Storage::FileSystem::CopyFileW;
    use windows::core::HSTRING;

    let existing = HSTRING::from(src.as_os_str());
    let target = HSTRING::from(dest.as_os_str());
    // bFailIfExists is set; the pre-check above only narrows the race.
    unsafe { CopyFileW(&existing, &target, true.into()) }.map_err(|source| CopyError::Io {
        src: src.to_path_buf(),
        dest: dest.to_path_buf(),
        source: std::io::Error::other(source),
    })
}
