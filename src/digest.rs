//! Bounded-prefix content digests.
//!
//! Only the first [`PREFIX_LIMIT`] bytes of a file participate in the
//! digest; on large video and raw files that is enough to tell copies
//! apart without reading gigabytes. Memoization lives in the index
//! records, not here: this function reads the file every time it is
//! called.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Upper bound on the number of bytes hashed per file.
pub const PREFIX_LIMIT: u64 = 1024 * 1024;

/// Errors raised while computing a digest.
///
/// Any failure here is fatal to the whole run: a comparison that cannot be
/// completed makes the report untrustworthy.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Opening or reading the file failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Digest of at most the first [`PREFIX_LIMIT`] bytes of `path`.
pub fn prefix_digest(path: &Path) -> Result<[u8; 32], DigestError> {
    let file = fs::File::open(path).map_err(|source| DigestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = blake3::Hasher::new();
    let mut reader = file.take(PREFIX_LIMIT);
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(*hasher.finalize().as_bytes())
}
