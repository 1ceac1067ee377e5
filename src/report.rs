//! Report sink and HTML rendering for unmatched card files.
//!
//! Entries are appended from any worker thread in arbitrary order;
//! determinism comes from the final sort by basename before rendering.

use std::{
    ffi::OsStr,
    fmt,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use thiserror::Error;

/// Why a card file is considered to have no backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// No disk file shares the card file's name and size.
    NoNameMatch,
    /// The card file is more than an hour newer than its disk candidate.
    StaleOnCard,
    /// The disk candidate's content differs from the card file.
    ContentMismatch,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::NoNameMatch => "no file with that name and size on disk",
            Reason::StaleOnCard => "newer on card than on disk",
            Reason::ContentMismatch => "content differs from disk copy",
        };
        f.write_str(text)
    }
}

/// One card file without a verified backup.
///
/// `path` is always the card file's path; the tool reports missing card
/// backups, never extra disk files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmatched {
    /// Path of the card file.
    pub path: PathBuf,
    /// Why it counts as unbacked.
    pub reason: Reason,
}

impl Unmatched {
    /// Convenience constructor.
    pub fn new(path: PathBuf, reason: Reason) -> Self {
        Self { path, reason }
    }
}

/// Thread-safe, append-only collection of unmatched entries.
#[derive(Debug, Default)]
pub struct ReportSink {
    entries: Mutex<Vec<Unmatched>>,
}

impl ReportSink {
    /// Append an entry; callable from any thread.
    pub fn push(&self, entry: Unmatched) {
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(entry);
    }

    /// Number of entries collected so far.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    /// Whether no entries have been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take all entries, sorted by the basename of their path.
    pub fn drain_sorted(&self) -> Vec<Unmatched> {
        let mut entries = std::mem::take(
            &mut *self
                .entries
                .lock()
                .unwrap_or_else(|err| err.into_inner()),
        );
        entries.sort_by(|a, b| basename(&a.path).cmp(basename(&b.path)));
        entries
    }
}

fn basename(path: &Path) -> &OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

/// Errors raised while writing the report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report file could not be written.
    #[error("Failed to write report {path}: {source}")]
    Write {
        /// Report output path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Render the entries as an HTML document at `out_path`.
///
/// Each entry becomes a clickable `file:///` link followed by its reason.
pub fn render_html(entries: &[Unmatched], out_path: &Path) -> Result<(), ReportError> {
    let mut html = String::new();
    html.push_str("<html>\n<head><title>Files without backup</title></head>\n<body>\n");
    html.push_str("<h1>Files without backup on disk</h1>\n");
    for entry in entries {
        let shown = entry.path.display().to_string();
        let _ = writeln!(
            html,
            "<a href=\"{}\">{shown}</a> ({})<br>",
            file_url(&entry.path),
            entry.reason
        );
    }
    html.push_str("</body>\n</html>\n");
    fs::write(out_path, html).map_err(|source| ReportError::Write {
        path: out_path.to_path_buf(),
        source,
    })
}

// Windows paths use backslashes; file URLs want forward slashes.
fn file_url(path: &Path) -> String {
    let text = path.display().to_string().replace('\\', "/");
    format!("file:///{}", text.trim_start_matches('/'))
}
