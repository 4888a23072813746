//! Output writers: the Blogger Atom feed (default) or a JSON dump of the scraped details.

use crate::feed::{build_feed, FeedOptions};
use crate::model::MangaDetail;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Output format selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Atom,
    Json,
}

impl OutputFormat {
    pub fn default_file_name(self) -> &'static str {
        match self {
            OutputFormat::Atom => "mangaindo_blogger_import.xml",
            OutputFormat::Json => "mangaindo_blogger_import.json",
        }
    }
}

/// Errors from the output writers.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn create(path: &Path) -> Result<BufWriter<File>, FormatError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| FormatError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Render the Atom feed and write it as UTF-8 to `path`.
pub fn write_feed(
    details: &[MangaDetail],
    options: &FeedOptions,
    path: &Path,
) -> Result<(), FormatError> {
    let xml = build_feed(details, options);
    let mut f = create(path)?;
    f.write_all(xml.as_bytes())
        .and_then(|_| f.flush())
        .map_err(|e| FormatError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write the details as pretty-printed JSON to `path`.
pub fn write_json(details: &[MangaDetail], path: &Path) -> Result<(), FormatError> {
    let mut f = create(path)?;
    serde_json::to_writer_pretty(&mut f, details)?;
    f.flush().map_err(|e| FormatError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
