//! Packaging of downloaded ticket images.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use zip::write::FileOptions;
use zip::ZipWriter;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive write error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Write the fetched ticket images into a zip archive at `path`.
///
/// Entries are named `ticket_<summons>.pdf` in input order. The parent
/// directory is created if needed.
pub fn write_archive(path: &Path, images: &[(String, Vec<u8>)]) -> Result<(), ArchiveError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default();

    for (summons_number, bytes) in images {
        writer.start_file(format!("ticket_{}.pdf", summons_number), options)?;
        writer.write_all(bytes)?;
    }

    writer.finish()?;
    debug!(path = %path.display(), entries = images.len(), "Ticket archive written");
    Ok(())
}
