//! Gzip compression of the day artifact.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::{Compression, GzBuilder};
use tracing::info;

use crate::artifact::compressed_file_name;
use crate::BackupError;

/// Compress `path` into `<path>.gz` at best compression.
///
/// The source file name is stored in the gzip header. Output goes to a
/// `.partial` sibling first and is renamed into place once the encoder has
/// finished, so a failed run never leaves a truncated `.gz` behind. The
/// source file is left untouched. Blocking.
pub fn compress_artifact(path: &Path) -> Result<PathBuf, BackupError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            BackupError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "artifact has no file name"),
            )
        })?;

    let compressed = path.with_file_name(compressed_file_name(&file_name));
    let partial = path.with_file_name(format!("{}.partial", compressed_file_name(&file_name)));

    if let Err(e) = write_gzip(path, &partial, &file_name) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }

    std::fs::rename(&partial, &compressed).map_err(|e| {
        let _ = std::fs::remove_file(&partial);
        BackupError::io(&compressed, e)
    })?;

    info!(
        source = %path.display(),
        path = %compressed.display(),
        "Compressed {}",
        file_name
    );
    Ok(compressed)
}

fn write_gzip(source: &Path, destination: &Path, name: &str) -> Result<(), BackupError> {
    let input = File::open(source).map_err(|e| BackupError::io(source, e))?;
    let output = File::create(destination).map_err(|e| BackupError::io(destination, e))?;

    let mut encoder = GzBuilder::new()
        .filename(name)
        .write(BufWriter::new(output), Compression::best());
    io::copy(&mut BufReader::new(input), &mut encoder)
        .map_err(|e| BackupError::io(destination, e))?;

    let mut writer = encoder
        .finish()
        .map_err(|e| BackupError::io(destination, e))?;
    writer.flush().map_err(|e| BackupError::io(destination, e))?;
    Ok(())
}
