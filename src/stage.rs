//! Plain file I/O around the race: staging a backup of the target before
//! corrupting it, and checking afterwards whether the payload actually
//! reached the backing file.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::logging as log;

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("Backup Error: {} already exists, refusing to clobber it", .0.display())]
    BackupExists(PathBuf),

    #[error("Stdio Error")]
    StdIOError(#[from] std::io::Error),
}

/// Copy the target aside before racing. Fails rather than overwrite an
/// existing backup, a second run must not destroy the pristine copy taken
/// by the first.
pub fn backup<P: AsRef<Path>, Q: AsRef<Path>>(target: P, dest: Q) -> Result<u64, StageError> {
    let dest = dest.as_ref();
    if dest.exists() {
        return Err(StageError::BackupExists(dest.to_path_buf()));
    }

    let copied = std::fs::copy(target.as_ref(), dest)?;
    log::debug(format!(
        "staged {} bytes of {} at {}",
        copied,
        target.as_ref().display(),
        dest.display()
    ));
    Ok(copied)
}

/// Re-read the raced byte range through a fresh descriptor and compare it
/// with the payload. This is the only success signal the race has; the
/// engine itself can never tell whether a poke landed on the backing file
/// or on a discarded private copy.
pub fn verify<P: AsRef<Path>>(target: P, offset: usize, payload: &[u8]) -> Result<bool, StageError> {
    let mut file = File::open(target.as_ref())?;
    file.seek(SeekFrom::Start(offset as u64))?;

    let mut observed = vec![0u8; payload.len()];
    match file.read_exact(&mut observed) {
        Ok(()) => Ok(observed == payload),
        // file shorter than offset + payload, the write cannot have landed
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}
