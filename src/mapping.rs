use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::logging as log;

#[derive(thiserror::Error, Debug)]
pub enum MapError {
    #[error("Open Error: {0}")]
    OpenError(#[source] std::io::Error),

    #[error("Stat Error: {0}")]
    StatError(#[source] std::io::Error),

    #[error("Map Error: {0}")]
    MapError(#[source] std::io::Error),

    #[error("Map Error: {} is empty, nothing to map", .0.display())]
    EmptyFile(PathBuf),
}

/// A read-only, private (copy-on-write) mapping of the target file.
///
/// Owns both the mapping and the backing descriptor; the descriptor stays
/// open until the `RoMap` is dropped, which must outlive the racing phase.
/// Writes through the normal mapping path can never reach the backing
/// file, that is the property under attack.
#[derive(Debug)]
pub struct RoMap {
    file: File,
    map: Mmap,
    path: PathBuf,
}

impl RoMap {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<RoMap, MapError> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path).map_err(MapError::OpenError)?;
        let size = file.metadata().map_err(MapError::StatError)?.len();
        if size == 0 {
            return Err(MapError::EmptyFile(path));
        }

        let map = unsafe { MmapOptions::new().map_copy_read_only(&file) }
            .map_err(MapError::MapError)?;

        log::debug(format!(
            "mapped {} ({} bytes) read-only at {:#x}",
            path.display(),
            size,
            map.as_ptr() as usize
        ));

        Ok(RoMap { file, map, path })
    }

    /// Virtual base address of the mapping, the address both racing
    /// strategies write at.
    pub fn base(&self) -> usize {
        self.map.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backing_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Whether the backing descriptor is still open.
    pub fn fd_is_open(&self) -> bool {
        unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_GETFD) != -1 }
    }
}

impl std::ops::Deref for RoMap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn maps_existing_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"some backing bytes")?;

        let map = RoMap::open(file.path())?;
        assert_eq!(map.len(), 18);
        assert_ne!(map.base(), 0);
        assert_eq!(&map[..4], b"some");
        assert!(map.fd_is_open());
        Ok(())
    }

    #[test]
    fn empty_file_is_a_setup_error() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let err = RoMap::open(file.path()).unwrap_err();
        assert!(matches!(err, MapError::EmptyFile(_)));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = RoMap::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, MapError::OpenError(_)));
    }
}
