/// Memory-mapped disk image files

use crate::error::{CpmError, Result};
use crate::image::DiskBuffer;
use log::debug;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A region of an image file mapped read-write into memory.
///
/// Writes land in the page cache immediately and reach the file on
/// [`DiskBuffer::flush`].
#[derive(Debug)]
pub struct MappedImage {
    map: MmapMut,
    path: PathBuf,
    offset: u64,
    _file: File,
}

impl MappedImage {
    /// Map `len` bytes of an existing file at `path`, starting at `offset`.
    ///
    /// The file is never created or resized: a missing file is an I/O
    /// error and one shorter than `offset + len` is `OutOfBounds`.
    pub fn open<P: AsRef<Path>>(path: P, offset: u64, len: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let size = file.metadata()?.len();
        if size < offset + len as u64 {
            return Err(CpmError::OutOfBounds {
                offset: offset as usize,
                len,
                size: size as usize,
            });
        }

        Self::map(file, path, offset, len)
    }

    /// Map `len` bytes of the file at `path`, starting at `offset`, creating
    /// the file or growing it with zero bytes as needed.
    pub fn create<P: AsRef<Path>>(path: P, offset: u64, len: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let required = offset + len as u64;
        if file.metadata()?.len() < required {
            debug!("growing {} to {} bytes", path.display(), required);
            file.set_len(required)?;
        }

        Self::map(file, path, offset, len)
    }

    fn map(file: File, path: &Path, offset: u64, len: usize) -> Result<Self> {
        // SAFETY: the mapping is backed by a file we hold open for the
        // lifetime of the map. Concurrent modification by other processes is
        // outside the engine's single-writer contract.
        let map = unsafe { MmapOptions::new().offset(offset).len(len).map_mut(&file)? };

        Ok(Self {
            map,
            path: path.to_path_buf(),
            offset,
            _file: file,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the mapped region within the file
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl DiskBuffer for MappedImage {
    fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    fn flush(&mut self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}
