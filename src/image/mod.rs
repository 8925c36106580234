/// Disk image buffers

/// Memory-mapped image files
pub mod mapped;

pub use mapped::MappedImage;

use crate::error::{CpmError, Result};

/// A random-access, mutable byte region holding a disk image.
///
/// The filesystem engine only ever talks to its storage through this trait,
/// so the same code runs over a `Vec<u8>`, a slice of a larger partitioned
/// image, or a memory-mapped file.
pub trait DiskBuffer {
    /// The whole region
    fn bytes(&self) -> &[u8];

    /// The whole region, mutably
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Length of the region in bytes
    fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Check if the region is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow `len` bytes starting at `offset`
    fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let size = self.len();
        offset
            .checked_add(len)
            .filter(|&end| end <= size)
            .map(|end| &self.bytes()[offset..end])
            .ok_or(CpmError::OutOfBounds { offset, len, size })
    }

    /// Copy `data` into the region at `offset`
    fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let region = self.region_mut(offset, data.len())?;
        region.copy_from_slice(data);
        Ok(())
    }

    /// Fill `len` bytes at `offset` with `value`
    fn fill_bytes(&mut self, offset: usize, len: usize, value: u8) -> Result<()> {
        let region = self.region_mut(offset, len)?;
        region.fill(value);
        Ok(())
    }

    /// Mutably borrow `len` bytes starting at `offset`
    fn region_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(&mut self.bytes_mut()[offset..end]),
            _ => Err(CpmError::OutOfBounds { offset, len, size }),
        }
    }

    /// Force pending writes to the backing store, if there is one
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl DiskBuffer for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl DiskBuffer for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl<T: DiskBuffer + ?Sized> DiskBuffer for &mut T {
    fn bytes(&self) -> &[u8] {
        (**self).bytes()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        (**self).bytes_mut()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<T: DiskBuffer + ?Sized> DiskBuffer for Box<T> {
    fn bytes(&self) -> &[u8] {
        (**self).bytes()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        (**self).bytes_mut()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}
