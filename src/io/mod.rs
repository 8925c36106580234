/// Reading and writing whole image files

use crate::error::Result;
use crate::format::DiskParameterBlock;
use crate::image::MappedImage;
use log::info;
use std::fs;
use std::path::Path;

/// Read an entire image file into memory
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    info!("read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Write an in-memory image to a file, replacing it
pub fn write_image<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, bytes)?;
    info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Map the reserved tracks and filesystem described by `dpb` from an image
/// file, creating or growing the file to fit. Used when formatting.
pub fn map_image<P: AsRef<Path>>(path: P, dpb: &DiskParameterBlock) -> Result<MappedImage> {
    MappedImage::create(path, 0, dpb.image_size())
}
