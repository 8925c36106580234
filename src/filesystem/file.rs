/// Files assembled from their directory extents

use crate::filesystem::entry::{DirectoryEntry, EntryLocation};
use crate::filesystem::name::join_name;
use crate::filesystem::FileFlags;
use crate::format::constants::RECORD_SIZE;
use crate::format::DiskParameterBlock;
use crate::image::DiskBuffer;
use std::fmt;

/// A logical file: every extent sharing one user number and 8.3 name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpmFile {
    entries: Vec<DirectoryEntry>,
    record_count: usize,
    blocks: Vec<u16>,
}

impl CpmFile {
    /// Aggregate the extents of one file.
    ///
    /// Extents are ordered by extent number; blocks are the non-zero
    /// pointers of each extent in that order. Returns `None` without
    /// entries.
    pub fn from_entries(mut entries: Vec<DirectoryEntry>) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        entries.sort_by_key(|e| e.extent());

        let record_count = entries.iter().map(|e| e.record_count() as usize).sum();
        let blocks = entries.iter().flat_map(|e| e.blocks()).collect();

        Some(Self {
            entries,
            record_count,
            blocks,
        })
    }

    fn first(&self) -> &DirectoryEntry {
        &self.entries[0]
    }

    /// User number (the stat byte of the extents)
    pub fn user(&self) -> u8 {
        self.first().stat()
    }

    /// Name part
    pub fn name(&self) -> &str {
        self.first().name()
    }

    /// Extension part
    pub fn extension(&self) -> &str {
        self.first().extension()
    }

    /// `NAME.EXT`
    pub fn full_name(&self) -> String {
        join_name(self.name(), self.extension())
    }

    /// Flags of the first extent
    pub fn flags(&self) -> FileFlags {
        self.first().flags()
    }

    /// BC byte of the last extent
    pub fn bc(&self) -> u8 {
        self.entries.last().map_or(0, |e| e.bc())
    }

    /// Total 128-byte records across all extents
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// File size in bytes, rounded up to a whole record
    pub fn size(&self) -> usize {
        self.record_count * RECORD_SIZE
    }

    /// Data blocks in file order
    pub fn blocks(&self) -> &[u16] {
        &self.blocks
    }

    /// Extents ordered by extent number
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Directory slots holding the extents
    pub fn locations(&self) -> Vec<EntryLocation> {
        self.entries.iter().map(|e| e.location()).collect()
    }

    /// Read the file contents, `size()` bytes long.
    ///
    /// Each block contributes up to a block of the bytes still owed. Blocks
    /// past the end of the buffer are read as zeros.
    pub fn read_contents<B: DiskBuffer + ?Sized>(&self, buffer: &B, dpb: &DiskParameterBlock) -> Vec<u8> {
        let size = self.size();
        let block_size = dpb.block_size();
        let data = buffer.bytes();
        let mut contents = Vec::with_capacity(size);

        for &block in &self.blocks {
            let wanted = (size - contents.len()).min(block_size);
            if wanted == 0 {
                break;
            }
            let start = dpb.offset_bytes() + block as usize * block_size;
            let end = (start + wanted).min(data.len());
            if start < end {
                contents.extend_from_slice(&data[start..end]);
            }
            contents.resize(contents.len() + wanted - end.saturating_sub(start), 0);
        }
        contents.resize(size, 0);

        contents
    }
}

impl fmt::Display for CpmFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>2}:{:<12} {:>9} bytes  {}  {} extent(s), {} block(s)",
            self.user(),
            self.full_name(),
            self.size(),
            self.flags(),
            self.entries.len(),
            self.blocks.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FileName;

    fn extent(slot: u16, extent: u16, blocks: &[u16], last_bytes: usize, dpb: &DiskParameterBlock) -> DirectoryEntry {
        let name = FileName::parse("DATA.BIN").unwrap();
        let mut entry = DirectoryEntry::new(EntryLocation::new(0, slot), 2, &name, FileFlags::empty(), extent, dpb);
        for (i, &block) in blocks.iter().enumerate() {
            let bytes = if i + 1 == blocks.len() { last_bytes } else { dpb.block_size() };
            entry = entry.with_block(block, bytes, dpb);
        }
        entry
    }

    #[test]
    fn test_aggregate_sorts_extents() {
        let dpb = DiskParameterBlock::z80rb();
        let first = extent(5, 0, &[10, 11, 12, 13, 14, 15, 16, 17], 4096, &dpb);
        let second = extent(1, 1, &[20, 21], 200, &dpb);

        let file = CpmFile::from_entries(vec![second, first]).unwrap();
        assert_eq!(file.user(), 2);
        assert_eq!(file.full_name(), "DATA.BIN");
        assert_eq!(file.blocks(), &[10, 11, 12, 13, 14, 15, 16, 17, 20, 21]);
        assert_eq!(file.record_count(), 256 + 32 + 2);
        assert_eq!(file.size(), 290 * 128);
        assert_eq!(file.locations(), vec![EntryLocation::new(0, 5), EntryLocation::new(0, 1)]);
    }

    #[test]
    fn test_empty_aggregate() {
        assert!(CpmFile::from_entries(Vec::new()).is_none());
    }

    #[test]
    fn test_read_contents() {
        let dpb = DiskParameterBlock::z80rb();
        let mut buffer = vec![0u8; dpb.filesystem_size()];
        buffer[4 * 4096..5 * 4096].fill(0xAA);
        buffer[7 * 4096..7 * 4096 + 100].fill(0xBB);

        let file = CpmFile::from_entries(vec![extent(0, 0, &[4, 7], 100, &dpb)]).unwrap();
        let contents = file.read_contents(&buffer, &dpb);
        assert_eq!(contents.len(), 4096 + 128);
        assert!(contents[..4096].iter().all(|&b| b == 0xAA));
        assert!(contents[4096..4196].iter().all(|&b| b == 0xBB));
        assert!(contents[4196..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_contents_short_buffer() {
        let dpb = DiskParameterBlock::z80rb();
        let buffer = vec![0x11u8; 4096 + 50];

        let file = CpmFile::from_entries(vec![extent(0, 0, &[1], 256, &dpb)]).unwrap();
        let contents = file.read_contents(&buffer, &dpb);
        assert_eq!(contents.len(), 256);
        assert!(contents[..50].iter().all(|&b| b == 0x11));
        assert!(contents[50..].iter().all(|&b| b == 0));
    }
}
