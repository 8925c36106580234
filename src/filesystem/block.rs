/// Directory blocks and the entries they hold

use crate::filesystem::entry::{DirectoryEntry, EntryLocation};
use crate::format::constants::ENTRY_SIZE;
use crate::format::DiskParameterBlock;
use log::trace;

/// A directory block decoded into its entry slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationBlock {
    index: u16,
    entries: Vec<DirectoryEntry>,
}

impl AllocationBlock {
    /// Decode every 32-byte slot of a directory block.
    ///
    /// A trailing partial slot is ignored.
    pub fn decode(index: u16, data: &[u8], dpb: &DiskParameterBlock) -> Self {
        let entries = data
            .chunks_exact(ENTRY_SIZE)
            .enumerate()
            .map(|(slot, raw)| {
                let mut bytes = [0u8; ENTRY_SIZE];
                bytes.copy_from_slice(raw);
                let entry = DirectoryEntry::decode(&bytes, EntryLocation::new(index, slot as u16), dpb);
                if entry.is_used() {
                    trace!("{}", entry);
                }
                entry
            })
            .collect();

        Self { index, entries }
    }

    /// Block index on disk
    pub fn index(&self) -> u16 {
        self.index
    }

    /// All slots, used or not
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Slots holding a live entry
    pub fn used_slots(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(|e| e.is_used())
    }

    /// Slots free for new entries
    pub fn unused_slots(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(|e| !e.is_used())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_block() {
        let dpb = DiskParameterBlock::z80rb();
        let mut data = vec![0xE5u8; dpb.block_size()];
        data[32..64].fill(0);
        data[33..44].copy_from_slice(b"HELLO   TXT");
        data[32 + 15] = 0x01;
        data[32 + 16] = 0x04;

        let block = AllocationBlock::decode(2, &data, &dpb);
        assert_eq!(block.index(), 2);
        assert_eq!(block.entries().len(), 128);
        assert_eq!(block.unused_slots().count(), 127);

        let used: Vec<_> = block.used_slots().collect();
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].full_name(), "HELLO.TXT");
        assert_eq!(used[0].location(), EntryLocation::new(2, 1));
        assert_eq!(used[0].record_count(), 1);
        assert_eq!(used[0].blocks().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_decode_short_block() {
        let dpb = DiskParameterBlock::z80rb();
        let block = AllocationBlock::decode(0, &[0xE5u8; 70], &dpb);
        assert_eq!(block.entries().len(), 2);
    }
}
