/// Directory entry codec

use crate::error::Result;
use crate::filesystem::name::{join_name, FileName};
use crate::filesystem::FileFlags;
use crate::format::constants::*;
use crate::format::DiskParameterBlock;
use crate::image::DiskBuffer;
use std::fmt;

/// Where a directory entry lives: directory block index and slot within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryLocation {
    /// Directory block index
    pub block: u16,
    /// Slot within the block
    pub slot: u16,
}

impl EntryLocation {
    /// Create a new location
    pub fn new(block: u16, slot: u16) -> Self {
        Self { block, slot }
    }

    /// Absolute byte offset of the entry in the disk buffer
    pub fn offset(&self, dpb: &DiskParameterBlock) -> usize {
        dpb.offset_bytes() + self.block as usize * dpb.block_size() + ENTRY_SIZE * self.slot as usize
    }
}

/// One 32-byte directory slot.
///
/// A file occupies one entry per extent. Entries are immutable values: they
/// are decoded from disk or built for a new extent, then encoded back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    location: EntryLocation,
    stat: u8,
    name: String,
    extension: String,
    flags: FileFlags,
    extent: u16,
    record_count: u16,
    bc: u8,
    pointers: Vec<u16>,
}

/// Bits XH is shifted by when forming the extent number
fn extent_high_shift(extent_mask: u8) -> u32 {
    5 - (extent_mask as u32 + 1).trailing_zeros()
}

impl DirectoryEntry {
    /// Start a new, empty extent for a file
    pub fn new(
        location: EntryLocation,
        user: u8,
        name: &FileName,
        flags: FileFlags,
        extent: u16,
        dpb: &DiskParameterBlock,
    ) -> Self {
        Self {
            location,
            stat: user,
            name: name.name().to_string(),
            extension: name.extension().to_string(),
            flags,
            extent,
            record_count: 0,
            bc: 0,
            pointers: vec![0; dpb.pointers_per_entry()],
        }
    }

    /// Decode an entry from its raw bytes
    pub fn decode(raw: &[u8; ENTRY_SIZE], location: EntryLocation, dpb: &DiskParameterBlock) -> Self {
        let stat = raw[ENTRY_STAT_OFFSET];

        let mut flags = FileFlags::empty();
        let mut chars = [0u8; FLAG_BITS];
        for (i, &byte) in raw[ENTRY_NAME_OFFSET..ENTRY_XL_OFFSET].iter().enumerate() {
            if byte & 0x80 != 0 {
                flags = flags.with(i);
            }
            chars[i] = byte & 0x7F;
        }
        let text = |bytes: &[u8]| -> String {
            bytes.iter().map(|&b| b as char).collect::<String>().trim().to_string()
        };
        let name = text(&chars[..FILENAME_LEN]);
        let extension = text(&chars[FILENAME_LEN..]);

        let xl = raw[ENTRY_XL_OFFSET];
        let bc = raw[ENTRY_BC_OFFSET];
        let xh = raw[ENTRY_XH_OFFSET];
        let rc = raw[ENTRY_RC_OFFSET];

        let exm = dpb.extent_mask();
        let record_count = (((xl & exm) as u16) << 7) + rc as u16;
        let extent = ((xh as u16) << extent_high_shift(exm)) + (xl / (exm + 1)) as u16;

        let pointer_bytes = &raw[ENTRY_POINTERS_OFFSET..];
        let pointers = match dpb.pointer_size() {
            1 => pointer_bytes.iter().map(|&b| b as u16).collect(),
            _ => pointer_bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        };

        Self {
            location,
            stat,
            name,
            extension,
            flags,
            extent,
            record_count,
            bc,
            pointers,
        }
    }

    /// Encode the entry to its raw bytes
    pub fn encode(&self, dpb: &DiskParameterBlock) -> [u8; ENTRY_SIZE] {
        let mut raw = [0u8; ENTRY_SIZE];
        raw[ENTRY_STAT_OFFSET] = self.stat;

        let padded = format!(
            "{:<name_len$}{:<ext_len$}",
            self.name,
            self.extension,
            name_len = FILENAME_LEN,
            ext_len = EXTENSION_LEN
        );
        for (i, byte) in padded.bytes().take(FLAG_BITS).enumerate() {
            raw[ENTRY_NAME_OFFSET + i] = byte & 0x7F;
            if self.flags.is_set(i) {
                raw[ENTRY_NAME_OFFSET + i] |= 0x80;
            }
        }

        let exm = dpb.extent_mask() as u32;
        let extent = self.extent as u32;
        let mut xl = (extent * (exm + 1)) & 0x1F;
        let records = self.record_count as u32;
        if records >= RECORD_SIZE as u32 {
            xl |= ((records - RECORD_SIZE as u32) >> 7) & exm;
        }
        raw[ENTRY_XL_OFFSET] = xl as u8;
        raw[ENTRY_BC_OFFSET] = 0;
        raw[ENTRY_XH_OFFSET] = (extent >> extent_high_shift(dpb.extent_mask())) as u8;
        raw[ENTRY_RC_OFFSET] = (records - (xl & exm) * RECORD_SIZE as u32) as u8;

        let pointer_bytes = &mut raw[ENTRY_POINTERS_OFFSET..];
        match dpb.pointer_size() {
            1 => {
                for (slot, &pointer) in pointer_bytes.iter_mut().zip(&self.pointers) {
                    *slot = pointer as u8;
                }
            }
            _ => {
                for (slot, &pointer) in pointer_bytes.chunks_exact_mut(2).zip(&self.pointers) {
                    slot.copy_from_slice(&pointer.to_le_bytes());
                }
            }
        }

        raw
    }

    /// Encode the entry and write it to its location in the buffer
    pub fn write_entry<B: DiskBuffer + ?Sized>(&self, buffer: &mut B, dpb: &DiskParameterBlock) -> Result<()> {
        buffer.write_bytes(self.location.offset(dpb), &self.encode(dpb))
    }

    /// Copy of this entry with `block` added to the next free pointer slot.
    ///
    /// The record count becomes the full blocks already held plus the records
    /// covering `bytes_in_block`. A full entry is returned unchanged.
    pub(crate) fn with_block(mut self, block: u16, bytes_in_block: usize, dpb: &DiskParameterBlock) -> Self {
        let held = self.pointers.iter().filter(|&&p| p != 0).count();
        if let Some(slot) = self.pointers.iter_mut().find(|p| **p == 0) {
            *slot = block;
            self.record_count = (dpb.block_record_count() * held + records_for(bytes_in_block)) as u16;
        }
        self
    }

    /// Location of the entry on disk
    pub fn location(&self) -> EntryLocation {
        self.location
    }

    /// Stat byte: the user number, or 0xE5 when unused
    pub fn stat(&self) -> u8 {
        self.stat
    }

    /// Check if the slot holds a live entry
    pub fn is_used(&self) -> bool {
        self.stat != DELETED_STAT
    }

    /// Name part of the file name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extension part of the file name
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `NAME.EXT`, or `NAME` when there is no extension
    pub fn full_name(&self) -> String {
        join_name(&self.name, &self.extension)
    }

    /// Hidden flag bits
    pub fn flags(&self) -> FileFlags {
        self.flags
    }

    /// Extent number
    pub fn extent(&self) -> u16 {
        self.extent
    }

    /// Number of 128-byte records in this extent
    pub fn record_count(&self) -> u16 {
        self.record_count
    }

    /// Byte count of the last record (CP/M 3)
    pub fn bc(&self) -> u8 {
        self.bc
    }

    /// All pointer slots, zero for unused
    pub fn block_pointers(&self) -> &[u16] {
        &self.pointers
    }

    /// Non-zero block pointers in slot order
    pub fn blocks(&self) -> impl Iterator<Item = u16> + '_ {
        self.pointers.iter().copied().filter(|&p| p != 0)
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blocks: Vec<String> = self.pointers.iter().map(|p| format!("0x{:04x}", p)).collect();
        write!(
            f,
            "Stat: 0x{:02x}, File name: {:>12}, bc: 0x{:02x}, extent: {:>2}, record count: {:>4}, flags: {}, blocks: [{}]",
            self.stat,
            self.full_name(),
            self.bc,
            self.extent,
            self.record_count,
            self.flags,
            blocks.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BIGTREK_ENTRY_1: [u8; 32] = [
        0x00, 0x42, 0x49, 0x47, 0x54, 0x52, 0x45, 0x4B, 0x20, 0x42, 0x41, 0x53, 0x01, 0x00, 0x00,
        0x80, 0x09, 0x00, 0x0A, 0x00, 0x0B, 0x00, 0x0C, 0x00, 0x0D, 0x00, 0x0E, 0x00, 0x0F, 0x00,
        0x10, 0x00,
    ];

    const BIGTREK_ENTRY_2: [u8; 32] = [
        0x00, 0x42, 0x49, 0x47, 0x54, 0x52, 0x45, 0x4B, 0x20, 0x42, 0x41, 0x53, 0x02, 0x00, 0x00,
        0x38, 0x11, 0x00, 0x12, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ];

    const TESTTXT_ENTRY_2: [u8; 32] = [
        0x1F, 0x54, 0x45, 0x53, 0x54, 0x20, 0x20, 0x20, 0x20, 0x54, 0x58, 0x54, 0x03, 0x00, 0x01,
        0x80, 0xA4, 0x01, 0xA5, 0x01, 0xA6, 0x01, 0xA7, 0x01, 0xA8, 0x01, 0xA9, 0x01, 0xAA, 0x01,
        0xAB, 0x01,
    ];

    const TESTTXT_ENTRY_3: [u8; 32] = [
        0x1F, 0x54, 0x45, 0x53, 0x54, 0x20, 0x20, 0x20, 0x20, 0x54, 0x58, 0x54, 0x04, 0x00, 0x04,
        0x28, 0x2C, 0x03, 0x2D, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ];

    #[test]
    fn test_decode_full_extent() {
        let dpb = DiskParameterBlock::z80rb();
        let entry = DirectoryEntry::decode(&BIGTREK_ENTRY_1, EntryLocation::new(4, 10), &dpb);

        assert_eq!(entry.location(), EntryLocation::new(4, 10));
        assert_eq!(entry.stat(), 0);
        assert_eq!(entry.name(), "BIGTREK");
        assert_eq!(entry.extension(), "BAS");
        assert_eq!(entry.full_name(), "BIGTREK.BAS");
        assert_eq!(entry.extent(), 0);
        assert_eq!(entry.record_count(), 256);
        assert!(entry.flags().is_empty());
        assert_eq!(entry.bc(), 0);
        assert_eq!(entry.block_pointers(), &[9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn test_decode_partial_extent() {
        let dpb = DiskParameterBlock::z80rb();
        let entry = DirectoryEntry::decode(&BIGTREK_ENTRY_2, EntryLocation::new(4, 11), &dpb);

        assert_eq!(entry.extent(), 1);
        assert_eq!(entry.record_count(), 56);
        assert_eq!(entry.block_pointers(), &[0x11, 0x12, 0, 0, 0, 0, 0, 0]);
        assert_eq!(entry.blocks().collect::<Vec<_>>(), vec![0x11, 0x12]);
    }

    #[test]
    fn test_decode_high_extents() {
        let dpb = DiskParameterBlock::z80rb();
        let entry = DirectoryEntry::decode(&TESTTXT_ENTRY_2, EntryLocation::new(512, 256), &dpb);
        assert_eq!(entry.stat(), 31);
        assert_eq!(entry.full_name(), "TEST.TXT");
        assert_eq!(entry.extent(), 17);
        assert_eq!(entry.record_count(), 256);
        assert_eq!(entry.block_pointers()[0], 0x01A4);

        let entry = DirectoryEntry::decode(&TESTTXT_ENTRY_3, EntryLocation::new(1025, 513), &dpb);
        assert_eq!(entry.extent(), 66);
        assert_eq!(entry.record_count(), 40);
        assert_eq!(entry.block_pointers(), &[0x032C, 0x032D, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_flags() {
        let dpb = DiskParameterBlock::z80rb();
        let mut raw = BIGTREK_ENTRY_1;
        raw[9] |= 0x80; // T1' read-only
        raw[11] |= 0x80; // T3' archived
        let entry = DirectoryEntry::decode(&raw, EntryLocation::new(0, 0), &dpb);
        assert_eq!(entry.extension(), "BAS");
        assert!(entry.flags().read_only());
        assert!(!entry.flags().system());
        assert!(entry.flags().archive());
        assert_eq!(entry.encode(&dpb), raw);
    }

    #[test]
    fn test_encode_writes_at_location() {
        let dpb = DiskParameterBlock::z80rb();
        let mut buffer = vec![0u8; dpb.filesystem_size()];

        let cases = [
            (BIGTREK_ENTRY_1, EntryLocation::new(0, 0)),
            (BIGTREK_ENTRY_2, EntryLocation::new(0, 2)),
            (TESTTXT_ENTRY_2, EntryLocation::new(4, 0)),
            (TESTTXT_ENTRY_3, EntryLocation::new(3, 33)),
        ];
        for (raw, location) in cases {
            let entry = DirectoryEntry::decode(&raw, location, &dpb);
            entry.write_entry(&mut buffer, &dpb).unwrap();

            let offset = location.block as usize * dpb.block_size() + 32 * location.slot as usize;
            assert_eq!(&buffer[offset..offset + 32], &raw);
        }
    }

    #[test]
    fn test_write_entry_honours_offset() {
        let dpb = DiskParameterBlock::osborne1();
        let mut buffer = vec![0u8; dpb.image_size()];
        let name = FileName::parse("A.COM").unwrap();
        let entry = DirectoryEntry::new(EntryLocation::new(1, 2), 0, &name, FileFlags::empty(), 0, &dpb);
        entry.write_entry(&mut buffer, &dpb).unwrap();

        let offset = dpb.offset_bytes() + 1024 + 64;
        assert_eq!(&buffer[offset + 1..offset + 12], b"A       COM");
    }

    #[test]
    fn test_small_disk_pointers() {
        let dpb = DiskParameterBlock::amstrad_data();
        let name = FileName::parse("GAME.BAS").unwrap();
        let entry = DirectoryEntry::new(EntryLocation::new(0, 5), 3, &name, FileFlags::empty(), 0, &dpb)
            .with_block(2, 1024, &dpb)
            .with_block(3, 1024, &dpb)
            .with_block(200, 300, &dpb);

        let raw = entry.encode(&dpb);
        assert_eq!(&raw[16..20], &[2, 3, 200, 0]);
        assert_eq!(raw[15], 8 + 8 + 3);

        let decoded = DirectoryEntry::decode(&raw, EntryLocation::new(0, 5), &dpb);
        assert_eq!(decoded, entry);
        assert_eq!(decoded.block_pointers().len(), 16);
    }

    #[test]
    fn test_with_block_record_counts() {
        let dpb = DiskParameterBlock::z80rb();
        let name = FileName::parse("LARGE1").unwrap();
        let mut entry = DirectoryEntry::new(EntryLocation::new(0, 0), 0, &name, FileFlags::empty(), 3, &dpb);
        for block in 10..17 {
            entry = entry.with_block(block, 4096, &dpb);
        }
        assert_eq!(entry.record_count(), 224);
        entry = entry.with_block(17, 130, &dpb);
        assert_eq!(entry.record_count(), 226);

        let full = entry.clone().with_block(18, 4096, &dpb);
        assert_eq!(full, entry);

        let raw = entry.encode(&dpb);
        assert_eq!(raw[12], 3 * 2);
        assert_eq!(raw[15], 226);
    }

    #[test]
    fn test_high_record_bytes_survive_reencode() {
        let dpb = DiskParameterBlock::z80rb();
        let mut raw = BIGTREK_ENTRY_1;

        // XL carries one full logical extent and RC the rest
        raw[12] = 0x01;
        raw[15] = 200;
        let entry = DirectoryEntry::decode(&raw, EntryLocation::new(0, 0), &dpb);
        assert_eq!(entry.record_count(), 328);
        assert_eq!(entry.encode(&dpb), raw);

        // RC alone above 128 stays in the RC byte
        raw[12] = 0x00;
        raw[15] = 226;
        let entry = DirectoryEntry::decode(&raw, EntryLocation::new(0, 0), &dpb);
        assert_eq!(entry.record_count(), 226);
        let reencoded = entry.encode(&dpb);
        assert_eq!(reencoded, raw);
        assert_eq!(DirectoryEntry::decode(&reencoded, entry.location(), &dpb), entry);
    }

    #[test]
    fn test_bc_is_written_as_zero() {
        let dpb = DiskParameterBlock::z80rb();
        let mut raw = BIGTREK_ENTRY_2;
        raw[13] = 0x40;
        let entry = DirectoryEntry::decode(&raw, EntryLocation::new(0, 0), &dpb);
        assert_eq!(entry.bc(), 0x40);
        assert_eq!(entry.encode(&dpb)[13], 0);
    }

    fn dpb_for_mask(exm: u8) -> DiskParameterBlock {
        // 16K blocks let every extent mask up to 15 fit in 8 pointers
        DiskParameterBlock::builder()
            .block_shift(7)
            .extent_mask(exm)
            .storage_size(1023)
            .build()
            .unwrap()
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            exm_index in 0usize..4,
            user in 0u8..=31,
            name in "[A-Z0-9]{1,8}",
            extension in "[A-Z0-9]{0,3}",
            flag_bits in 0u16..0x800,
            extent_seed in 0u16..2048,
            records in 0u16..=128,
            pointers in proptest::collection::vec(1u16..1024, 0..=8),
        ) {
            let exm = [0u8, 1, 3, 7][exm_index];
            let dpb = dpb_for_mask(exm);
            let max_extent = (256u32 << extent_high_shift(exm)).min(2048) as u16;
            let extent = extent_seed % max_extent;
            let file_name = FileName::parse(&format!("{}.{}", name, extension).trim_end_matches('.')).unwrap();

            let mut entry = DirectoryEntry::new(
                EntryLocation::new(0, 7), user, &file_name, FileFlags::new(flag_bits), extent, &dpb,
            );
            entry.pointers[..pointers.len()].copy_from_slice(&pointers);
            entry.record_count = records * (exm as u16 + 1);

            let decoded = DirectoryEntry::decode(&entry.encode(&dpb), entry.location(), &dpb);
            prop_assert_eq!(decoded, entry);
        }
    }
}
