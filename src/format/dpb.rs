/// CP/M Disk Parameter Block

use crate::error::{CpmError, Result};
use crate::format::constants::{ENTRY_SIZE, RECORD_SIZE};
use crate::format::skew::{create_skew_table, is_permutation};
use log::debug;
use std::fmt;

/// Geometry and directory layout of a CP/M filesystem.
///
/// Values are fixed once built. Construct with [`DiskParameterBlock::builder`]
/// or one of the presets; any change means building a new block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskParameterBlock {
    sector_size: u16,
    records_per_track: u16,
    block_shift: u8,
    block_mask: u8,
    extent_mask: u8,
    storage_size: u16,
    max_dir_entries: u16,
    dir_bitmap: [u8; 2],
    check_vector_size: u16,
    track_offset: u16,
    skew: Vec<u16>,
}

impl DiskParameterBlock {
    /// Start building a new parameter block
    pub fn builder() -> DiskParameterBlockBuilder {
        DiskParameterBlockBuilder::new()
    }

    /// Z80 Retro board 8 MB hard disk partition
    pub fn z80rb() -> Self {
        Self {
            sector_size: 512,
            records_per_track: 512,
            block_shift: 5,      // 4096
            block_mask: 31,
            extent_mask: 1,
            storage_size: 2047,  // 8 MB
            max_dir_entries: 511,
            dir_bitmap: [0xF0, 0x00],
            check_vector_size: 0,
            track_offset: 0,
            skew: Vec::new(),
        }
    }

    /// Z80 Retro board 2 MB boot partition
    pub fn z80rb_boot() -> Self {
        Self {
            storage_size: 511,
            max_dir_entries: 255,
            dir_bitmap: [0xC0, 0x00],
            ..Self::z80rb()
        }
    }

    /// Osborne 1 double density floppy
    pub fn osborne1() -> Self {
        Self {
            sector_size: 1024,
            records_per_track: 40,
            block_shift: 3,      // 1024
            block_mask: 7,
            extent_mask: 0,
            storage_size: 184,
            max_dir_entries: 63,
            dir_bitmap: [0xC0, 0x00],
            check_vector_size: 16,
            track_offset: 3,
            skew: create_skew_table(2, 5),
        }
    }

    /// Amstrad CPC data format floppy
    pub fn amstrad_data() -> Self {
        Self {
            sector_size: 512,
            records_per_track: 36,
            block_shift: 3,      // 1024
            block_mask: 7,
            extent_mask: 0,
            storage_size: 179,   // 180 KB
            max_dir_entries: 63,
            dir_bitmap: [0xC0, 0x00],
            check_vector_size: 16,
            track_offset: 0,
            skew: Vec::new(),
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "z80rb" => Some(Self::z80rb()),
            "z80rb-boot" | "z80rb_boot" => Some(Self::z80rb_boot()),
            "osborne1" | "osborne" => Some(Self::osborne1()),
            "amstrad" | "amstrad-data" | "cpc" => Some(Self::amstrad_data()),
            _ => None,
        }
    }

    /// Names accepted by [`DiskParameterBlock::preset`]
    pub fn preset_names() -> &'static [&'static str] {
        &["z80rb", "z80rb-boot", "osborne1", "amstrad"]
    }

    /// Physical sector size in bytes
    pub fn sector_size(&self) -> u16 {
        self.sector_size
    }

    /// 128-byte records per track (SPT)
    pub fn records_per_track(&self) -> u16 {
        self.records_per_track
    }

    /// Block shift factor (BSH)
    pub fn block_shift(&self) -> u8 {
        self.block_shift
    }

    /// Block mask (BLM)
    pub fn block_mask(&self) -> u8 {
        self.block_mask
    }

    /// Extent mask (EXM)
    pub fn extent_mask(&self) -> u8 {
        self.extent_mask
    }

    /// Number of blocks minus one (DSM)
    pub fn storage_size(&self) -> u16 {
        self.storage_size
    }

    /// Directory entries minus one (DRM)
    pub fn max_dir_entries(&self) -> u16 {
        self.max_dir_entries
    }

    /// Directory allocation bitmap (AL0, AL1)
    pub fn dir_bitmap(&self) -> [u8; 2] {
        self.dir_bitmap
    }

    /// Check vector size (CKS)
    pub fn check_vector_size(&self) -> u16 {
        self.check_vector_size
    }

    /// Reserved tracks before the filesystem (OFF)
    pub fn track_offset(&self) -> u16 {
        self.track_offset
    }

    /// Sector skew table, empty for identity
    pub fn skew_table(&self) -> &[u16] {
        &self.skew
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        1 << (self.block_shift as usize + 7)
    }

    /// Bytes occupied by the reserved tracks
    pub fn offset_bytes(&self) -> usize {
        self.records_per_track as usize * RECORD_SIZE * self.track_offset as usize
    }

    /// Reserved tracks expressed in whole blocks
    pub fn offset_blocks(&self) -> usize {
        self.offset_bytes() / self.block_size()
    }

    /// Records in one block
    pub fn block_record_count(&self) -> usize {
        self.block_size() / RECORD_SIZE
    }

    /// Size of the filesystem area in bytes, excluding reserved tracks
    pub fn filesystem_size(&self) -> usize {
        (self.storage_size as usize + 1) * self.block_size()
    }

    /// Bytes a buffer needs to hold the reserved tracks and the filesystem
    pub fn image_size(&self) -> usize {
        self.offset_bytes() + self.filesystem_size()
    }

    /// Number of blocks on the disk
    pub fn block_count(&self) -> usize {
        self.storage_size as usize + 1
    }

    /// Width of a block pointer in bytes: 1 for small disks, 2 otherwise
    pub fn pointer_size(&self) -> usize {
        if self.storage_size < 256 {
            1
        } else {
            2
        }
    }

    /// Block pointers held by one directory entry
    pub fn pointers_per_entry(&self) -> usize {
        16 / self.pointer_size()
    }

    /// Data blocks one directory entry may address.
    ///
    /// Limited both by the pointer slots and by the records the extent mask
    /// lets a single entry count.
    pub fn blocks_per_entry(&self) -> usize {
        let records = (self.extent_mask as usize + 1) * 128;
        self.pointers_per_entry()
            .min(records / self.block_record_count())
            .max(1)
    }

    /// Directory entries held by one block
    pub fn entries_per_block(&self) -> usize {
        self.block_size() / ENTRY_SIZE
    }

    /// Record size in bytes
    pub const fn record_size() -> usize {
        RECORD_SIZE
    }

    /// 16-bit directory mask, AL0 in the high byte
    pub fn dir_mask(&self) -> u16 {
        u16::from_be_bytes(self.dir_bitmap)
    }

    /// Directory block indices in ascending order.
    ///
    /// Bit 15 of the mask is block 0, bit 0 is block 15.
    pub fn directory_blocks(&self) -> Vec<u16> {
        let mask = self.dir_mask();
        (0..16u16)
            .rev()
            .filter(|bit| mask & (1 << bit) != 0)
            .map(|bit| 15 - bit)
            .collect()
    }

    /// Map a logical sector to its physical sector
    pub fn translate_sector(&self, logical: usize) -> usize {
        if self.skew.is_empty() {
            logical
        } else {
            self.skew.get(logical).map_or(logical, |&s| s as usize)
        }
    }
}

impl fmt::Display for DiskParameterBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SPT={} BSH={} BLM={} EXM={} DSM={} DRM={} AL0=0x{:02X} AL1=0x{:02X} CKS={} OFF={} ({} byte blocks, {} KB)",
            self.records_per_track,
            self.block_shift,
            self.block_mask,
            self.extent_mask,
            self.storage_size,
            self.max_dir_entries,
            self.dir_bitmap[0],
            self.dir_bitmap[1],
            self.check_vector_size,
            self.track_offset,
            self.block_size(),
            self.filesystem_size() / 1024
        )
    }
}

/// Builder for [`DiskParameterBlock`]
#[derive(Debug, Clone)]
pub struct DiskParameterBlockBuilder {
    dpb: DiskParameterBlock,
}

impl Default for DiskParameterBlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskParameterBlockBuilder {
    /// Create a builder starting from the Z80 Retro board layout
    pub fn new() -> Self {
        Self {
            dpb: DiskParameterBlock::z80rb(),
        }
    }

    /// Start from an existing parameter block
    pub fn from_dpb(dpb: &DiskParameterBlock) -> Self {
        Self { dpb: dpb.clone() }
    }

    /// Set the physical sector size
    pub fn sector_size(mut self, sector_size: u16) -> Self {
        self.dpb.sector_size = sector_size;
        self
    }

    /// Set the records per track
    pub fn records_per_track(mut self, records_per_track: u16) -> Self {
        self.dpb.records_per_track = records_per_track;
        self
    }

    /// Set the block shift; the block mask follows from it
    pub fn block_shift(mut self, block_shift: u8) -> Self {
        self.dpb.block_shift = block_shift;
        self.dpb.block_mask = 1u8.checked_shl(block_shift as u32).unwrap_or(0).wrapping_sub(1);
        self
    }

    /// Override the block mask
    pub fn block_mask(mut self, block_mask: u8) -> Self {
        self.dpb.block_mask = block_mask;
        self
    }

    /// Set the extent mask
    pub fn extent_mask(mut self, extent_mask: u8) -> Self {
        self.dpb.extent_mask = extent_mask;
        self
    }

    /// Set the block count minus one
    pub fn storage_size(mut self, storage_size: u16) -> Self {
        self.dpb.storage_size = storage_size;
        self
    }

    /// Set the directory entry count minus one
    pub fn max_dir_entries(mut self, max_dir_entries: u16) -> Self {
        self.dpb.max_dir_entries = max_dir_entries;
        self
    }

    /// Set the directory allocation bitmap
    pub fn dir_bitmap(mut self, al0: u8, al1: u8) -> Self {
        self.dpb.dir_bitmap = [al0, al1];
        self
    }

    /// Set the check vector size
    pub fn check_vector_size(mut self, check_vector_size: u16) -> Self {
        self.dpb.check_vector_size = check_vector_size;
        self
    }

    /// Set the number of reserved tracks
    pub fn track_offset(mut self, track_offset: u16) -> Self {
        self.dpb.track_offset = track_offset;
        self
    }

    /// Use an explicit skew table
    pub fn skew_table(mut self, skew: Vec<u16>) -> Self {
        self.dpb.skew = skew;
        self
    }

    /// Generate the skew table from a skew factor and sectors per track
    pub fn skew(mut self, skew: usize, sectors_per_track: usize) -> Self {
        self.dpb.skew = create_skew_table(skew, sectors_per_track);
        self
    }

    /// Validate and build the parameter block
    pub fn build(self) -> Result<DiskParameterBlock> {
        let dpb = self.dpb;

        if !(3..=7).contains(&dpb.block_shift) {
            return Err(CpmError::parameters(format!(
                "block shift {} outside 3-7",
                dpb.block_shift
            )));
        }
        if dpb.block_mask as usize != (1 << dpb.block_shift) - 1 {
            return Err(CpmError::parameters("block mask must be 2^BSH-1"));
        }
        if !matches!(dpb.extent_mask, 0 | 1 | 3 | 7 | 15) {
            return Err(CpmError::parameters(format!(
                "invalid extent mask {}",
                dpb.extent_mask
            )));
        }
        if dpb.storage_size > 0x7FFF {
            return Err(CpmError::parameters("block count exceeds maximum"));
        }
        if dpb.block_shift == 3 && dpb.storage_size > 0xFF {
            return Err(CpmError::parameters("block count exceeds maximum for 1K blocks"));
        }
        let max_exm = dpb.pointers_per_entry() * dpb.block_size() / (128 * RECORD_SIZE);
        if dpb.extent_mask as usize >= max_exm.max(1) {
            return Err(CpmError::parameters("too many logical extents per entry"));
        }
        if dpb.dir_mask() == 0 {
            return Err(CpmError::parameters("directory allocation bitmap is empty"));
        }
        let dir_blocks = dpb.directory_blocks();
        if dir_blocks.iter().any(|&b| b > dpb.storage_size) {
            return Err(CpmError::parameters("directory block beyond end of disk"));
        }
        if !is_permutation(&dpb.skew) {
            return Err(CpmError::parameters("skew table is not a permutation"));
        }

        let dir_capacity = dir_blocks.len() * dpb.entries_per_block();
        if dir_capacity != dpb.max_dir_entries as usize + 1 {
            debug!(
                "directory bitmap holds {} entries, DRM declares {}",
                dir_capacity,
                dpb.max_dir_entries as usize + 1
            );
        }

        Ok(dpb)
    }
}
