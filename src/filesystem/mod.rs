/// CP/M filesystem engine

/// Allocation (directory) blocks
pub mod block;
/// The disk engine
pub mod cpm;
/// Directory entry codec
pub mod entry;
/// Multi-extent file aggregation
pub mod file;
/// File name parsing and matching
pub mod name;

pub use block::AllocationBlock;
pub use cpm::CpmDisk;
pub use entry::{DirectoryEntry, EntryLocation};
pub use file::CpmFile;
pub use name::{FileName, NameMatch};

use crate::format::constants::FLAG_BITS;
use std::fmt;

/// The hidden flag bits of a directory entry.
///
/// Bit `n` is the top bit of filename/extension character `n`. CP/M gives
/// the extension bits meaning: T1' read-only, T2' system, T3' archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileFlags(u16);

impl FileFlags {
    /// Read-only flag (T1')
    pub const READ_ONLY: usize = 8;
    /// System file flag (T2')
    pub const SYSTEM: usize = 9;
    /// Archive flag (T3')
    pub const ARCHIVE: usize = 10;

    const MASK: u16 = (1 << FLAG_BITS) - 1;

    /// Create flags from raw bits; bits above the eleventh are dropped
    pub fn new(bits: u16) -> Self {
        Self(bits & Self::MASK)
    }

    /// No flags set
    pub fn empty() -> Self {
        Self(0)
    }

    /// Raw bits
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Check if no flag is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check a single character's flag
    pub fn is_set(&self, index: usize) -> bool {
        index < FLAG_BITS && self.0 & (1 << index) != 0
    }

    /// Copy of these flags with one more bit set
    pub fn with(self, index: usize) -> Self {
        if index < FLAG_BITS {
            Self(self.0 | (1 << index))
        } else {
            self
        }
    }

    /// Check if the read-only attribute is set
    pub fn read_only(&self) -> bool {
        self.is_set(Self::READ_ONLY)
    }

    /// Check if the system attribute is set
    pub fn system(&self) -> bool {
        self.is_set(Self::SYSTEM)
    }

    /// Check if the archive attribute is set
    pub fn archive(&self) -> bool {
        self.is_set(Self::ARCHIVE)
    }
}

impl fmt::Display for FileFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read_only() { "R" } else { "-" },
            if self.system() { "S" } else { "-" },
            if self.archive() { "A" } else { "-" }
        )
    }
}

/// Filesystem usage summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    /// Block size in bytes
    pub block_size: usize,
    /// Total blocks on disk, directory included
    pub total_blocks: usize,
    /// Blocks reserved for the directory
    pub directory_blocks: usize,
    /// Blocks referenced by files
    pub used_blocks: usize,
    /// Blocks available for new files
    pub free_blocks: usize,
    /// Directory entry slots
    pub total_entries: usize,
    /// Unused directory entry slots
    pub free_entries: usize,
    /// Number of files
    pub files: usize,
}

impl DiskInfo {
    /// Free space in bytes
    pub fn free_bytes(&self) -> usize {
        self.free_blocks * self.block_size
    }
}
