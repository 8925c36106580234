/// CP/M on-disk layout constants

/// Size of a CP/M record in bytes
pub const RECORD_SIZE: usize = 128;

/// Size of a directory entry in bytes
pub const ENTRY_SIZE: usize = 32;

/// Stat byte marking a directory entry as unused or deleted
pub const DELETED_STAT: u8 = 0xE5;

/// Filler byte written over a freshly formatted filesystem
pub const FORMAT_FILLER: u8 = 0xE5;

/// Highest valid user number
pub const MAX_USER: u8 = 31;

/// Characters in a filename, excluding the extension
pub const FILENAME_LEN: usize = 8;

/// Characters in a file extension
pub const EXTENSION_LEN: usize = 3;

/// Number of hidden flag bits (one per filename and extension character)
pub const FLAG_BITS: usize = FILENAME_LEN + EXTENSION_LEN;

/// Partition table trailer magic
pub const PARTITION_MAGIC: [u8; 2] = [0x25, 0x01];

/// Partition table trailer size: magic followed by a 4-byte length
pub const PARTITION_TRAILER_SIZE: usize = PARTITION_MAGIC.len() + 4;

/// Offset of the stat byte within a directory entry
pub const ENTRY_STAT_OFFSET: usize = 0;

/// Offset of the filename within a directory entry
pub const ENTRY_NAME_OFFSET: usize = 1;

/// Offset of the extent low byte (XL) within a directory entry
pub const ENTRY_XL_OFFSET: usize = 12;

/// Offset of the byte count (BC, CP/M 3) within a directory entry
pub const ENTRY_BC_OFFSET: usize = 13;

/// Offset of the extent high byte (XH) within a directory entry
pub const ENTRY_XH_OFFSET: usize = 14;

/// Offset of the record count (RC) within a directory entry
pub const ENTRY_RC_OFFSET: usize = 15;

/// Offset of the block pointers within a directory entry
pub const ENTRY_POINTERS_OFFSET: usize = 16;

/// Number of records needed to hold `bytes` bytes
#[inline]
pub fn records_for(bytes: usize) -> usize {
    bytes.div_ceil(RECORD_SIZE)
}
