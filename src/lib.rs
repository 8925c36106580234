/*!
# cpmdisk

A Rust library for reading and writing CP/M 2.2/3 filesystems inside raw and
partitioned disk images.

## Features

- Disk parameter blocks with validated builder and common presets
- Directory entry codec with hidden flag bits and multi-extent files
- Create, read and delete files with lowest-first block allocation
- Works over any byte buffer: `Vec<u8>`, a slice, or a memory-mapped file
- Partitioned images with a self-describing trailer table
- Idiomatic Rust API with comprehensive error handling

## Quick Start

```rust,no_run
use cpmdisk::{CpmDisk, DiskParameterBlock, FileFlags};

// Format an 8 MB filesystem in memory
let dpb = DiskParameterBlock::z80rb();
let mut disk = CpmDisk::format(vec![0u8; dpb.image_size()], dpb)?;

// Write a file, then re-read the directory
disk.create_file("HELLO.TXT", 0, FileFlags::empty(), b"Hello, CP/M!")?;
disk.refresh()?;

for file in disk.files() {
    println!("{}", file);
}

// Read it back (padded to a whole 128-byte record)
let contents = disk.read_file("HELLO.TXT", 0)?;

// Work on an image file directly through a memory map
let mut mapped = CpmDisk::open_mapped("disk.img", DiskParameterBlock::z80rb())?;
mapped.delete_file("OLD.COM", 0)?;
# Ok::<(), cpmdisk::CpmError>(())
```

## Modules

- `format`: disk parameter blocks, skew tables and wire constants
- `image`: the `DiskBuffer` abstraction and memory-mapped images
- `filesystem`: directory entries, files and the `CpmDisk` engine
- `partition`: partition tables and partitioned images
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// Error types and Result alias
pub mod error;
/// CP/M filesystem engine
pub mod filesystem;
/// Disk parameter blocks and wire constants
pub mod format;
/// Disk buffers (in-memory and memory-mapped)
pub mod image;
/// I/O operations for reading and writing image files
pub mod io;
/// Block map visualization
pub mod map;
/// Partition tables and partitioned images
pub mod partition;

// Re-export common types
pub use error::{CpmError, Resource, Result};
pub use filesystem::{
    AllocationBlock, CpmDisk, CpmFile, DirectoryEntry, DiskInfo, EntryLocation, FileFlags,
    FileName, NameMatch,
};
pub use format::{
    create_skew_table, DiskParameterBlock, DiskParameterBlockBuilder, DELETED_STAT, MAX_USER,
    RECORD_SIZE,
};
pub use image::{DiskBuffer, MappedImage};
pub use map::{block_statuses, draw_block_map, render_block_map, BlockStatus};
pub use partition::{LabeledDisk, PartitionTable, PartitionTableEntry, PartitionedDisk};
