/// Partitioned images

/// Partition table trailer codec
pub mod table;
/// Labelled filesystems sharing one image
pub mod disk;

pub use disk::{LabeledDisk, PartitionedDisk};
pub use table::{PartitionTable, PartitionTableEntry};
