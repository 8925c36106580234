/// CP/M disk parameters and on-disk constants

/// Layout constants
pub mod constants;
/// Disk Parameter Block
pub mod dpb;
/// Sector skew tables
pub mod skew;

pub use constants::*;
pub use dpb::{DiskParameterBlock, DiskParameterBlockBuilder};
pub use skew::create_skew_table;
