/// Block map visualization

use crate::filesystem::CpmDisk;
use crate::image::DiskBuffer;
use std::collections::BTreeSet;
use std::fmt::Write;

/// ANSI color codes for the block map
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
    pub const DARK_WHITE: &str = "\x1b[37m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
}

const BLOCK_FREE: char = '\u{2591}'; // ░
const BLOCK_USED: char = '\u{2593}'; // ▓
const BLOCK_DIRECTORY: char = '\u{2588}'; // █

/// What a block holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Reserved for the directory
    Directory,
    /// Referenced by a file
    Used,
    /// Available
    Free,
}

/// Status of every block from 0 to DSM
pub fn block_statuses<B: DiskBuffer>(disk: &CpmDisk<B>) -> Vec<BlockStatus> {
    let directory: BTreeSet<u16> = disk.dpb().directory_blocks().into_iter().collect();
    let used: BTreeSet<u16> = disk.used_blocks().into_iter().collect();

    (0..=disk.dpb().storage_size())
        .map(|block| {
            if directory.contains(&block) {
                BlockStatus::Directory
            } else if used.contains(&block) {
                BlockStatus::Used
            } else {
                BlockStatus::Free
            }
        })
        .collect()
}

/// Render the block map as rows of `width` blocks, each row labelled with
/// its first block number
pub fn render_block_map<B: DiskBuffer>(disk: &CpmDisk<B>, width: usize) -> String {
    let statuses = block_statuses(disk);
    let width = width.max(1);
    let label_width = statuses.len().to_string().len();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Legend: {}{}{} Directory {}{}{} Used {}{}{} Free",
        colors::BRIGHT_YELLOW, BLOCK_DIRECTORY, colors::RESET,
        colors::BRIGHT_WHITE, BLOCK_USED, colors::RESET,
        colors::DARK_WHITE, BLOCK_FREE, colors::RESET
    );

    for (row, chunk) in statuses.chunks(width).enumerate() {
        let _ = write!(out, "{:>w$} ", row * width, w = label_width);
        for status in chunk {
            let (color, block) = match status {
                BlockStatus::Directory => (colors::BRIGHT_YELLOW, BLOCK_DIRECTORY),
                BlockStatus::Used => (colors::BRIGHT_WHITE, BLOCK_USED),
                BlockStatus::Free => (colors::DARK_WHITE, BLOCK_FREE),
            };
            let _ = write!(out, "{}{}{}", color, block, colors::RESET);
        }
        out.push('\n');
    }

    out
}

/// Print the block map of a disk
pub fn draw_block_map<B: DiskBuffer>(disk: &CpmDisk<B>) {
    let info = disk.info();
    println!(
        "=== Block Map ({} blocks of {} bytes) ===",
        info.total_blocks, info.block_size
    );
    print!("{}", render_block_map(disk, 64));
    println!(
        "{} directory, {} used, {} free",
        info.directory_blocks, info.used_blocks, info.free_blocks
    );
}
