/// CP/M filesystem engine

use crate::error::{CpmError, Resource, Result};
use crate::filesystem::block::AllocationBlock;
use crate::filesystem::entry::{DirectoryEntry, EntryLocation};
use crate::filesystem::file::CpmFile;
use crate::filesystem::name::{FileName, NameMatch};
use crate::filesystem::{DiskInfo, FileFlags};
use crate::format::constants::{DELETED_STAT, FORMAT_FILLER, MAX_USER};
use crate::format::DiskParameterBlock;
use crate::image::{DiskBuffer, MappedImage};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A CP/M filesystem over a disk buffer.
///
/// The parsed directory is a snapshot: writes made through
/// [`create_file`](Self::create_file) become visible to lookups only after
/// [`refresh`](Self::refresh).
#[derive(Debug)]
pub struct CpmDisk<B: DiskBuffer> {
    buffer: B,
    dpb: DiskParameterBlock,
    blocks: Vec<AllocationBlock>,
    name_match: NameMatch,
}

/// Decode every directory block named by the DPB bitmap
fn parse_directory<B: DiskBuffer>(buffer: &B, dpb: &DiskParameterBlock) -> Result<Vec<AllocationBlock>> {
    let block_size = dpb.block_size();
    dpb.directory_blocks()
        .into_iter()
        .map(|index| {
            let start = dpb.offset_bytes() + index as usize * block_size;
            debug!("directory block {} at offset 0x{:X}", index, start);
            let data = buffer.read_bytes(start, block_size)?;
            Ok(AllocationBlock::decode(index, data, dpb))
        })
        .collect()
}

fn check_size<B: DiskBuffer>(buffer: &B, dpb: &DiskParameterBlock) -> Result<()> {
    let required = dpb.image_size();
    if buffer.len() < required {
        return Err(CpmError::OutOfBounds {
            offset: 0,
            len: required,
            size: buffer.len(),
        });
    }
    Ok(())
}

impl<B: DiskBuffer> CpmDisk<B> {
    /// Parse the filesystem held in `buffer`
    pub fn new(buffer: B, dpb: DiskParameterBlock) -> Result<Self> {
        check_size(&buffer, &dpb)?;
        let blocks = parse_directory(&buffer, &dpb)?;

        let disk = Self {
            buffer,
            dpb,
            blocks,
            name_match: NameMatch::default(),
        };
        info!(
            "loaded CP/M filesystem: {} directory block(s), {} entries in use",
            disk.blocks.len(),
            disk.used_entries().len()
        );
        Ok(disk)
    }

    /// Create an empty filesystem in `buffer`.
    ///
    /// The filesystem area after the reserved tracks is filled with 0xE5;
    /// the reserved tracks are left alone.
    pub fn format(mut buffer: B, dpb: DiskParameterBlock) -> Result<Self> {
        check_size(&buffer, &dpb)?;
        buffer.fill_bytes(dpb.offset_bytes(), dpb.filesystem_size(), FORMAT_FILLER)?;
        info!("formatted {} bytes: {}", dpb.filesystem_size(), dpb);
        Self::new(buffer, dpb)
    }

    /// Use `rule` for name lookups
    pub fn with_name_match(mut self, rule: NameMatch) -> Self {
        self.name_match = rule;
        self
    }

    /// Change the name lookup rule
    pub fn set_name_match(&mut self, rule: NameMatch) {
        self.name_match = rule;
    }

    /// Name lookup rule in use
    pub fn name_match(&self) -> NameMatch {
        self.name_match
    }

    /// Flush the buffer to its backing store, then parse the directory again
    pub fn refresh(&mut self) -> Result<()> {
        self.buffer.flush()?;
        self.blocks = parse_directory(&self.buffer, &self.dpb)?;
        debug!("directory refreshed, {} entries in use", self.used_entries().len());
        Ok(())
    }

    /// Disk parameters
    pub fn dpb(&self) -> &DiskParameterBlock {
        &self.dpb
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Give back the underlying buffer
    pub fn into_inner(self) -> B {
        self.buffer
    }

    /// Parsed directory blocks in ascending block order
    pub fn allocation_blocks(&self) -> &[AllocationBlock] {
        &self.blocks
    }

    /// Every live directory entry
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.blocks.iter().flat_map(|b| b.used_slots())
    }

    /// All files, ordered by user number then name
    pub fn files(&self) -> Vec<CpmFile> {
        let mut groups: BTreeMap<(u8, &str, &str), Vec<DirectoryEntry>> = BTreeMap::new();
        for entry in self.entries() {
            groups
                .entry((entry.stat(), entry.name(), entry.extension()))
                .or_default()
                .push(entry.clone());
        }
        groups.into_values().filter_map(CpmFile::from_entries).collect()
    }

    /// Find a file by name and user number using the disk's name rule
    pub fn find_file(&self, name: &str, user: u8) -> Option<CpmFile> {
        self.find_file_with(name, user, self.name_match)
    }

    /// Find a file by name and user number using `rule`
    pub fn find_file_with(&self, name: &str, user: u8, rule: NameMatch) -> Option<CpmFile> {
        self.files()
            .into_iter()
            .find(|f| f.user() == user && rule.matches(f.name(), f.extension(), name))
    }

    /// Read a file's contents, padded to a whole record
    pub fn read_file(&self, name: &str, user: u8) -> Result<Vec<u8>> {
        let file = self
            .find_file(name, user)
            .ok_or_else(|| CpmError::not_found(user, name))?;
        Ok(file.read_contents(&self.buffer, &self.dpb))
    }

    /// Data blocks referenced by live entries, ascending
    pub fn used_blocks(&self) -> Vec<u16> {
        self.entries()
            .flat_map(|e| e.blocks())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Blocks neither used by a file nor reserved for the directory, ascending
    pub fn unused_blocks(&self) -> Vec<u16> {
        let mut taken: BTreeSet<u16> = self.entries().flat_map(|e| e.blocks()).collect();
        taken.extend(self.dpb.directory_blocks());

        (0..=self.dpb.storage_size()).filter(|b| !taken.contains(b)).collect()
    }

    /// Directory slots holding live entries
    pub fn used_entries(&self) -> Vec<EntryLocation> {
        self.entries().map(|e| e.location()).collect()
    }

    /// Directory slots free for new entries
    pub fn unused_entries(&self) -> Vec<EntryLocation> {
        self.blocks
            .iter()
            .flat_map(|b| b.unused_slots())
            .map(|e| e.location())
            .collect()
    }

    /// Create a file from `data`.
    ///
    /// Blocks and directory slots are taken lowest first. Every check runs
    /// before the first byte is written, so a failed call leaves the buffer
    /// untouched. The directory is not re-parsed; call
    /// [`refresh`](Self::refresh) to see the new file in lookups.
    pub fn create_file(&mut self, name: &str, user: u8, flags: FileFlags, data: &[u8]) -> Result<CpmFile> {
        if user > MAX_USER {
            return Err(CpmError::InvalidUser(user));
        }
        let file_name = FileName::parse(name)?;
        let full_name = file_name.to_string();
        if self.find_file(&full_name, user).is_some() {
            return Err(CpmError::FileAlreadyExists { user, name: full_name });
        }

        let block_size = self.dpb.block_size();
        let per_entry = self.dpb.blocks_per_entry();
        let needed_blocks = data.len().div_ceil(block_size);
        let needed_entries = needed_blocks.div_ceil(per_entry).max(1);

        let free_blocks = self.unused_blocks();
        if free_blocks.len() < needed_blocks {
            return Err(CpmError::AllocationExhausted {
                resource: Resource::Blocks,
                needed: needed_blocks,
                available: free_blocks.len(),
            });
        }
        let free_entries = self.unused_entries();
        if free_entries.len() < needed_entries {
            return Err(CpmError::AllocationExhausted {
                resource: Resource::DirectoryEntries,
                needed: needed_entries,
                available: free_entries.len(),
            });
        }

        let allocated = &free_blocks[..needed_blocks];
        debug!("allocating blocks {:?} for {}:{}", allocated, user, full_name);

        for (&block, chunk) in allocated.iter().zip(data.chunks(block_size)) {
            let start = self.dpb.offset_bytes() + block as usize * block_size;
            let region = self.buffer.region_mut(start, block_size)?;
            region[..chunk.len()].copy_from_slice(chunk);
            region[chunk.len()..].fill(0);
        }

        let mut entries = Vec::with_capacity(needed_entries);
        for (extent, &location) in free_entries.iter().take(needed_entries).enumerate() {
            let first = extent * per_entry;
            let last = (first + per_entry).min(needed_blocks);

            let mut entry = DirectoryEntry::new(location, user, &file_name, flags, extent as u16, &self.dpb);
            for (index, &block) in allocated.iter().enumerate().take(last).skip(first) {
                let bytes_in_block = (data.len() - index * block_size).min(block_size);
                entry = entry.with_block(block, bytes_in_block, &self.dpb);
            }

            entry.write_entry(&mut self.buffer, &self.dpb)?;
            debug!("wrote {}", entry);
            entries.push(entry);
        }

        info!(
            "created {}:{} ({} bytes, {} block(s), {} extent(s))",
            user,
            full_name,
            data.len(),
            needed_blocks,
            needed_entries
        );
        CpmFile::from_entries(entries).ok_or_else(|| CpmError::not_found(user, &full_name))
    }

    /// Delete a file by marking each of its entries unused, then refresh.
    ///
    /// Only the stat bytes change; data blocks keep their contents.
    pub fn delete_file(&mut self, name: &str, user: u8) -> Result<()> {
        let file = self
            .find_file(name, user)
            .ok_or_else(|| CpmError::not_found(user, name))?;

        for location in file.locations() {
            self.buffer.write_bytes(location.offset(&self.dpb), &[DELETED_STAT])?;
        }
        info!("deleted {}:{} ({} extent(s))", user, file.full_name(), file.entries().len());

        self.refresh()
    }

    /// Usage summary
    pub fn info(&self) -> DiskInfo {
        let used_blocks = self.used_blocks().len();
        let free_blocks = self.unused_blocks().len();
        let free_entries = self.unused_entries().len();

        DiskInfo {
            block_size: self.dpb.block_size(),
            total_blocks: self.dpb.block_count(),
            directory_blocks: self.dpb.directory_blocks().len(),
            used_blocks,
            free_blocks,
            total_entries: self.blocks.iter().map(|b| b.entries().len()).sum(),
            free_entries,
            files: self.files().len(),
        }
    }
}

impl CpmDisk<MappedImage> {
    /// Map an image file and parse the filesystem in it.
    ///
    /// The file must already hold the reserved tracks and the whole
    /// filesystem; it is never created or resized here. Use
    /// [`crate::io::map_image`] with [`format`](Self::format) for new images.
    /// [`refresh`](Self::refresh) flushes the mapping.
    pub fn open_mapped<P: AsRef<Path>>(path: P, dpb: DiskParameterBlock) -> Result<Self> {
        let image = MappedImage::open(path, 0, dpb.image_size())?;
        Self::new(image, dpb)
    }
}
