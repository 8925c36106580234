/// Several labelled filesystems packed into one image

use crate::error::{CpmError, Result};
use crate::filesystem::CpmDisk;
use crate::image::DiskBuffer;
use crate::partition::table::{PartitionTable, PartitionTableEntry};
use log::{debug, info};

/// A filesystem and its partition label
#[derive(Debug)]
pub struct LabeledDisk<B: DiskBuffer> {
    label: String,
    disk: CpmDisk<B>,
}

impl<B: DiskBuffer> LabeledDisk<B> {
    /// Partition label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The filesystem
    pub fn disk(&self) -> &CpmDisk<B> {
        &self.disk
    }

    /// The filesystem, mutably
    pub fn disk_mut(&mut self) -> &mut CpmDisk<B> {
        &mut self.disk
    }

    /// Give back the filesystem
    pub fn into_disk(self) -> CpmDisk<B> {
        self.disk
    }
}

/// An ordered group of labelled filesystems
#[derive(Debug)]
pub struct PartitionedDisk<B: DiskBuffer> {
    disks: Vec<LabeledDisk<B>>,
}

impl<B: DiskBuffer> Default for PartitionedDisk<B> {
    fn default() -> Self {
        Self { disks: Vec::new() }
    }
}

impl<B: DiskBuffer> PartitionedDisk<B> {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filesystem under `label`
    pub fn add<S: Into<String>>(&mut self, label: S, disk: CpmDisk<B>) {
        self.disks.push(LabeledDisk {
            label: label.into(),
            disk,
        });
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.disks.len()
    }

    /// Check if there are no partitions
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    /// Get a partition by index
    pub fn get(&self, index: usize) -> Option<&LabeledDisk<B>> {
        self.disks.get(index)
    }

    /// Get a partition by index, mutably
    pub fn get_mut(&mut self, index: usize) -> Option<&mut LabeledDisk<B>> {
        self.disks.get_mut(index)
    }

    /// Find the first partition with `label`
    pub fn get_by_label(&self, label: &str) -> Option<&LabeledDisk<B>> {
        self.disks.iter().find(|d| d.label == label)
    }

    /// Find the first partition with `label`, mutably
    pub fn get_by_label_mut(&mut self, label: &str) -> Option<&mut LabeledDisk<B>> {
        self.disks.iter_mut().find(|d| d.label == label)
    }

    /// All partitions in order
    pub fn disks(&self) -> &[LabeledDisk<B>] {
        &self.disks
    }

    /// Table describing the partitions laid end to end.
    ///
    /// Fails with `InvalidFormat` when a partition would start beyond the
    /// 32-bit offsets the table can hold.
    pub fn table(&self) -> Result<PartitionTable> {
        let offsets = packed_offsets(self.disks.iter().map(|d| d.disk.dpb().image_size()))?;
        let mut table = PartitionTable::new();
        for (labeled, offset) in self.disks.iter().zip(offsets) {
            table.add(PartitionTableEntry::new(offset, labeled.label.clone(), labeled.disk.dpb().clone()));
        }
        Ok(table)
    }

    /// Serialize every partition followed by the partition table
    pub fn create_disk(&self) -> Result<Vec<u8>> {
        let table = self.table()?;
        let mut image = Vec::with_capacity(table.disk_size());
        for labeled in &self.disks {
            let size = labeled.disk.dpb().image_size();
            image.extend_from_slice(&labeled.disk.buffer().bytes()[..size]);
        }
        image.extend_from_slice(&table.encode());

        info!("built partitioned image: {} partition(s), {} bytes", self.disks.len(), image.len());
        Ok(image)
    }
}

/// Start offsets of regions of `sizes` bytes placed back to back
fn packed_offsets<I: IntoIterator<Item = usize>>(sizes: I) -> Result<Vec<u32>> {
    let mut offsets = Vec::new();
    let mut offset = 0u64;
    for size in sizes {
        let start = u32::try_from(offset).map_err(|_| {
            CpmError::invalid_format(format!("partition offset {} exceeds 32 bits", offset))
        })?;
        offsets.push(start);
        offset += size as u64;
    }
    Ok(offsets)
}

impl<'a> PartitionedDisk<&'a mut [u8]> {
    /// Open the partitions of an image in place.
    ///
    /// Each partition borrows its own region of `data`; the table trailer
    /// is kept out of every region.
    pub fn open(data: &'a mut [u8]) -> Result<Self> {
        let table = PartitionTable::decode(data)?;
        let body = data.len() - table.encode().len();
        let (front, _) = data.split_at_mut(body);
        Self::with_table(front, &table)
    }

    /// Open partitions of `data` described by `table`.
    ///
    /// Offsets must be ascending and regions must not overlap.
    pub fn with_table(data: &'a mut [u8], table: &PartitionTable) -> Result<Self> {
        let total = data.len();
        let mut rest = data;
        let mut consumed = 0usize;
        let mut disks = Self::new();

        for entry in table {
            let offset = entry.offset as usize;
            let size = entry.dpb.image_size();
            if offset < consumed {
                return Err(CpmError::invalid_format(format!(
                    "partition {} at {} overlaps the previous partition",
                    entry.label, offset
                )));
            }
            if offset + size > total {
                return Err(CpmError::invalid_format(format!(
                    "partition {} ends at {}, past the image end {}",
                    entry.label,
                    offset + size,
                    total
                )));
            }

            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(offset - consumed);
            let (region, tail) = tail.split_at_mut(size);
            rest = tail;
            consumed = offset + size;

            debug!("partition {} at 0x{:X}, {} bytes", entry.label, offset, size);
            disks.add(entry.label.clone(), CpmDisk::new(region, entry.dpb.clone())?);
        }

        Ok(disks)
    }
}

impl PartitionedDisk<Vec<u8>> {
    /// Copy the partitions of an image into owned buffers
    pub fn load(data: &[u8]) -> Result<Self> {
        let table = PartitionTable::decode(data)?;
        let mut disks = Self::new();

        for entry in &table {
            let offset = entry.offset as usize;
            let size = entry.dpb.image_size();
            let region = data.get(offset..offset + size).ok_or_else(|| {
                CpmError::invalid_format(format!("partition {} lies outside the image", entry.label))
            })?;
            disks.add(entry.label.clone(), CpmDisk::new(region.to_vec(), entry.dpb.clone())?);
        }

        Ok(disks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FileFlags;
    use crate::format::DiskParameterBlock;

    fn formatted(dpb: DiskParameterBlock) -> CpmDisk<Vec<u8>> {
        CpmDisk::format(vec![0u8; dpb.image_size()], dpb).unwrap()
    }

    fn two_partitions() -> PartitionedDisk<Vec<u8>> {
        let mut first = formatted(DiskParameterBlock::amstrad_data());
        first.create_file("FIRST.TXT", 0, FileFlags::empty(), b"in the first").unwrap();
        first.refresh().unwrap();

        let mut second = formatted(DiskParameterBlock::osborne1());
        second.create_file("SECOND.TXT", 2, FileFlags::empty(), b"in the second").unwrap();
        second.refresh().unwrap();

        let mut disks = PartitionedDisk::new();
        disks.add("A", first);
        disks.add("B", second);
        disks
    }

    #[test]
    fn test_table_offsets() {
        let disks = two_partitions();
        let table = disks.table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().offset, 0);
        assert_eq!(
            table.get(1).unwrap().offset as usize,
            DiskParameterBlock::amstrad_data().image_size()
        );
    }

    #[test]
    fn test_offsets_limited_to_32_bits() {
        let gib = 1usize << 30;
        assert_eq!(packed_offsets([gib, gib, 10]).unwrap(), vec![0, 1 << 30, 1 << 31]);
        assert_eq!(packed_offsets([4 * gib - 1, 1]).unwrap(), vec![0, u32::MAX]);
        assert!(matches!(
            packed_offsets([3 * gib, 2 * gib, 1]),
            Err(CpmError::InvalidFormat(_))
        ));
        assert!(packed_offsets(std::iter::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_create_then_load() {
        let image = two_partitions().create_disk().unwrap();
        let loaded = PartitionedDisk::load(&image).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(0).unwrap().label(), "A");
        let b = loaded.get_by_label("B").unwrap();
        assert_eq!(b.disk().dpb(), &DiskParameterBlock::osborne1());
        assert_eq!(&b.disk().read_file("SECOND.TXT", 2).unwrap()[..13], b"in the second");
        assert!(loaded.get_by_label("C").is_none());
    }

    #[test]
    fn test_open_in_place() {
        let mut image = two_partitions().create_disk().unwrap();
        let trailer = image.len() - DiskParameterBlock::amstrad_data().image_size()
            - DiskParameterBlock::osborne1().image_size();

        {
            let mut disks = PartitionedDisk::open(&mut image).unwrap();
            let a = disks.get_by_label_mut("A").unwrap();
            a.disk_mut().create_file("ADDED.TXT", 0, FileFlags::empty(), b"new").unwrap();
            a.disk_mut().refresh().unwrap();
            assert_eq!(a.disk().files().len(), 2);
        }

        let reloaded = PartitionedDisk::load(&image).unwrap();
        assert!(reloaded.get(0).unwrap().disk().find_file("ADDED.TXT", 0).is_some());
        assert!(reloaded.get(1).unwrap().disk().find_file("ADDED.TXT", 0).is_none());
        assert_eq!(PartitionTable::decode(&image).unwrap().encode().len(), trailer);
    }

    #[test]
    fn test_overlapping_partitions() {
        let dpb = DiskParameterBlock::amstrad_data();
        let mut data = vec![0xE5u8; dpb.image_size() * 2];
        let table = PartitionTable::from_entries(vec![
            PartitionTableEntry::new(0, "one", dpb.clone()),
            PartitionTableEntry::new(100, "two", dpb),
        ]);
        assert!(matches!(
            PartitionedDisk::with_table(&mut data, &table),
            Err(CpmError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_partition_past_end() {
        let dpb = DiskParameterBlock::amstrad_data();
        let mut data = vec![0xE5u8; dpb.image_size()];
        let table = PartitionTable::from_entries(vec![PartitionTableEntry::new(1, "one", dpb)]);
        assert!(matches!(
            PartitionedDisk::with_table(&mut data, &table),
            Err(CpmError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_without_table() {
        let data = vec![0xE5u8; 4096];
        assert!(matches!(PartitionedDisk::load(&data), Err(CpmError::InvalidFormat(_))));
    }
}
