/// Partition table trailer codec

use crate::error::{CpmError, Result};
use crate::format::constants::{PARTITION_MAGIC, PARTITION_TRAILER_SIZE};
use crate::format::DiskParameterBlock;

/// One partition: where it starts, what it is called, and its geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTableEntry {
    /// Byte offset of the partition in the combined image
    pub offset: u32,
    /// Partition label
    pub label: String,
    /// Partition geometry
    pub dpb: DiskParameterBlock,
}

impl PartitionTableEntry {
    /// Create a new entry
    pub fn new<S: Into<String>>(offset: u32, label: S, dpb: DiskParameterBlock) -> Self {
        Self {
            offset,
            label: label.into(),
            dpb,
        }
    }
}

/// Ordered list of partitions stored as a trailer after the disk data.
///
/// Layout, all integers big-endian:
///
/// ```text
/// [u16 count]
/// count x [u32 offset][u16 label len][label][11 x u16 DPB][u16 skew len][skew len x u16]
/// [0x25 0x01][u32 length of everything before the magic]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionTable {
    entries: Vec<PartitionTableEntry>,
}

/// Big-endian field reader over the serialized entry list
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(CpmError::invalid_format(format!(
                "partition table truncated at byte {}",
                self.pos
            )));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8(&mut self) -> Result<u8> {
        let value = self.u16()?;
        u8::try_from(value)
            .map_err(|_| CpmError::invalid_format(format!("DPB field value {} exceeds a byte", value)))
    }
}

impl PartitionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table from entries
    pub fn from_entries(entries: Vec<PartitionTableEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry
    pub fn add(&mut self, entry: PartitionTableEntry) {
        self.entries.push(entry);
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get a partition by index
    pub fn get(&self, index: usize) -> Option<&PartitionTableEntry> {
        self.entries.get(index)
    }

    /// Iterate over partitions in order
    pub fn iter(&self) -> std::slice::Iter<'_, PartitionTableEntry> {
        self.entries.iter()
    }

    /// All partitions
    pub fn entries(&self) -> &[PartitionTableEntry] {
        &self.entries
    }

    /// Bytes taken by all partitions, reserved tracks included
    pub fn disk_size(&self) -> usize {
        self.entries.iter().map(|e| e.dpb.image_size()).sum()
    }

    /// Serialize the table with its magic and length trailer
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());

        for entry in &self.entries {
            let dpb = &entry.dpb;
            out.extend_from_slice(&entry.offset.to_be_bytes());
            out.extend_from_slice(&(entry.label.len() as u16).to_be_bytes());
            out.extend_from_slice(entry.label.as_bytes());

            let [al0, al1] = dpb.dir_bitmap();
            let fields = [
                dpb.sector_size(),
                dpb.records_per_track(),
                dpb.block_shift() as u16,
                dpb.block_mask() as u16,
                dpb.extent_mask() as u16,
                dpb.storage_size(),
                dpb.max_dir_entries(),
                al0 as u16,
                al1 as u16,
                dpb.check_vector_size(),
                dpb.track_offset(),
            ];
            for field in fields {
                out.extend_from_slice(&field.to_be_bytes());
            }

            out.extend_from_slice(&(dpb.skew_table().len() as u16).to_be_bytes());
            for &sector in dpb.skew_table() {
                out.extend_from_slice(&sector.to_be_bytes());
            }
        }

        let length = out.len() as u32;
        out.extend_from_slice(&PARTITION_MAGIC);
        out.extend_from_slice(&length.to_be_bytes());
        out
    }

    /// Decode the table from the tail of `data`.
    ///
    /// Anything before the serialized entries is ignored, so this works on
    /// a whole partitioned image as well as on a bare trailer.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < PARTITION_TRAILER_SIZE {
            return Err(CpmError::invalid_format("image too small for a partition table"));
        }
        let footer = &data[data.len() - PARTITION_TRAILER_SIZE..];
        if footer[..2] != PARTITION_MAGIC {
            return Err(CpmError::invalid_format(format!(
                "bad partition magic {:02X} {:02X}",
                footer[0], footer[1]
            )));
        }

        let length = u32::from_be_bytes([footer[2], footer[3], footer[4], footer[5]]) as usize;
        let body_end = data.len() - PARTITION_TRAILER_SIZE;
        if length > body_end {
            return Err(CpmError::invalid_format(format!(
                "partition table length {} exceeds the {} bytes available",
                length, body_end
            )));
        }

        let mut fields = Fields {
            data: &data[body_end - length..body_end],
            pos: 0,
        };
        let count = fields.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(Self::decode_entry(&mut fields)?);
        }
        if fields.pos != length {
            return Err(CpmError::invalid_format(format!(
                "{} unexpected bytes after partition entries",
                length - fields.pos
            )));
        }

        Ok(Self { entries })
    }

    fn decode_entry(fields: &mut Fields<'_>) -> Result<PartitionTableEntry> {
        let offset = fields.u32()?;
        let label_len = fields.u16()? as usize;
        let label = String::from_utf8(fields.take(label_len)?.to_vec())
            .map_err(|_| CpmError::invalid_format("partition label is not UTF-8"))?;

        let builder = DiskParameterBlock::builder()
            .sector_size(fields.u16()?)
            .records_per_track(fields.u16()?)
            .block_shift(fields.u8()?)
            .block_mask(fields.u8()?)
            .extent_mask(fields.u8()?)
            .storage_size(fields.u16()?)
            .max_dir_entries(fields.u16()?);
        let al0 = fields.u8()?;
        let al1 = fields.u8()?;
        let builder = builder
            .dir_bitmap(al0, al1)
            .check_vector_size(fields.u16()?)
            .track_offset(fields.u16()?);

        let skew_len = fields.u16()?;
        let skew = (0..skew_len).map(|_| fields.u16()).collect::<Result<Vec<_>>>()?;

        let dpb = builder
            .skew_table(skew)
            .build()
            .map_err(|e| CpmError::invalid_format(format!("partition {}: {}", label, e)))?;

        Ok(PartitionTableEntry { offset, label, dpb })
    }
}

impl<'a> IntoIterator for &'a PartitionTable {
    type Item = &'a PartitionTableEntry;
    type IntoIter = std::slice::Iter<'a, PartitionTableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> PartitionTable {
        let mut table = PartitionTable::new();
        table.add(PartitionTableEntry::new(0, "boot", DiskParameterBlock::z80rb_boot()));
        table.add(PartitionTableEntry::new(
            DiskParameterBlock::z80rb_boot().image_size() as u32,
            "osborne",
            DiskParameterBlock::osborne1(),
        ));
        table
    }

    #[test]
    fn test_round_trip() {
        let table = sample();
        let bytes = table.encode();

        let length = bytes.len() - 6;
        assert_eq!(&bytes[length..length + 2], &[0x25, 0x01]);
        assert_eq!(&bytes[length + 2..], &(length as u32).to_be_bytes());

        let decoded = PartitionTable::decode(&bytes).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.get(1).unwrap().label, "osborne");
        assert_eq!(decoded.get(1).unwrap().dpb.skew_table(), DiskParameterBlock::osborne1().skew_table());
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_decode_after_disk_data() {
        let table = sample();
        let mut image = vec![0xE5u8; 1000];
        image.extend_from_slice(&table.encode());
        assert_eq!(PartitionTable::decode(&image).unwrap(), table);
    }

    #[test]
    fn test_empty_table() {
        let table = PartitionTable::new();
        let bytes = table.encode();
        assert_eq!(bytes, vec![0, 0, 0x25, 0x01, 0, 0, 0, 2]);
        assert!(PartitionTable::decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().encode();
        let magic = bytes.len() - 6;
        bytes[magic] = 0x26;
        assert!(matches!(PartitionTable::decode(&bytes), Err(CpmError::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_length() {
        let mut bytes = sample().encode();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(PartitionTable::decode(&bytes), Err(CpmError::InvalidFormat(_))));

        bytes[len - 4..].copy_from_slice(&1u32.to_be_bytes());
        assert!(matches!(PartitionTable::decode(&bytes), Err(CpmError::InvalidFormat(_))));
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(PartitionTable::decode(&[0x25, 0x01]), Err(CpmError::InvalidFormat(_))));
    }

    #[test]
    fn test_invalid_dpb_rejected() {
        let mut bytes = sample().encode();
        // block shift of the first entry: count(2) + offset(4) + len(2) + "boot"(4) + two fields(4)
        bytes[2 + 4 + 2 + 4 + 4 + 1] = 9;
        assert!(matches!(PartitionTable::decode(&bytes), Err(CpmError::InvalidFormat(_))));
    }

    #[test]
    fn test_disk_size() {
        let table = sample();
        assert_eq!(
            table.disk_size(),
            DiskParameterBlock::z80rb_boot().image_size() + DiskParameterBlock::osborne1().image_size()
        );
        assert_eq!((&table).into_iter().count(), 2);
    }

    proptest! {
        #[test]
        fn entries_survive_round_trip(
            partitions in proptest::collection::vec((any::<u32>(), "[a-zA-Z0-9 _-]{0,20}", 0usize..4), 0..6)
        ) {
            let presets = DiskParameterBlock::preset_names();
            let table = PartitionTable::from_entries(
                partitions
                    .into_iter()
                    .map(|(offset, label, preset)| {
                        let dpb = DiskParameterBlock::preset(presets[preset % presets.len()]).unwrap();
                        PartitionTableEntry::new(offset, label, dpb)
                    })
                    .collect(),
            );

            let decoded = PartitionTable::decode(&table.encode()).unwrap();
            prop_assert_eq!(decoded, table);
        }
    }
}
