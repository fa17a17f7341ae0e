// 32-byte directory slots and the slot arrays they live in.
// A directory is either the fixed FAT12/16 root region or a cluster
// chain (subdirectories and the FAT32 root). Slots hold classic 8.3
// short entries, VFAT long-name entries, or preserved deleted entries;
// the array ends at the first all-zero slot.

use std::mem;

use chrono::{DateTime, Utc};
use log::debug;

use ffs_core::{Attributes, BlockDevice, FfsError};

use crate::boot_sector::Layout;
use crate::chain::ClusterChain;
use crate::names::{short_name_checksum, unpack_short_name};
use crate::table::Fat;
use crate::timestamps;

pub const SLOT_SIZE: usize = 32;

const ENTRY_FREE: u8 = 0x00;
const ENTRY_DELETED: u8 = 0xE5;

/// Characters carried per long-name slot.
pub const LONG_NAME_CHARS: usize = 13;

/// Marks the highest-ordered long entry of a run.
pub const LONG_ORDER_LAST: u8 = 0x40;

// ============================================================================
// Short entries
// ============================================================================

/// Classic 8.3 directory entry, in its on-disk layout.
#[repr(C, packed(1))]
#[derive(Debug, Clone, Copy)]
pub struct ShortDirEntry {
    pub name: [u8; 11],          // 0x00: stem + extension, space padded
    pub attr: u8,                // 0x0B
    pub nt_reserved: u8,         // 0x0C
    pub create_time_tenths: u8,  // 0x0D
    pub create_time: u16,        // 0x0E
    pub create_date: u16,        // 0x10
    pub access_date: u16,        // 0x12
    pub first_cluster_high: u16, // 0x14: FAT32 only
    pub write_time: u16,         // 0x16
    pub write_date: u16,         // 0x18
    pub first_cluster_low: u16,  // 0x1A
    pub file_size: u32,          // 0x1C
}

const _: () = assert!(mem::size_of::<ShortDirEntry>() == SLOT_SIZE);

impl ShortDirEntry {
    /// A fresh entry stamped with `now` for all three timestamps.
    pub fn new(name: [u8; 11], attr: Attributes, cluster: u32, now: DateTime<Utc>) -> Self {
        let (date, time) = timestamps::encode_datetime(now);
        let mut entry = ShortDirEntry {
            name,
            attr: attr.bits(),
            nt_reserved: 0,
            create_time_tenths: timestamps::encode_tenths(now),
            create_time: time,
            create_date: date,
            access_date: date,
            first_cluster_high: 0,
            write_time: time,
            write_date: date,
            first_cluster_low: 0,
            file_size: 0,
        };
        entry.set_first_cluster(cluster);
        entry
    }

    pub fn decode(raw: &[u8; SLOT_SIZE]) -> Self {
        unsafe { std::ptr::read_unaligned(raw.as_ptr() as *const ShortDirEntry) }
    }

    pub fn encode(&self) -> [u8; SLOT_SIZE] {
        let mut out = [0u8; SLOT_SIZE];
        unsafe {
            std::ptr::copy_nonoverlapping(
                self as *const ShortDirEntry as *const u8,
                out.as_mut_ptr(),
                SLOT_SIZE,
            );
        }
        out
    }

    pub fn attributes(&self) -> Attributes {
        Attributes::from_bits(self.attr)
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_high as u32) << 16) | self.first_cluster_low as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_low = (cluster & 0xFFFF) as u16;
        self.first_cluster_high = (cluster >> 16) as u16;
    }

    /// Rendered `STEM.EXT` form of the 8.3 name.
    pub fn short_name(&self) -> String {
        unpack_short_name(&self.name)
    }

    pub fn created(&self) -> DateTime<Utc> {
        timestamps::decode_datetime(self.create_date, self.create_time)
    }

    pub fn written(&self) -> DateTime<Utc> {
        timestamps::decode_datetime(self.write_date, self.write_time)
    }

    pub fn accessed(&self) -> DateTime<Utc> {
        timestamps::decode_datetime(self.access_date, 0)
    }

    pub fn touch_write(&mut self, now: DateTime<Utc>) {
        let (date, time) = timestamps::encode_datetime(now);
        self.write_date = date;
        self.write_time = time;
        self.access_date = date;
    }
}

// ============================================================================
// Long entries
// ============================================================================

/// One VFAT long-name slot: thirteen UCS-2 characters plus the order byte
/// and the checksum pairing it with its short entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongDirEntry {
    pub order: u8,
    pub checksum: u8,
    pub chars: [u16; LONG_NAME_CHARS],
}

impl LongDirEntry {
    pub fn decode(raw: &[u8; SLOT_SIZE]) -> Self {
        let mut chars = [0u16; LONG_NAME_CHARS];
        for (i, ch) in chars[..5].iter_mut().enumerate() {
            *ch = u16::from_le_bytes([raw[1 + i * 2], raw[2 + i * 2]]);
        }
        for (i, ch) in chars[5..11].iter_mut().enumerate() {
            *ch = u16::from_le_bytes([raw[14 + i * 2], raw[15 + i * 2]]);
        }
        for (i, ch) in chars[11..13].iter_mut().enumerate() {
            *ch = u16::from_le_bytes([raw[28 + i * 2], raw[29 + i * 2]]);
        }
        LongDirEntry {
            order: raw[0],
            checksum: raw[13],
            chars,
        }
    }

    pub fn encode(&self) -> [u8; SLOT_SIZE] {
        let mut out = [0u8; SLOT_SIZE];
        out[0] = self.order;
        for (i, &ch) in self.chars[..5].iter().enumerate() {
            out[1 + i * 2..3 + i * 2].copy_from_slice(&ch.to_le_bytes());
        }
        out[11] = Attributes::LONG_NAME.bits();
        out[12] = 0; // type: name entry
        out[13] = self.checksum;
        for (i, &ch) in self.chars[5..11].iter().enumerate() {
            out[14 + i * 2..16 + i * 2].copy_from_slice(&ch.to_le_bytes());
        }
        // first-cluster-low stays zero
        for (i, &ch) in self.chars[11..13].iter().enumerate() {
            out[28 + i * 2..30 + i * 2].copy_from_slice(&ch.to_le_bytes());
        }
        out
    }

    pub fn is_last(&self) -> bool {
        self.order & LONG_ORDER_LAST != 0
    }

    /// Position of this slot's chunk within the long name, starting at 1.
    pub fn sequence(&self) -> u8 {
        self.order & 0x3F
    }

    /// The characters carried, up to the NUL terminator / 0xFFFF padding.
    pub fn name_chars(&self) -> impl Iterator<Item = u16> + '_ {
        self.chars
            .iter()
            .copied()
            .take_while(|&c| c != 0x0000 && c != 0xFFFF)
    }
}

/// Split `name` into long-name slots paired with `short_name`, in the
/// on-disk order: highest sequence first, flagged with `LONG_ORDER_LAST`.
/// Chunks shorter than thirteen characters are NUL-terminated and padded
/// with 0xFFFF.
pub fn encode_long_name(name: &str, short_name: &[u8; 11]) -> Vec<LongDirEntry> {
    let checksum = short_name_checksum(short_name);
    let units: Vec<u16> = name.encode_utf16().collect();
    let count = units.len().div_ceil(LONG_NAME_CHARS);

    let mut entries = Vec::with_capacity(count);
    for seq in (0..count).rev() {
        let chunk = &units[seq * LONG_NAME_CHARS..units.len().min((seq + 1) * LONG_NAME_CHARS)];
        let mut chars = [0xFFFFu16; LONG_NAME_CHARS];
        chars[..chunk.len()].copy_from_slice(chunk);
        if chunk.len() < LONG_NAME_CHARS {
            chars[chunk.len()] = 0x0000;
        }
        let mut order = (seq + 1) as u8;
        if seq == count - 1 {
            order |= LONG_ORDER_LAST;
        }
        entries.push(LongDirEntry {
            order,
            checksum,
            chars,
        });
    }
    entries
}

/// Reassemble a long name from slots in on-disk order. Returns `None`
/// when the run is incomplete or does not checksum against `short_name`.
pub fn decode_long_name(entries: &[LongDirEntry], short_name: &[u8; 11]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let checksum = short_name_checksum(short_name);
    if !entries[0].is_last() {
        return None;
    }
    let count = entries.len() as u8;
    for (i, entry) in entries.iter().enumerate() {
        if entry.checksum != checksum || entry.sequence() != count - i as u8 {
            return None;
        }
    }

    let mut units = Vec::with_capacity(entries.len() * LONG_NAME_CHARS);
    for entry in entries.iter().rev() {
        units.extend(entry.name_chars());
    }
    Some(String::from_utf16_lossy(&units))
}

// ============================================================================
// Slot arrays
// ============================================================================

/// Where a directory's slots live on the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    /// The fixed root region of a FAT12/16 volume.
    Root,
    /// A cluster chain starting at the given cluster.
    Cluster(u32),
}

#[derive(Debug, Clone)]
pub enum DirSlot {
    Short(ShortDirEntry),
    Long(LongDirEntry),
    /// A deleted slot, kept verbatim so later slots keep their positions.
    Deleted([u8; SLOT_SIZE]),
}

impl DirSlot {
    fn parse(raw: &[u8; SLOT_SIZE]) -> DirSlot {
        if raw[0] == ENTRY_DELETED {
            DirSlot::Deleted(*raw)
        } else if Attributes::from_bits(raw[11]).is_long_name() {
            DirSlot::Long(LongDirEntry::decode(raw))
        } else {
            DirSlot::Short(ShortDirEntry::decode(raw))
        }
    }

    fn encode(&self) -> [u8; SLOT_SIZE] {
        match self {
            DirSlot::Short(entry) => entry.encode(),
            DirSlot::Long(entry) => entry.encode(),
            DirSlot::Deleted(raw) => *raw,
        }
    }
}

/// The slot array of one directory, held in memory between read and
/// write-back.
#[derive(Debug, Clone)]
pub struct DirectoryCluster {
    pub location: DirLocation,
    pub slots: Vec<DirSlot>,
}

impl DirectoryCluster {
    /// Load and parse the whole directory region.
    pub fn read<B: BlockDevice>(
        device: &mut B,
        fat: &Fat,
        layout: &Layout,
        location: DirLocation,
    ) -> Result<DirectoryCluster, FfsError> {
        let data = match location {
            DirLocation::Root => {
                let mut buf = vec![0u8; layout.root_dir_bytes()];
                device.read_at(layout.root_dir_offset(), &mut buf)?;
                buf
            }
            DirLocation::Cluster(start) => {
                let clusters = fat.chain(start)?;
                let mut buf = vec![0u8; clusters.len() * layout.cluster_bytes as usize];
                for (i, &cluster) in clusters.iter().enumerate() {
                    let at = i * layout.cluster_bytes as usize;
                    device.read_at(
                        layout.cluster_offset(cluster),
                        &mut buf[at..at + layout.cluster_bytes as usize],
                    )?;
                }
                buf
            }
        };
        Ok(Self::parse(location, &data))
    }

    fn parse(location: DirLocation, data: &[u8]) -> DirectoryCluster {
        let mut slots = Vec::new();
        for chunk in data.chunks_exact(SLOT_SIZE) {
            if chunk[0] == ENTRY_FREE {
                break;
            }
            let raw: &[u8; SLOT_SIZE] = chunk.try_into().expect("exact chunk");
            slots.push(DirSlot::parse(raw));
        }
        debug!("parsed {} directory slots at {:?}", slots.len(), location);
        DirectoryCluster { location, slots }
    }

    /// Serialize and persist the slot array: slots in order, a zero
    /// terminator slot when space remains, zero padding to the region or
    /// cluster boundary. A chain-backed directory grows its chain as
    /// needed, flushing the FAT before the slot data goes out.
    pub fn write<B: BlockDevice>(
        &self,
        device: &mut B,
        fat: &mut Fat,
        layout: &Layout,
    ) -> Result<(), FfsError> {
        let mut data = Vec::with_capacity((self.slots.len() + 1) * SLOT_SIZE);
        for slot in &self.slots {
            data.extend_from_slice(&slot.encode());
        }

        match self.location {
            DirLocation::Root => {
                let capacity = layout.root_dir_bytes();
                if data.len() > capacity {
                    return Err(FfsError::NoSpace);
                }
                data.resize(capacity, 0);
                device.write_at(layout.root_dir_offset(), &data)?;
            }
            DirLocation::Cluster(start) => {
                let cluster_bytes = layout.cluster_bytes as usize;
                let len = data.len().max(1).div_ceil(cluster_bytes) * cluster_bytes;
                data.resize(len, 0);

                // Grow the chain first so the FAT reaches the device
                // before any slot data lands in a fresh cluster.
                let mut chain = ClusterChain::new(start);
                let needed = (len / cluster_bytes) as u32;
                let mut have = chain.len_clusters(fat)?;
                let mut tail = *fat.chain(start)?.last().expect("chain has a head");
                while have < needed {
                    tail = fat.extend(tail)?;
                    have += 1;
                }
                if fat.is_dirty() {
                    fat.write_to_device(device, layout)?;
                }
                chain.write_at(device, fat, layout, 0, &data)?;
            }
        }
        Ok(())
    }

    /// Build the initial cluster of a new subdirectory: "." pointing at
    /// itself and ".." pointing at the parent (cluster 0 for the root).
    pub fn new_subdirectory(
        own_cluster: u32,
        parent_cluster: u32,
        now: DateTime<Utc>,
    ) -> DirectoryCluster {
        let dot = ShortDirEntry::new(*b".          ", Attributes::DIRECTORY, own_cluster, now);
        let dotdot = ShortDirEntry::new(*b"..         ", Attributes::DIRECTORY, parent_cluster, now);
        DirectoryCluster {
            location: DirLocation::Cluster(own_cluster),
            slots: vec![DirSlot::Short(dot), DirSlot::Short(dotdot)],
        }
    }

    /// Rendered short names of every live short slot, for uniqueness
    /// checks when generating 8.3 names.
    pub fn used_short_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                DirSlot::Short(entry) => Some(entry.short_name()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Logical entries
// ============================================================================

/// One logical directory entry: a short slot plus the long name its
/// preceding long-entry run spelled out, if any.
#[derive(Debug, Clone)]
pub struct DecodedEntry {
    pub name: String,
    pub entry: ShortDirEntry,
    /// Index of the short slot within the directory's slot array.
    pub slot_index: usize,
}

/// Walk a slot array and pair long-entry runs with their short entries.
/// Runs that fail the checksum or ordering rules are dropped in favour of
/// the 8.3 name. Volume-label entries are skipped.
pub fn decode_entries(slots: &[DirSlot]) -> Vec<DecodedEntry> {
    let mut out = Vec::new();
    let mut pending: Vec<LongDirEntry> = Vec::new();

    for (index, slot) in slots.iter().enumerate() {
        match slot {
            DirSlot::Deleted(_) => pending.clear(),
            DirSlot::Long(entry) => pending.push(entry.clone()),
            DirSlot::Short(entry) => {
                let attrs = entry.attributes();
                if attrs.is_volume_id() && !attrs.is_directory() {
                    pending.clear();
                    continue;
                }
                let name = decode_long_name(&pending, &entry.name)
                    .unwrap_or_else(|| entry.short_name());
                pending.clear();
                out.push(DecodedEntry {
                    name,
                    entry: *entry,
                    slot_index: index,
                });
            }
        }
    }
    out
}
