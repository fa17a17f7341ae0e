// Boot sector (BPB) codec for FAT12/16/32 super-floppy volumes.
// The wire layout is fixed by the MS-DOS 5.0+ BPB and the Microsoft FAT32
// extended BPB; the decoded form keeps the extension block as a tagged
// variant so the rest of the engine never branches on parallel types.

use std::fmt;
use std::mem;

use log::debug;
use serde::{Deserialize, Serialize};

use ffs_core::{BlockDevice, FfsError};

pub const BOOT_SECTOR_SIZE: usize = 512;
pub const DIR_ENTRY_SIZE: u32 = 32;

/// Cluster-count thresholds that decide the FAT width. The FS-type string
/// in the extended BPB is advisory only and never consulted.
const FAT12_MAX_CLUSTERS: u32 = 4085;
const FAT16_MAX_CLUSTERS: u32 = 65525;

// ============================================================================
// Wire structures
// ============================================================================

/// BPB fields shared by all FAT widths (first 36 bytes of the sector).
#[repr(C, packed(1))]
#[derive(Debug, Clone, Copy)]
struct RawBpb {
    jump_boot: [u8; 3],       // 0x00: jump instruction
    oem_name: [u8; 8],        // 0x03
    bytes_per_sector: u16,    // 0x0B
    sectors_per_cluster: u8,  // 0x0D
    reserved_sectors: u16,    // 0x0E
    num_fats: u8,             // 0x10
    root_entries: u16,        // 0x11: 0 on FAT32
    total_sectors_16: u16,    // 0x13: total sectors if < 65536
    media_descriptor: u8,     // 0x15
    sectors_per_fat_16: u16,  // 0x16: 0 on FAT32
    sectors_per_track: u16,   // 0x18
    num_heads: u16,           // 0x1A
    hidden_sectors: u32,      // 0x1C
    total_sectors_32: u32,    // 0x20
}

/// FAT12/16 extended BPB (follows the common block at 0x24).
#[repr(C, packed(1))]
#[derive(Debug, Clone, Copy)]
struct RawExtBpb16 {
    drive_number: u8,      // 0x24
    reserved: u8,          // 0x25
    boot_signature: u8,    // 0x26: 0x29
    volume_id: u32,        // 0x27
    volume_label: [u8; 11], // 0x2B
    fs_type: [u8; 8],      // 0x36
}

/// FAT32 extended BPB (follows the common block at 0x24).
#[repr(C, packed(1))]
#[derive(Debug, Clone, Copy)]
struct RawExtBpb32 {
    sectors_per_fat_32: u32, // 0x24
    ext_flags: u16,          // 0x28
    fs_version: u16,         // 0x2A
    root_cluster: u32,       // 0x2C
    fs_info_sector: u16,     // 0x30
    backup_boot_sector: u16, // 0x32
    reserved: [u8; 12],      // 0x34
    drive_number: u8,        // 0x40
    reserved1: u8,           // 0x41
    boot_signature: u8,      // 0x42: 0x29
    volume_id: u32,          // 0x43
    volume_label: [u8; 11],  // 0x47
    fs_type: [u8; 8],        // 0x52
}

const _: () = assert!(mem::size_of::<RawBpb>() == 36);
const _: () = assert!(mem::size_of::<RawExtBpb16>() == 26);
const _: () = assert!(mem::size_of::<RawExtBpb32>() == 54);

const EXT_BPB_OFFSET: usize = mem::size_of::<RawBpb>();

fn read_raw<T: Copy>(bytes: &[u8]) -> T {
    debug_assert!(bytes.len() >= mem::size_of::<T>());
    unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) }
}

fn write_raw<T: Copy>(value: &T, out: &mut [u8]) {
    debug_assert!(out.len() >= mem::size_of::<T>());
    unsafe {
        std::ptr::copy_nonoverlapping(
            value as *const T as *const u8,
            out.as_mut_ptr(),
            mem::size_of::<T>(),
        );
    }
}

// ============================================================================
// Decoded form
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// FAT width from the data-cluster count, as the FAT specification
    /// mandates.
    pub fn from_cluster_count(clusters: u32) -> FatType {
        if clusters < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if clusters < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
            FatType::Fat32 => 32,
        }
    }

    /// Canonical end-of-chain value written into terminating entries.
    pub fn end_of_chain(self) -> u32 {
        match self {
            FatType::Fat12 => 0xFFF,
            FatType::Fat16 => 0xFFFF,
            FatType::Fat32 => 0x0FFF_FFFF,
        }
    }

    /// Values at or above this threshold read as end-of-chain.
    pub fn end_of_chain_threshold(self) -> u32 {
        match self {
            FatType::Fat12 => 0xFF8,
            FatType::Fat16 => 0xFFF8,
            FatType::Fat32 => 0x0FFF_FFF8,
        }
    }

    pub fn bad_cluster(self) -> u32 {
        match self {
            FatType::Fat12 => 0xFF7,
            FatType::Fat16 => 0xFFF7,
            FatType::Fat32 => 0x0FFF_FFF7,
        }
    }

    /// Advisory FS-type string carried in the extended BPB.
    pub fn fs_type_string(self) -> [u8; 8] {
        match self {
            FatType::Fat12 => *b"FAT12   ",
            FatType::Fat16 => *b"FAT16   ",
            FatType::Fat32 => *b"FAT32   ",
        }
    }
}

impl fmt::Display for FatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FAT{}", self.bits())
    }
}

/// FAT12/16 extension block, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtBpb16 {
    pub drive_number: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

/// FAT32 extension block, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtBpb32 {
    pub sectors_per_fat: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
    pub drive_number: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedBpb {
    Fat16(ExtBpb16),
    Fat32(ExtBpb32),
}

/// A decoded boot sector. Produced by the formatter, read once at mount,
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entries: u16,
    pub total_sectors: u32,
    pub media_descriptor: u8,
    /// Sectors per FAT for FAT12/16 volumes; zero selects the FAT32 layout.
    pub sectors_per_fat_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub ext: ExtendedBpb,
}

impl BootSector {
    /// Read and validate sector 0 of the device.
    pub fn decode<B: BlockDevice>(device: &mut B) -> Result<BootSector, FfsError> {
        let mut buf = [0u8; BOOT_SECTOR_SIZE];
        device.read_at(0, &mut buf)?;
        Self::parse(&buf)
    }

    pub fn parse(buf: &[u8; BOOT_SECTOR_SIZE]) -> Result<BootSector, FfsError> {
        if buf[510] != 0x55 || buf[511] != 0xAA {
            return Err(FfsError::MalformedImage(
                "missing 0x55AA boot sector signature".to_string(),
            ));
        }

        let raw: RawBpb = read_raw(&buf[..]);
        let jump = raw.jump_boot[0];
        if jump != 0xEB && jump != 0xE9 {
            return Err(FfsError::MalformedImage(format!(
                "invalid jump instruction: 0x{:02X}",
                jump
            )));
        }

        let total_sectors_16 = raw.total_sectors_16;
        let total_sectors = if total_sectors_16 != 0 {
            total_sectors_16 as u32
        } else {
            raw.total_sectors_32
        };

        let sectors_per_fat_16 = raw.sectors_per_fat_16;
        let ext = if sectors_per_fat_16 == 0 {
            let raw_ext: RawExtBpb32 = read_raw(&buf[EXT_BPB_OFFSET..]);
            let fs_version = raw_ext.fs_version;
            if fs_version != 0 {
                return Err(FfsError::Unsupported(format!(
                    "FAT32 filesystem version {}.{}",
                    fs_version >> 8,
                    fs_version & 0xFF
                )));
            }
            ExtendedBpb::Fat32(ExtBpb32 {
                sectors_per_fat: raw_ext.sectors_per_fat_32,
                ext_flags: raw_ext.ext_flags,
                fs_version,
                root_cluster: raw_ext.root_cluster,
                fs_info_sector: raw_ext.fs_info_sector,
                backup_boot_sector: raw_ext.backup_boot_sector,
                drive_number: raw_ext.drive_number,
                volume_id: raw_ext.volume_id,
                volume_label: raw_ext.volume_label,
                fs_type: raw_ext.fs_type,
            })
        } else {
            let raw_ext: RawExtBpb16 = read_raw(&buf[EXT_BPB_OFFSET..]);
            ExtendedBpb::Fat16(ExtBpb16 {
                drive_number: raw_ext.drive_number,
                volume_id: raw_ext.volume_id,
                volume_label: raw_ext.volume_label,
                fs_type: raw_ext.fs_type,
            })
        };

        let bs = BootSector {
            oem_name: raw.oem_name,
            bytes_per_sector: raw.bytes_per_sector,
            sectors_per_cluster: raw.sectors_per_cluster,
            reserved_sectors: raw.reserved_sectors,
            num_fats: raw.num_fats,
            root_entries: raw.root_entries,
            total_sectors,
            media_descriptor: raw.media_descriptor,
            sectors_per_fat_16,
            sectors_per_track: raw.sectors_per_track,
            num_heads: raw.num_heads,
            hidden_sectors: raw.hidden_sectors,
            ext,
        };
        bs.validate()?;
        Ok(bs)
    }

    fn validate(&self) -> Result<(), FfsError> {
        if ![512, 1024, 2048, 4096].contains(&self.bytes_per_sector) {
            return Err(FfsError::MalformedImage(format!(
                "invalid bytes per sector: {}",
                self.bytes_per_sector
            )));
        }
        let spc = self.sectors_per_cluster;
        if !spc.is_power_of_two() {
            return Err(FfsError::MalformedImage(format!(
                "sectors per cluster not a power of two: {}",
                spc
            )));
        }
        let cluster_bytes = self.bytes_per_sector as u32 * spc as u32;
        if cluster_bytes > 32 * 1024 {
            return Err(FfsError::MalformedImage(format!(
                "cluster size {} exceeds 32 KiB",
                cluster_bytes
            )));
        }
        if self.num_fats == 0 {
            return Err(FfsError::MalformedImage("FAT count is zero".to_string()));
        }
        if self.total_sectors == 0 {
            return Err(FfsError::MalformedImage("total sector count is zero".to_string()));
        }
        match &self.ext {
            ExtendedBpb::Fat16(_) => {
                if self.reserved_sectors < 1 {
                    return Err(FfsError::MalformedImage(
                        "reserved sector count is zero".to_string(),
                    ));
                }
                if self.sectors_per_fat_16 == 0 {
                    return Err(FfsError::MalformedImage(
                        "sectors per FAT is zero".to_string(),
                    ));
                }
            }
            ExtendedBpb::Fat32(ext) => {
                if self.reserved_sectors < 32 {
                    return Err(FfsError::MalformedImage(format!(
                        "FAT32 reserved sector count {} below 32",
                        self.reserved_sectors
                    )));
                }
                if self.root_entries != 0 {
                    return Err(FfsError::MalformedImage(
                        "FAT32 volume with a fixed root entry count".to_string(),
                    ));
                }
                if ext.sectors_per_fat == 0 {
                    return Err(FfsError::MalformedImage(
                        "sectors per FAT is zero".to_string(),
                    ));
                }
                if ext.root_cluster < 2 {
                    return Err(FfsError::MalformedImage(format!(
                        "FAT32 root cluster {} below 2",
                        ext.root_cluster
                    )));
                }
            }
        }
        Ok(())
    }

    /// Encode to a full 512-byte sector: jump stub, BPB, extension block,
    /// zeroed boot code, 0x55AA trailer.
    pub fn encode(&self) -> [u8; BOOT_SECTOR_SIZE] {
        let mut buf = [0u8; BOOT_SECTOR_SIZE];

        let (total_16, total_32) = if self.total_sectors < 0x10000 {
            (self.total_sectors as u16, 0)
        } else {
            (0, self.total_sectors)
        };

        let (jump_boot, sectors_per_fat_16) = match &self.ext {
            ExtendedBpb::Fat16(_) => ([0xEB, 0x3C, 0x90], self.sectors_per_fat_16),
            ExtendedBpb::Fat32(_) => ([0xEB, 0x58, 0x90], 0),
        };

        let raw = RawBpb {
            jump_boot,
            oem_name: self.oem_name,
            bytes_per_sector: self.bytes_per_sector,
            sectors_per_cluster: self.sectors_per_cluster,
            reserved_sectors: self.reserved_sectors,
            num_fats: self.num_fats,
            root_entries: self.root_entries,
            total_sectors_16: total_16,
            media_descriptor: self.media_descriptor,
            sectors_per_fat_16,
            sectors_per_track: self.sectors_per_track,
            num_heads: self.num_heads,
            hidden_sectors: self.hidden_sectors,
            total_sectors_32: total_32,
        };
        write_raw(&raw, &mut buf);

        match &self.ext {
            ExtendedBpb::Fat16(ext) => {
                let raw_ext = RawExtBpb16 {
                    drive_number: ext.drive_number,
                    reserved: 0,
                    boot_signature: 0x29,
                    volume_id: ext.volume_id,
                    volume_label: ext.volume_label,
                    fs_type: ext.fs_type,
                };
                write_raw(&raw_ext, &mut buf[EXT_BPB_OFFSET..]);
            }
            ExtendedBpb::Fat32(ext) => {
                let raw_ext = RawExtBpb32 {
                    sectors_per_fat_32: ext.sectors_per_fat,
                    ext_flags: ext.ext_flags,
                    fs_version: ext.fs_version,
                    root_cluster: ext.root_cluster,
                    fs_info_sector: ext.fs_info_sector,
                    backup_boot_sector: ext.backup_boot_sector,
                    reserved: [0; 12],
                    drive_number: ext.drive_number,
                    reserved1: 0,
                    boot_signature: 0x29,
                    volume_id: ext.volume_id,
                    volume_label: ext.volume_label,
                    fs_type: ext.fs_type,
                };
                write_raw(&raw_ext, &mut buf[EXT_BPB_OFFSET..]);
            }
        }

        buf[510] = 0x55;
        buf[511] = 0xAA;
        buf
    }

    pub fn sectors_per_fat(&self) -> u32 {
        match &self.ext {
            ExtendedBpb::Fat16(_) => self.sectors_per_fat_16 as u32,
            ExtendedBpb::Fat32(ext) => ext.sectors_per_fat,
        }
    }

    pub fn oem_name_string(&self) -> String {
        String::from_utf8_lossy(&self.oem_name).trim_end().to_string()
    }

    pub fn volume_id(&self) -> u32 {
        match &self.ext {
            ExtendedBpb::Fat16(ext) => ext.volume_id,
            ExtendedBpb::Fat32(ext) => ext.volume_id,
        }
    }

    pub fn volume_label(&self) -> [u8; 11] {
        match &self.ext {
            ExtendedBpb::Fat16(ext) => ext.volume_label,
            ExtendedBpb::Fat32(ext) => ext.volume_label,
        }
    }

    /// Derive the volume geometry. Fails when the regions do not fit the
    /// device or the cluster count contradicts the selected FAT width.
    pub fn layout(&self) -> Result<Layout, FfsError> {
        let bps = self.bytes_per_sector as u32;
        let spc = self.sectors_per_cluster as u32;
        let reserved = self.reserved_sectors as u32;
        let num_fats = self.num_fats as u32;
        let spf = self.sectors_per_fat();
        let root_entries = self.root_entries as u32;

        let root_dir_sectors = (root_entries * DIR_ENTRY_SIZE).div_ceil(bps);
        let first_data_sector = reserved + num_fats * spf + root_dir_sectors;
        if first_data_sector >= self.total_sectors {
            return Err(FfsError::MalformedImage(format!(
                "metadata regions ({} sectors) exceed the volume ({} sectors)",
                first_data_sector, self.total_sectors
            )));
        }

        let raw_count = (self.total_sectors - first_data_sector) / spc;
        let fat_type = FatType::from_cluster_count(raw_count);
        // The FAT can only index as many entries as it has room for
        let fat_capacity = match fat_type {
            FatType::Fat12 => (spf as u64 * bps as u64 * 2 / 3) as u32,
            FatType::Fat16 => spf * bps / 2,
            FatType::Fat32 => spf * bps / 4,
        };
        let cluster_count = raw_count.min(fat_capacity.saturating_sub(2));
        if cluster_count == 0 {
            return Err(FfsError::MalformedImage("volume has no data clusters".to_string()));
        }
        match (&self.ext, fat_type) {
            (ExtendedBpb::Fat32(_), FatType::Fat32) => {}
            (ExtendedBpb::Fat16(_), FatType::Fat12 | FatType::Fat16) => {}
            _ => {
                return Err(FfsError::MalformedImage(format!(
                    "cluster count {} contradicts the {} BPB layout",
                    cluster_count,
                    if matches!(self.ext, ExtendedBpb::Fat32(_)) {
                        "FAT32"
                    } else {
                        "FAT12/16"
                    }
                )));
            }
        }

        let root_cluster = match &self.ext {
            ExtendedBpb::Fat32(ext) => ext.root_cluster,
            ExtendedBpb::Fat16(_) => 0,
        };

        debug!(
            "{} layout: {} sectors, {} clusters of {} bytes",
            fat_type,
            self.total_sectors,
            cluster_count,
            bps * spc
        );

        Ok(Layout {
            fat_type,
            bytes_per_sector: bps,
            sectors_per_cluster: spc,
            cluster_bytes: bps * spc,
            reserved_sectors: reserved,
            num_fats,
            sectors_per_fat: spf,
            root_entry_count: root_entries,
            root_dir_sectors,
            total_sectors: self.total_sectors,
            cluster_count,
            root_cluster,
        })
    }

    pub fn fat_type(&self) -> Result<FatType, FfsError> {
        Ok(self.layout()?.fat_type)
    }
}

/// Volume geometry derived from the boot sector, in sectors and bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub fat_type: FatType,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub cluster_bytes: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub sectors_per_fat: u32,
    pub root_entry_count: u32,
    pub root_dir_sectors: u32,
    pub total_sectors: u32,
    /// Data clusters; FAT entries 0 and 1 are not counted.
    pub cluster_count: u32,
    /// First cluster of the FAT32 root directory, 0 otherwise.
    pub root_cluster: u32,
}

impl Layout {
    pub fn fat_offset(&self, copy: u32) -> u64 {
        (self.reserved_sectors as u64 + copy as u64 * self.sectors_per_fat as u64)
            * self.bytes_per_sector as u64
    }

    pub fn fat_bytes(&self) -> usize {
        self.sectors_per_fat as usize * self.bytes_per_sector as usize
    }

    /// Byte offset of the fixed FAT12/16 root directory region.
    pub fn root_dir_offset(&self) -> u64 {
        (self.reserved_sectors as u64 + self.num_fats as u64 * self.sectors_per_fat as u64)
            * self.bytes_per_sector as u64
    }

    pub fn root_dir_bytes(&self) -> usize {
        self.root_dir_sectors as usize * self.bytes_per_sector as usize
    }

    pub fn first_data_sector(&self) -> u32 {
        self.reserved_sectors + self.num_fats * self.sectors_per_fat + self.root_dir_sectors
    }

    /// Byte offset of data cluster `cluster` (valid for cluster >= 2).
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.first_data_sector() as u64 * self.bytes_per_sector as u64
            + (cluster as u64 - 2) * self.cluster_bytes as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fat12() -> BootSector {
        BootSector {
            oem_name: *b"FFS     ",
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            num_fats: 2,
            root_entries: 224,
            total_sectors: 2880,
            media_descriptor: 0xF0,
            sectors_per_fat_16: 9,
            sectors_per_track: 18,
            num_heads: 2,
            hidden_sectors: 0,
            ext: ExtendedBpb::Fat16(ExtBpb16 {
                drive_number: 0,
                volume_id: 0x1234_5678,
                volume_label: *b"TESTVOL    ",
                fs_type: *b"FAT12   ",
            }),
        }
    }

    fn sample_fat32() -> BootSector {
        BootSector {
            oem_name: *b"FFS     ",
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            num_fats: 2,
            root_entries: 0,
            total_sectors: 1_048_576,
            media_descriptor: 0xF8,
            sectors_per_fat_16: 0,
            sectors_per_track: 63,
            num_heads: 255,
            hidden_sectors: 0,
            ext: ExtendedBpb::Fat32(ExtBpb32 {
                sectors_per_fat: 8192,
                ext_flags: 0,
                fs_version: 0,
                root_cluster: 2,
                fs_info_sector: 1,
                backup_boot_sector: 6,
                drive_number: 0x80,
                volume_id: 0xDEAD_BEEF,
                volume_label: *b"BIGVOL     ",
                fs_type: *b"FAT32   ",
            }),
        }
    }

    #[test]
    fn test_round_trip_fat12() {
        let bs = sample_fat12();
        let encoded = bs.encode();
        assert_eq!(encoded[510], 0x55);
        assert_eq!(encoded[511], 0xAA);
        assert_eq!(&encoded[0..3], &[0xEB, 0x3C, 0x90]);
        assert_eq!(BootSector::parse(&encoded).unwrap(), bs);
    }

    #[test]
    fn test_round_trip_fat32() {
        let bs = sample_fat32();
        let encoded = bs.encode();
        // sectors-per-FAT-16 must read zero so decoders select FAT32
        assert_eq!(&encoded[0x16..0x18], &[0, 0]);
        assert_eq!(BootSector::parse(&encoded).unwrap(), bs);
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut encoded = sample_fat12().encode();
        encoded[511] = 0x00;
        assert!(matches!(
            BootSector::parse(&encoded),
            Err(FfsError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_fat_type_from_cluster_count() {
        assert_eq!(FatType::from_cluster_count(1), FatType::Fat12);
        assert_eq!(FatType::from_cluster_count(4084), FatType::Fat12);
        assert_eq!(FatType::from_cluster_count(4085), FatType::Fat16);
        assert_eq!(FatType::from_cluster_count(65524), FatType::Fat16);
        assert_eq!(FatType::from_cluster_count(65525), FatType::Fat32);
    }

    #[test]
    fn test_layout_of_144m_floppy() {
        let mut bs = sample_fat12();
        bs.sectors_per_fat_16 = 9;
        let layout = bs.layout().unwrap();
        assert_eq!(layout.fat_type, FatType::Fat12);
        assert_eq!(layout.root_dir_sectors, 14);
        assert_eq!(layout.first_data_sector(), 1 + 18 + 14);
        assert_eq!(layout.fat_offset(0), 512);
        assert_eq!(layout.fat_offset(1), 512 + 9 * 512);
        // cluster 2 begins right after the root directory
        assert_eq!(layout.cluster_offset(2), 33 * 512);
    }

    #[test]
    fn test_oversized_cluster_rejected() {
        let mut bs = sample_fat12();
        bs.sectors_per_cluster = 128; // 64 KiB clusters
        let encoded = bs.encode();
        assert!(BootSector::parse(&encoded).is_err());
    }

    #[test]
    fn test_fat32_version_gate() {
        let mut bs = sample_fat32();
        if let ExtendedBpb::Fat32(ref mut ext) = bs.ext {
            ext.fs_version = 0x0100;
        }
        let encoded = bs.encode();
        assert!(matches!(
            BootSector::parse(&encoded),
            Err(FfsError::Unsupported(_))
        ));
    }
}
