// Super-floppy formatter: lays out a boot sector, seeded FAT mirrors and
// an empty root directory across the whole device, no partition table.
// Geometry comes from per-type size tables; the FAT size is settled by
// fixpoint iteration since it feeds back into the cluster count.

use log::info;

use ffs_core::{Attributes, BlockDevice, FfsError};

use crate::boot_sector::{
    BootSector, ExtBpb16, ExtBpb32, ExtendedBpb, FatType, BOOT_SECTOR_SIZE, DIR_ENTRY_SIZE,
};
use crate::dir_cluster::{DirLocation, DirSlot, DirectoryCluster, ShortDirEntry};
use crate::table::Fat;
use crate::timestamps;

#[derive(Debug, Clone)]
pub struct SuperFloppyConfig {
    pub fat_type: FatType,
    /// Volume label, up to 11 characters; padded with spaces.
    pub label: String,
    /// OEM name, up to 8 characters; padded with spaces.
    pub oem_name: String,
}

struct Geometry {
    sectors_per_cluster: u32,
    reserved_sectors: u32,
    root_entries: u32,
    media_descriptor: u8,
    sectors_per_fat: u32,
    cluster_count: u32,
    chs: (u16, u16),
}

/// Write a fresh, valid, empty filesystem over the whole device.
pub fn format_super_floppy<B: BlockDevice>(
    device: &mut B,
    config: &SuperFloppyConfig,
) -> Result<(), FfsError> {
    let sector_size = device.sector_size();
    if sector_size != 512 {
        return Err(FfsError::Unsupported(format!(
            "formatting with {}-byte sectors",
            sector_size
        )));
    }
    let size = device.len();
    if size == 0 || size % 512 != 0 {
        return Err(FfsError::MalformedImage(format!(
            "device size {} is not a positive multiple of 512",
            size
        )));
    }
    let total_sectors = u32::try_from(size / 512)
        .map_err(|_| FfsError::Unsupported("device beyond 2 TiB".to_string()))?;

    let geo = choose_geometry(total_sectors, config.fat_type)?;
    let volume_id = derive_volume_id();
    let label = pad_string(&config.label, b"NO NAME    ");
    let oem_name = pad_string(&config.oem_name, b"FFS     ");

    let ext = match config.fat_type {
        FatType::Fat32 => ExtendedBpb::Fat32(ExtBpb32 {
            sectors_per_fat: geo.sectors_per_fat,
            ext_flags: 0,
            fs_version: 0,
            root_cluster: 2,
            fs_info_sector: 1,
            backup_boot_sector: 6,
            drive_number: 0x80,
            volume_id,
            volume_label: label,
            fs_type: FatType::Fat32.fs_type_string(),
        }),
        _ => ExtendedBpb::Fat16(ExtBpb16 {
            drive_number: if geo.media_descriptor == 0xF0 { 0x00 } else { 0x80 },
            volume_id,
            volume_label: label,
            fs_type: config.fat_type.fs_type_string(),
        }),
    };

    let bs = BootSector {
        oem_name,
        bytes_per_sector: 512,
        sectors_per_cluster: geo.sectors_per_cluster as u8,
        reserved_sectors: geo.reserved_sectors as u16,
        num_fats: 2,
        root_entries: geo.root_entries as u16,
        total_sectors,
        media_descriptor: geo.media_descriptor,
        sectors_per_fat_16: match config.fat_type {
            FatType::Fat32 => 0,
            _ => geo.sectors_per_fat as u16,
        },
        sectors_per_track: geo.chs.0,
        num_heads: geo.chs.1,
        hidden_sectors: 0,
        ext,
    };
    let layout = bs.layout()?;
    if layout.fat_type != config.fat_type {
        return Err(FfsError::Unsupported(format!(
            "device size yields a {} geometry, not {}",
            layout.fat_type, config.fat_type
        )));
    }

    let sector = bs.encode();
    device.write_at(0, &sector)?;

    // FAT32 keeps a backup boot sector and an FSInfo sector in the
    // reserved region
    if config.fat_type == FatType::Fat32 {
        device.write_at(6 * 512, &sector)?;
        let fs_info = encode_fs_info(layout.cluster_count - 1, 3);
        device.write_at(512, &fs_info)?;
        device.write_at(7 * 512, &fs_info)?;
    }

    let mut fat = Fat::new_empty(&layout, geo.media_descriptor);
    if config.fat_type == FatType::Fat32 {
        // Cluster 2 carries the root directory
        fat.set_raw_entry(2, FatType::Fat32.end_of_chain())?;
    }
    fat.write_to_device(device, &layout)?;

    // Zero the root region (FAT12/16) or the root cluster (FAT32)
    match config.fat_type {
        FatType::Fat32 => {
            let zeros = vec![0u8; layout.cluster_bytes as usize];
            device.write_at(layout.cluster_offset(2), &zeros)?;
        }
        _ => {
            let zeros = vec![0u8; layout.root_dir_bytes()];
            device.write_at(layout.root_dir_offset(), &zeros)?;

            if label != *b"NO NAME    " {
                let entry =
                    ShortDirEntry::new(label, Attributes::VOLUME_ID, 0, timestamps::now());
                let root = DirectoryCluster {
                    location: DirLocation::Root,
                    slots: vec![DirSlot::Short(entry)],
                };
                root.write(device, &mut fat, &layout)?;
            }
        }
    }

    device.flush()?;
    info!(
        "formatted {} super-floppy: {} sectors, {} clusters of {} bytes",
        layout.fat_type, total_sectors, geo.cluster_count, layout.cluster_bytes
    );
    Ok(())
}

fn pad_string<const N: usize>(s: &str, default: &[u8; N]) -> [u8; N] {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return *default;
    }
    let mut out = [0x20u8; N];
    for (i, b) in trimmed.bytes().take(N).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    out
}

/// DOS-style volume serial derived from the format time.
fn derive_volume_id() -> u32 {
    let (date, time) = timestamps::encode_datetime(timestamps::now());
    ((date as u32) << 16) | time as u32
}

fn choose_geometry(total_sectors: u32, fat_type: FatType) -> Result<Geometry, FfsError> {
    let too_small =
        || FfsError::Unsupported(format!("{} sectors is too small for {}", total_sectors, fat_type));

    let (sectors_per_cluster, reserved_sectors, root_entries, media_descriptor, chs) =
        match fat_type {
            FatType::Fat12 => match total_sectors {
                // Sub-floppy scratch images keep the root region tiny
                0..=719 => (1, 1, 16, 0xF8, (18, 2)),
                720..=1440 => (2, 1, 112, 0xF0, (9, 2)),     // 360K / 720K
                1441..=2880 => (1, 1, 224, 0xF0, (18, 2)),   // 1.2M / 1.44M
                2881..=5760 => (2, 1, 240, 0xF0, (36, 2)),   // 2.88M
                _ => {
                    // Oversized FAT12: smallest power of two keeping the
                    // cluster count under the FAT12 ceiling
                    let mut spc = 4u32;
                    while spc < 64 && total_sectors / spc >= 4085 {
                        spc *= 2;
                    }
                    if total_sectors / spc >= 4085 {
                        return Err(FfsError::Unsupported(format!(
                            "{} sectors is too large for FAT12",
                            total_sectors
                        )));
                    }
                    (spc, 1, 512, 0xF8, (63, 255))
                }
            },
            FatType::Fat16 => {
                // Cluster sizes per the usual compatibility table; 32 KiB
                // clusters cap FAT16 volumes at 2 GiB
                let spc = match total_sectors {
                    0..=32_680 => 2,
                    32_681..=262_144 => 4,
                    262_145..=524_288 => 8,
                    524_289..=1_048_576 => 16,
                    1_048_577..=2_097_152 => 32,
                    2_097_153..=4_194_304 => 64,
                    _ => {
                        return Err(FfsError::Unsupported(format!(
                            "{} sectors is too large for FAT16",
                            total_sectors
                        )))
                    }
                };
                (spc, 1, 512, 0xF8, (63, 255))
            }
            FatType::Fat32 => {
                let spc = match total_sectors {
                    0..=532_480 => 1,
                    532_481..=16_777_216 => 8,
                    16_777_217..=33_554_432 => 16,
                    33_554_433..=67_108_864 => 32,
                    _ => 64,
                };
                (spc, 32, 0, 0xF8, (63, 255))
            }
        };

    let root_dir_sectors = (root_entries * DIR_ENTRY_SIZE).div_ceil(512);
    let sectors_per_fat = compute_sectors_per_fat(
        total_sectors,
        reserved_sectors,
        root_dir_sectors,
        2,
        sectors_per_cluster,
        fat_type,
    )
    .ok_or_else(too_small)?;

    let metadata = reserved_sectors + 2 * sectors_per_fat + root_dir_sectors;
    let cluster_count = total_sectors
        .checked_sub(metadata)
        .ok_or_else(too_small)?
        / sectors_per_cluster;

    let valid = match fat_type {
        FatType::Fat12 => (1..4085).contains(&cluster_count),
        FatType::Fat16 => (4085..65525).contains(&cluster_count),
        FatType::Fat32 => cluster_count >= 65525,
    };
    if !valid {
        return Err(FfsError::Unsupported(format!(
            "{} sectors yields {} clusters, outside the {} range",
            total_sectors, cluster_count, fat_type
        )));
    }

    Ok(Geometry {
        sectors_per_cluster,
        reserved_sectors,
        root_entries,
        media_descriptor,
        sectors_per_fat,
        cluster_count,
        chs,
    })
}

/// Settle the sectors-per-FAT value: the FAT must index every data
/// cluster, but growing it shrinks the data region. Starting from one
/// sector and re-deriving until stable converges in a few rounds.
fn compute_sectors_per_fat(
    total_sectors: u32,
    reserved_sectors: u32,
    root_dir_sectors: u32,
    num_fats: u32,
    sectors_per_cluster: u32,
    fat_type: FatType,
) -> Option<u32> {
    let mut sectors_per_fat = 1u32;
    loop {
        let metadata = reserved_sectors + num_fats * sectors_per_fat + root_dir_sectors;
        let data_sectors = total_sectors.checked_sub(metadata)?;
        let clusters = data_sectors / sectors_per_cluster;
        if clusters == 0 {
            return None;
        }
        let entries = clusters as u64 + 2;
        let fat_bytes = match fat_type {
            FatType::Fat12 => (entries * 3).div_ceil(2),
            FatType::Fat16 => entries * 2,
            FatType::Fat32 => entries * 4,
        };
        let needed = fat_bytes.div_ceil(512) as u32;
        if needed <= sectors_per_fat {
            return Some(sectors_per_fat);
        }
        sectors_per_fat = needed;
    }
}

/// Minimal FAT32 FSInfo sector: signatures, free count, next-free hint.
fn encode_fs_info(free_count: u32, next_free: u32) -> [u8; BOOT_SECTOR_SIZE] {
    let mut buf = [0u8; BOOT_SECTOR_SIZE];
    buf[0..4].copy_from_slice(b"RRaA");
    buf[484..488].copy_from_slice(b"rrAa");
    buf[488..492].copy_from_slice(&free_count.to_le_bytes());
    buf[492..496].copy_from_slice(&next_free.to_le_bytes());
    buf[510] = 0x55;
    buf[511] = 0xAA;
    buf
}
