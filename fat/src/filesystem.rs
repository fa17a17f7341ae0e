// A mounted FAT filesystem: the decoded boot sector, the live FAT, and
// the root directory location. The device and FAT sit behind a RefCell;
// the engine is single-threaded and every operation borrows them only
// for its own duration. Directory and file handles borrow the
// FileSystem, so they cannot outlive the mount.

use std::cell::RefCell;

use log::info;
use serde::{Deserialize, Serialize};

use ffs_core::{BlockDevice, FfsError};

use crate::boot_sector::{BootSector, FatType, Layout};
use crate::dir_cluster::{DirLocation, DirSlot, DirectoryCluster};
use crate::directory::Dir;
use crate::table::Fat;

pub(crate) struct State<B> {
    pub device: B,
    pub fat: Fat,
}

pub struct FileSystem<B: BlockDevice> {
    bs: BootSector,
    layout: Layout,
    state: RefCell<State<B>>,
}

impl<B: BlockDevice> FileSystem<B> {
    /// Mount a previously formatted volume. Reads the boot sector and FAT
    /// copy 0; mirror copies are written on every flush but not
    /// cross-checked here.
    pub fn new(mut device: B) -> Result<FileSystem<B>, FfsError> {
        let size = device.len();
        let sector_size = device.sector_size();
        if size == 0 || size % sector_size as u64 != 0 {
            return Err(FfsError::MalformedImage(format!(
                "device size {} is not a positive multiple of {}",
                size, sector_size
            )));
        }

        let bs = BootSector::decode(&mut device)?;
        let layout = bs.layout()?;
        let fat = Fat::decode(&mut device, &layout, 0)?;

        info!(
            "mounted {} volume \"{}\": {} sectors, {} clusters of {} bytes",
            layout.fat_type,
            bs.oem_name_string(),
            layout.total_sectors,
            layout.cluster_count,
            layout.cluster_bytes
        );

        Ok(FileSystem {
            bs,
            layout,
            state: RefCell::new(State { device, fat }),
        })
    }

    /// Unmount, returning the backing device.
    pub fn into_device(self) -> B {
        self.state.into_inner().device
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.bs
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn fat_type(&self) -> FatType {
        self.layout.fat_type
    }

    pub fn oem_name(&self) -> String {
        self.bs.oem_name_string()
    }

    pub fn root_dir(&self) -> Dir<'_, B> {
        Dir::new(self, self.root_location())
    }

    pub(crate) fn root_location(&self) -> DirLocation {
        match self.layout.fat_type {
            FatType::Fat32 => DirLocation::Cluster(self.layout.root_cluster),
            _ => DirLocation::Root,
        }
    }

    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut State<B>) -> Result<R, FfsError>,
    ) -> Result<R, FfsError> {
        let mut state = self.state.borrow_mut();
        f(&mut state)
    }

    /// The volume label: the root directory's volume-id entry when
    /// present, the extended BPB field otherwise. Trailing padding is
    /// trimmed.
    pub fn volume_label(&self) -> Result<String, FfsError> {
        let root = self.root_location();
        let from_root = self.with_state(|state| {
            let cluster = DirectoryCluster::read(&mut state.device, &state.fat, &self.layout, root)?;
            Ok(cluster.slots.iter().find_map(|slot| match slot {
                DirSlot::Short(entry) => {
                    let attrs = entry.attributes();
                    if attrs.is_volume_id() && !attrs.is_directory() {
                        Some(String::from_utf8_lossy(&entry.name).trim_end().to_string())
                    } else {
                        None
                    }
                }
                _ => None,
            }))
        })?;

        Ok(from_root.unwrap_or_else(|| {
            String::from_utf8_lossy(&self.bs.volume_label())
                .trim_end()
                .to_string()
        }))
    }

    /// Volume metadata snapshot.
    pub fn info(&self) -> Result<VolumeInfo, FfsError> {
        let free_clusters = self.with_state(|state| Ok(state.fat.free_count()))?;
        Ok(VolumeInfo {
            oem_name: self.oem_name(),
            volume_label: self.volume_label()?,
            volume_id: self.bs.volume_id(),
            fat_type: self.layout.fat_type,
            bytes_per_sector: self.layout.bytes_per_sector,
            sectors_per_cluster: self.layout.sectors_per_cluster,
            cluster_size: self.layout.cluster_bytes,
            reserved_sectors: self.layout.reserved_sectors,
            fat_count: self.layout.num_fats,
            sectors_per_fat: self.layout.sectors_per_fat,
            root_entries: self.layout.root_entry_count,
            total_sectors: self.layout.total_sectors,
            total_clusters: self.layout.cluster_count,
            free_clusters,
        })
    }
}

/// Reported filesystem metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub oem_name: String,
    pub volume_label: String,
    pub volume_id: u32,
    pub fat_type: FatType,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub cluster_size: u32,
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub sectors_per_fat: u32,
    pub root_entries: u32,
    pub total_sectors: u32,
    pub total_clusters: u32,
    pub free_clusters: u32,
}
