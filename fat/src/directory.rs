// Directory handles: enumeration, case-insensitive lookup, and the
// add-entry protocol. A Dir borrows its FileSystem and re-reads the slot
// array for every operation; only the boot sector and the FAT are cached
// across calls.

use chrono::{DateTime, Utc};
use log::debug;

use ffs_core::{Attributes, BlockDevice, FfsError};

use crate::dir_cluster::{
    decode_entries, encode_long_name, DirLocation, DirSlot, DirectoryCluster, ShortDirEntry,
};
use crate::file::File;
use crate::filesystem::FileSystem;
use crate::names::{generate_short_name, pack_short_name};
use crate::timestamps;

/// Longest name the VFAT scheme can spell (255 UTF-16 units).
const MAX_LONG_NAME: usize = 255;

pub struct Dir<'fs, B: BlockDevice> {
    fs: &'fs FileSystem<B>,
    location: DirLocation,
}

impl<'fs, B: BlockDevice> Dir<'fs, B> {
    pub(crate) fn new(fs: &'fs FileSystem<B>, location: DirLocation) -> Dir<'fs, B> {
        Dir { fs, location }
    }

    pub fn location(&self) -> DirLocation {
        self.location
    }

    fn read_cluster(&self) -> Result<DirectoryCluster, FfsError> {
        self.fs.with_state(|state| {
            DirectoryCluster::read(&mut state.device, &state.fat, self.fs.layout(), self.location)
        })
    }

    /// Enumerate the live entries. Deleted slots and the volume label are
    /// skipped; "." and ".." of subdirectories are included.
    pub fn entries(&self) -> Result<Vec<DirEntry<'fs, B>>, FfsError> {
        let cluster = self.read_cluster()?;
        Ok(decode_entries(&cluster.slots)
            .into_iter()
            .map(|decoded| DirEntry {
                fs: self.fs,
                dir_location: self.location,
                slot_index: decoded.slot_index,
                name: decoded.name,
                entry: decoded.entry,
            })
            .collect())
    }

    /// Case-insensitive lookup by long name.
    pub fn entry(&self, name: &str) -> Result<Option<DirEntry<'fs, B>>, FfsError> {
        let wanted = name.trim().to_uppercase();
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.name.to_uppercase() == wanted))
    }

    pub fn add_file(&self, name: &str) -> Result<DirEntry<'fs, B>, FfsError> {
        self.add_entry(name, Attributes::ARCHIVE)
    }

    pub fn add_directory(&self, name: &str) -> Result<DirEntry<'fs, B>, FfsError> {
        let entry = self.add_entry(name, Attributes::DIRECTORY)?;

        // ".." stores cluster 0 when the parent is the root, even on
        // FAT32 where the root itself lives in a chain
        let parent_cluster = if self.location == self.fs.root_location() {
            0
        } else {
            match self.location {
                DirLocation::Root => 0,
                DirLocation::Cluster(cluster) => cluster,
            }
        };
        let sub = DirectoryCluster::new_subdirectory(
            entry.first_cluster(),
            parent_cluster,
            entry.entry.created(),
        );
        self.fs.with_state(|state| {
            sub.write(&mut state.device, &mut state.fat, self.fs.layout())
        })?;

        Ok(entry)
    }

    /// Insert protocol: validate the name, check for collisions, derive
    /// the 8.3 name, emit long entries when it differs from the
    /// uppercased long name, allocate a start cluster, stamp times, and
    /// persist FAT before directory.
    fn add_entry(&self, name: &str, attr: Attributes) -> Result<DirEntry<'fs, B>, FfsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FfsError::InvalidName("empty name".to_string()));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(FfsError::InvalidName(name.to_string()));
        }
        if name.encode_utf16().count() > MAX_LONG_NAME {
            return Err(FfsError::InvalidName(name.to_string()));
        }

        let mut cluster = self.read_cluster()?;
        let existing = decode_entries(&cluster.slots);

        let wanted = name.to_uppercase();
        if existing.iter().any(|e| e.name.to_uppercase() == wanted) {
            return Err(FfsError::NameConflict(name.to_string()));
        }

        let used = cluster.used_short_names();
        let short_name = generate_short_name(name, &used)?;
        let packed = pack_short_name(&short_name)?;

        let long_entries = if short_name != wanted {
            encode_long_name(name, &packed)
        } else {
            Vec::new()
        };

        let now = timestamps::now();
        let (start_cluster, entry) = self.fs.with_state(|state| {
            let start_cluster = state.fat.alloc_chain()?;
            let entry = ShortDirEntry::new(packed, attr, start_cluster, now);

            // FAT first: a crash may leak the cluster but never leaves a
            // directory entry pointing at a free one.
            state
                .fat
                .write_to_device(&mut state.device, self.fs.layout())?;

            for long in &long_entries {
                cluster.slots.push(DirSlot::Long(long.clone()));
            }
            cluster.slots.push(DirSlot::Short(entry));
            cluster.write(&mut state.device, &mut state.fat, self.fs.layout())?;

            Ok((start_cluster, entry))
        })?;

        debug!(
            "added {} \"{}\" as {} at cluster {}",
            if attr.is_directory() { "directory" } else { "file" },
            name,
            short_name,
            start_cluster
        );

        Ok(DirEntry {
            fs: self.fs,
            dir_location: self.location,
            slot_index: cluster.slots.len() - 1,
            name: name.to_string(),
            entry,
        })
    }
}

/// One live entry of a directory: the decoded short entry, its long name,
/// and enough location to write attribute or size updates back.
pub struct DirEntry<'fs, B: BlockDevice> {
    fs: &'fs FileSystem<B>,
    dir_location: DirLocation,
    slot_index: usize,
    name: String,
    entry: ShortDirEntry,
}

impl<'fs, B: BlockDevice> DirEntry<'fs, B> {
    /// The long name, or the rendered 8.3 name when no long entries
    /// exist.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rendered 8.3 name.
    pub fn short_name(&self) -> String {
        self.entry.short_name()
    }

    pub fn attr(&self) -> Attributes {
        self.entry.attributes()
    }

    pub fn is_dir(&self) -> bool {
        self.attr().is_directory()
    }

    pub fn is_volume_id(&self) -> bool {
        self.attr().is_volume_id()
    }

    pub fn file_size(&self) -> u32 {
        self.entry.file_size
    }

    pub fn first_cluster(&self) -> u32 {
        self.entry.first_cluster()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.entry.created()
    }

    pub fn written(&self) -> DateTime<Utc> {
        self.entry.written()
    }

    /// Toggle one of the settable attribute bits (ReadOnly, Hidden,
    /// System) and persist the change immediately.
    pub fn set_attr(&mut self, attr: Attributes, state: bool) -> Result<(), FfsError> {
        if !attr.is_settable() {
            return Err(FfsError::InvalidAttr);
        }

        let layout = self.fs.layout();
        let slot_index = self.slot_index;
        let dir_location = self.dir_location;
        let updated = self.fs.with_state(|st| {
            let mut cluster =
                DirectoryCluster::read(&mut st.device, &st.fat, layout, dir_location)?;
            let slot = cluster.slots.get_mut(slot_index).ok_or_else(|| {
                FfsError::MalformedImage("directory slot vanished".to_string())
            })?;
            let DirSlot::Short(entry) = slot else {
                return Err(FfsError::MalformedImage(
                    "directory slot changed type".to_string(),
                ));
            };
            let mut attrs = entry.attributes();
            attrs.set(attr, state);
            entry.attr = attrs.bits();
            let updated = *entry;
            cluster.write(&mut st.device, &mut st.fat, layout)?;
            Ok(updated)
        })?;

        self.entry = updated;
        Ok(())
    }

    /// Open this entry as a directory.
    pub fn dir(&self) -> Result<Dir<'fs, B>, FfsError> {
        if !self.is_dir() {
            return Err(FfsError::TypeMismatch("directory"));
        }
        let cluster = self.first_cluster();
        // ".." stores cluster 0 for the root
        let location = if cluster < 2 {
            self.fs.root_location()
        } else {
            DirLocation::Cluster(cluster)
        };
        Ok(Dir::new(self.fs, location))
    }

    /// Open this entry as a file.
    pub fn file(&self) -> Result<File<'fs, B>, FfsError> {
        if self.is_dir() {
            return Err(FfsError::TypeMismatch("file"));
        }
        Ok(File::new(
            self.fs,
            self.dir_location,
            self.slot_index,
            self.entry,
        ))
    }
}
