// Image-level convenience layer: a mounted filesystem over a backing
// file, with path-based operations and host-file import/export. Paths
// are '/'-separated here only; the engine resolves one component at a
// time.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use ffs_core::{Attributes, FfsError, FileDisk};
use ffs_fat::{format_super_floppy, Dir, FatType, FileSystem, SuperFloppyConfig, VolumeInfo};

/// One file or directory found while scanning an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Image path, '/'-separated, no leading slash.
    pub name: String,
    pub short_name: String,
    pub is_dir: bool,
    pub hidden: bool,
    pub system: bool,
    pub read_only: bool,
}

/// A FAT filesystem image backed by a regular file.
pub struct Image {
    path: PathBuf,
    fs: FileSystem<FileDisk>,
}

impl Image {
    /// Open and mount an existing image file read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Image, FfsError> {
        let disk = FileDisk::open(&path)?;
        let fs = FileSystem::new(disk)?;
        info!("opened image {}", path.as_ref().display());
        Ok(Image {
            path: path.as_ref().to_path_buf(),
            fs,
        })
    }

    /// Create the backing file (size rounded up to a whole KiB), format
    /// it as a super-floppy, and mount it.
    pub fn create<P: AsRef<Path>>(
        path: P,
        label: &str,
        oem_name: &str,
        fat_type: FatType,
        size: u64,
    ) -> Result<Image, FfsError> {
        let size = size.div_ceil(1024) * 1024;
        let mut disk = FileDisk::create(&path, size)?;
        format_super_floppy(
            &mut disk,
            &SuperFloppyConfig {
                fat_type,
                label: label.to_string(),
                oem_name: oem_name.to_string(),
            },
        )?;
        let fs = FileSystem::new(disk)?;
        info!(
            "created {} image {} ({} bytes)",
            fat_type,
            path.as_ref().display(),
            size
        );
        Ok(Image {
            path: path.as_ref().to_path_buf(),
            fs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unmount and sync the backing file.
    pub fn close(self) -> Result<(), FfsError> {
        let mut disk = self.fs.into_device();
        ffs_core::BlockDevice::close(&mut disk)
    }

    /// Resolve a '/'-separated directory path, one component at a time.
    fn dir_at(&self, path: &str) -> Result<Dir<'_, FileDisk>, FfsError> {
        let mut dir = self.fs.root_dir();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let entry = dir
                .entry(component)?
                .ok_or_else(|| FfsError::NotFound(path.to_string()))?;
            dir = entry.dir()?;
        }
        Ok(dir)
    }

    /// True when `path` names an existing directory.
    pub fn is_dir(&self, path: &str) -> Result<bool, FfsError> {
        match self.dir_at(path) {
            Ok(_) => Ok(true),
            Err(FfsError::NotFound(_)) | Err(FfsError::TypeMismatch(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Create one directory level; the parent must already exist.
    pub fn mkdir(&self, path: &str) -> Result<(), FfsError> {
        if self.is_dir(path)? {
            return Err(FfsError::NameConflict(path.to_string()));
        }
        let (parent, name) = split_path(path);
        let dir = self.dir_at(parent)?;
        dir.add_directory(name)?;
        debug!("mkdir {}", path);
        Ok(())
    }

    /// Create every missing level of a '/'-separated directory path.
    pub fn mkdir_all(&self, path: &str) -> Result<(), FfsError> {
        let mut built = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if built.is_empty() {
                built = component.to_string();
            } else {
                built = format!("{}/{}", built, component);
            }
            if !self.is_dir(&built)? {
                self.mkdir(&built)?;
            }
        }
        Ok(())
    }

    /// Copy a host file into the image at `dst`. Returns the bytes
    /// copied, which must match the source length.
    pub fn add_file<P: AsRef<Path>>(&self, dst: &str, src: P) -> Result<u64, FfsError> {
        let expected = fs::metadata(&src)?.len();
        let mut reader = fs::File::open(&src)?;

        let (parent, name) = split_path(dst);
        let dir = self.dir_at(parent)?;
        let entry = dir.add_file(name)?;
        let mut file = entry.file()?;
        let copied = io::copy(&mut reader, &mut file)?;
        file.close()?;

        if copied != expected {
            return Err(FfsError::Io(io::Error::other(format!(
                "write count mismatch for {}: expected {}, wrote {}",
                dst, expected, copied
            ))));
        }
        debug!("added {} ({} bytes)", dst, copied);
        Ok(copied)
    }

    /// Create a file at `path` holding `data`.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FfsError> {
        let (parent, name) = split_path(path);
        let dir = self.dir_at(parent)?;
        let entry = dir.add_file(name)?;
        let mut file = entry.file()?;
        file.write(data)?;
        file.close()
    }

    /// Read a file out of the image into memory.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, FfsError> {
        use std::io::Read;

        let (parent, name) = split_path(path);
        let dir = self.dir_at(parent)?;
        let entry = dir
            .entry(name)?
            .ok_or_else(|| FfsError::NotFound(path.to_string()))?;
        let mut file = entry.file()?;
        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)
            .map_err(|e| FfsError::Io(e))?;
        Ok(contents)
    }

    /// Depth-first listing of every file and directory, parents before
    /// children. "." / ".." and the volume label are skipped.
    pub fn scan_files(&self) -> Result<Vec<FileRecord>, FfsError> {
        let mut records = Vec::new();
        let root = self.fs.root_dir();
        scan_dir(&root, "", &mut records)?;
        Ok(records)
    }

    /// Replicate a host directory tree into the image.
    pub fn import<P: AsRef<Path>>(&self, host_dir: P) -> Result<(), FfsError> {
        self.import_tree(host_dir.as_ref(), "")
    }

    fn import_tree(&self, host: &Path, dst: &str) -> Result<(), FfsError> {
        let mut entries: Vec<_> =
            fs::read_dir(host)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let target = if dst.is_empty() {
                name
            } else {
                format!("{}/{}", dst, name)
            };
            if entry.file_type()?.is_dir() {
                self.mkdir(&target)?;
                self.import_tree(&entry.path(), &target)?;
            } else {
                self.add_file(&target, entry.path())?;
            }
        }
        Ok(())
    }

    /// Toggle a settable attribute on the entry at `path`.
    pub fn set_attr(&self, path: &str, attr: Attributes, state: bool) -> Result<(), FfsError> {
        let (parent, name) = split_path(path);
        let dir = self.dir_at(parent)?;
        let mut entry = dir
            .entry(name)?
            .ok_or_else(|| FfsError::NotFound(path.to_string()))?;
        entry.set_attr(attr, state)
    }

    pub fn attrs(&self, path: &str) -> Result<Attributes, FfsError> {
        let (parent, name) = split_path(path);
        let dir = self.dir_at(parent)?;
        let entry = dir
            .entry(name)?
            .ok_or_else(|| FfsError::NotFound(path.to_string()))?;
        Ok(entry.attr())
    }

    pub fn volume_label(&self) -> Result<String, FfsError> {
        self.fs.volume_label()
    }

    pub fn oem_name(&self) -> String {
        self.fs.oem_name()
    }

    pub fn fat_type(&self) -> FatType {
        self.fs.fat_type()
    }

    pub fn info(&self) -> Result<VolumeInfo, FfsError> {
        self.fs.info()
    }
}

pub(crate) fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

fn scan_dir(
    dir: &Dir<'_, FileDisk>,
    prefix: &str,
    records: &mut Vec<FileRecord>,
) -> Result<(), FfsError> {
    for entry in dir.entries()? {
        let name = entry.name();
        if name == "." || name == ".." {
            continue;
        }
        let full = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };
        let attr = entry.attr();
        records.push(FileRecord {
            name: full.clone(),
            short_name: entry.short_name(),
            is_dir: entry.is_dir(),
            hidden: attr.is_hidden(),
            system: attr.is_system(),
            read_only: attr.is_read_only(),
        });
        if entry.is_dir() {
            scan_dir(&entry.dir()?, &full, records)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::split_path;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("EFI/BOOT/BOOTX64.EFI"), ("EFI/BOOT", "BOOTX64.EFI"));
        assert_eq!(split_path("readme.txt"), ("", "readme.txt"));
        assert_eq!(split_path("/top/"), ("", "top"));
    }
}
