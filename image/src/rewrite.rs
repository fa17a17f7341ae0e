// Rebuild an image from scratch while adding extra host files: the
// destination inherits the source's label, OEM name, FAT type and size,
// every file and directory is replicated with its attributes, then the
// extra files land at their paths relative to `extra_base`.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use ffs_core::{Attributes, FfsError};

use crate::image::Image;

pub fn rewrite_image<P: AsRef<Path>>(
    dst_path: P,
    src_path: P,
    extra_base: &Path,
    extra_files: &[PathBuf],
) -> Result<(), FfsError> {
    let src = Image::open(&src_path)?;
    let label = src.volume_label()?;
    let oem_name = src.oem_name();
    let fat_type = src.fat_type();
    let size = fs::metadata(&src_path)?.len();

    let dst = Image::create(&dst_path, &label, &oem_name, fat_type, size)?;

    let records = src.scan_files()?;
    info!(
        "rewriting {} entries from {} into {}",
        records.len(),
        src_path.as_ref().display(),
        dst_path.as_ref().display()
    );

    for record in &records {
        if record.is_dir {
            dst.mkdir(&record.name)?;
        } else {
            let contents = src.read_file(&record.name)?;
            dst.write_file(&record.name, &contents)?;
        }
        if record.hidden {
            dst.set_attr(&record.name, Attributes::HIDDEN, true)?;
        }
        if record.system {
            dst.set_attr(&record.name, Attributes::SYSTEM, true)?;
        }
        if record.read_only {
            dst.set_attr(&record.name, Attributes::READ_ONLY, true)?;
        }
    }

    for file in extra_files {
        let rel = file
            .strip_prefix(extra_base)
            .map_err(|_| FfsError::InvalidName(file.display().to_string()))?;
        let target = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let (parent, _) = crate::image::split_path(&target);
        if !parent.is_empty() {
            dst.mkdir_all(parent)?;
        }
        dst.add_file(&target, file)?;
    }

    dst.close()?;
    src.close()
}
