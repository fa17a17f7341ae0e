// End-to-end scenarios over an in-memory device: format, mount, files,
// long names, directory trees, attributes, and volume exhaustion.

use std::io::Read;

use ffs_core::{Attributes, MemDisk};
use ffs_fat::names::short_name_checksum;
use ffs_fat::{format_super_floppy, FatType, FileSystem, SuperFloppyConfig};

const FLOPPY_144M: u64 = 1_474_560;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn format_fat12(size: u64) -> MemDisk {
    let mut disk = MemDisk::new(size).unwrap();
    format_super_floppy(
        &mut disk,
        &SuperFloppyConfig {
            fat_type: FatType::Fat12,
            label: "TESTVOL".to_string(),
            oem_name: "FFS".to_string(),
        },
    )
    .unwrap();
    disk
}

#[test]
fn test_format_and_mount_floppy() {
    init_logging();
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();

    let info = fs.info().unwrap();
    assert_eq!(info.fat_type, FatType::Fat12);
    assert_eq!(info.oem_name, "FFS");
    assert_eq!(info.volume_label, "TESTVOL");
    assert_eq!(info.bytes_per_sector, 512);
    assert_eq!(info.total_sectors, 2880);
    assert_eq!(info.fat_count, 2);
    assert_eq!(info.root_entries, 224);

    // The volume-id entry does not show up in the listing
    let root = fs.root_dir();
    assert!(root.entries().unwrap().is_empty());
}

#[test]
fn test_write_close_remount_read() {
    init_logging();
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    {
        let root = fs.root_dir();
        let entry = root.add_file("readme.txt").unwrap();
        let mut file = entry.file().unwrap();
        file.write(b"Hello, FAT!").unwrap();
        file.close().unwrap();
    }

    let disk = fs.into_device();
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();

    // Lookups are case-insensitive in both directions
    assert!(root.entry("readme.txt").unwrap().is_some());
    let entry = root.entry("README.TXT").unwrap().unwrap();
    assert_eq!(entry.file_size(), 11);

    let mut file = entry.file().unwrap();
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).unwrap();
    assert_eq!(contents, b"Hello, FAT!");
}

#[test]
fn test_long_names_and_short_name_tails() {
    init_logging();
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    {
        let root = fs.root_dir();
        root.add_file("My Long File Name.txt").unwrap();
        root.add_file("My Long File Name 2.txt").unwrap();
    }

    let layout = fs.layout().clone();
    let disk = fs.into_device();

    // Inspect the raw root region: long entries precede their short entry
    // in descending order, checksummed against the short name
    let image = disk.as_bytes().to_vec();
    let root_offset = layout.root_dir_offset() as usize;
    let region = &image[root_offset..root_offset + layout.root_dir_bytes()];

    // Slot 0 is the volume label; slots 1-2 the first file's long run
    assert_eq!(region[0 * 32 + 11], 0x08);
    assert_eq!(region[1 * 32], 0x40 | 2);
    assert_eq!(region[1 * 32 + 11], 0x0F);
    assert_eq!(region[2 * 32], 1);
    assert_eq!(&region[3 * 32..3 * 32 + 11], b"MYLONG~1TXT");

    let checksum = short_name_checksum(b"MYLONG~1TXT");
    assert_eq!(region[1 * 32 + 13], checksum);
    assert_eq!(region[2 * 32 + 13], checksum);

    // Remount and resolve both spellings
    let fs = FileSystem::new(MemDisk::from_vec(image).unwrap()).unwrap();
    let root = fs.root_dir();
    let first = root.entry("my long file name.txt").unwrap().unwrap();
    assert_eq!(first.name(), "My Long File Name.txt");
    assert_eq!(first.short_name(), "MYLONG~1.TXT");
    let second = root.entry("My Long File Name 2.txt").unwrap().unwrap();
    assert_eq!(second.short_name(), "MYLONG~2.TXT");
}

#[test]
fn test_directory_tree_dot_entries() {
    init_logging();
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();

    let root = fs.root_dir();
    let efi = root.add_directory("EFI").unwrap();
    let efi_cluster = efi.first_cluster();
    let boot = efi.dir().unwrap().add_directory("BOOT").unwrap();
    let boot_cluster = boot.first_cluster();

    let efi_entries = efi.dir().unwrap().entries().unwrap();
    assert_eq!(efi_entries[0].name(), ".");
    assert_eq!(efi_entries[0].first_cluster(), efi_cluster);
    assert_eq!(efi_entries[1].name(), "..");
    // ".." carries cluster 0 when the parent is the fixed root
    assert_eq!(efi_entries[1].first_cluster(), 0);
    assert_eq!(efi_entries[2].name(), "BOOT");

    let boot_entries = boot.dir().unwrap().entries().unwrap();
    assert_eq!(boot_entries[0].first_cluster(), boot_cluster);
    assert_eq!(boot_entries[1].name(), "..");
    assert_eq!(boot_entries[1].first_cluster(), efi_cluster);

    // ".." resolves back to the parent directory
    let back_up = boot_entries[1].dir().unwrap();
    assert!(back_up.entry("BOOT").unwrap().is_some());
}

#[test]
fn test_attribute_toggle_persists() {
    init_logging();
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    {
        let root = fs.root_dir();
        let mut entry = root.add_file("foo").unwrap();
        entry.set_attr(Attributes::HIDDEN, true).unwrap();
    }

    let disk = fs.into_device();
    let fs = FileSystem::new(disk).unwrap();
    {
        let root = fs.root_dir();
        let mut entry = root.entry("foo").unwrap().unwrap();
        assert!(entry.attr().is_hidden());
        entry.set_attr(Attributes::HIDDEN, false).unwrap();
    }

    let disk = fs.into_device();
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();
    let entry = root.entry("foo").unwrap().unwrap();
    assert!(!entry.attr().is_hidden());
}

#[test]
fn test_unsettable_attribute_rejected() {
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();
    let mut entry = root.add_file("bar").unwrap();

    assert!(matches!(
        entry.set_attr(Attributes::DIRECTORY, true),
        Err(ffs_core::FfsError::InvalidAttr)
    ));
    assert!(matches!(
        entry.set_attr(Attributes::VOLUME_ID, true),
        Err(ffs_core::FfsError::InvalidAttr)
    ));
}

#[test]
fn test_fill_until_no_space() {
    init_logging();
    // 8 KiB image: 12 data clusters of one sector each
    let disk = format_fat12(8 * 1024);
    let fs = FileSystem::new(disk).unwrap();

    let mut blocks_written = 0u32;
    {
        let root = fs.root_dir();
        let entry = root.add_file("fill.bin").unwrap();
        let mut file = entry.file().unwrap();
        loop {
            let block = vec![blocks_written as u8; 512];
            match file.write(&block) {
                Ok(_) => blocks_written += 1,
                Err(ffs_core::FfsError::NoSpace) => break,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        file.close().unwrap();
    }
    assert!(blocks_written > 0);

    // Every data cluster is spoken for
    let info = fs.info().unwrap();
    assert_eq!(info.free_clusters, 0);

    // Remount: everything written before the failure reads back intact
    let disk = fs.into_device();
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();
    let entry = root.entry("FILL.BIN").unwrap().unwrap();
    assert_eq!(entry.file_size(), blocks_written * 512);

    let mut file = entry.file().unwrap();
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).unwrap();
    assert_eq!(contents.len(), (blocks_written * 512) as usize);
    for (i, chunk) in contents.chunks(512).enumerate() {
        assert!(chunk.iter().all(|&b| b == i as u8));
    }
}

#[test]
fn test_name_conflict_rejected() {
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();
    root.add_file("Notes.txt").unwrap();

    assert!(matches!(
        root.add_file("NOTES.TXT"),
        Err(ffs_core::FfsError::NameConflict(_))
    ));
    assert!(matches!(
        root.add_directory("notes.txt"),
        Err(ffs_core::FfsError::NameConflict(_))
    ));
}

#[test]
fn test_type_mismatch() {
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();
    let file_entry = root.add_file("data.bin").unwrap();
    let dir_entry = root.add_directory("subdir").unwrap();

    assert!(matches!(
        file_entry.dir(),
        Err(ffs_core::FfsError::TypeMismatch("directory"))
    ));
    assert!(matches!(
        dir_entry.file(),
        Err(ffs_core::FfsError::TypeMismatch("file"))
    ));
}

#[test]
fn test_seek_truncate_and_slack() {
    use std::io::SeekFrom;

    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();
    let entry = root.add_file("sparse.dat").unwrap();
    let mut file = entry.file().unwrap();

    // Seek past the end and write: the hole reads back as zeros
    file.seek(SeekFrom::Start(2000)).unwrap();
    file.write(b"tail").unwrap();
    assert_eq!(file.size(), 2004);

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).unwrap();
    assert_eq!(contents.len(), 2004);
    assert!(contents[..2000].iter().all(|&b| b == 0));
    assert_eq!(&contents[2000..], b"tail");

    // Shrink: reads stop at the new size even though clusters remain
    file.truncate(100).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut short = Vec::new();
    file.read_to_end(&mut short).unwrap();
    assert_eq!(short.len(), 100);
    file.close().unwrap();

    let remounted = root.entry("SPARSE.DAT").unwrap().unwrap();
    assert_eq!(remounted.file_size(), 100);
}

#[test]
fn test_truncate_to_zero_keeps_head_cluster() {
    let disk = format_fat12(8 * 1024);
    let fs = FileSystem::new(disk).unwrap();
    let root = fs.root_dir();
    let entry = root.add_file("shrink.bin").unwrap();

    let free_before = fs.info().unwrap().free_clusters;
    let mut file = entry.file().unwrap();
    file.write(&[0x5A; 2048]).unwrap();
    file.truncate(0).unwrap();
    file.close().unwrap();

    // The eager head cluster stays allocated; the extension is returned
    assert_eq!(fs.info().unwrap().free_clusters, free_before);
    let entry = root.entry("shrink.bin").unwrap().unwrap();
    assert_eq!(entry.file_size(), 0);
}

#[test]
fn test_volume_info_serializes() {
    let disk = format_fat12(FLOPPY_144M);
    let fs = FileSystem::new(disk).unwrap();
    let info = fs.info().unwrap();

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["oem_name"], "FFS");
    assert_eq!(json["fat_type"], "Fat12");
    assert_eq!(json["total_sectors"], 2880);
}

#[test]
fn test_fat16_and_fat32_round_trip() {
    init_logging();
    for (fat_type, size) in [
        (FatType::Fat16, 64 * 1024 * 1024),
        (FatType::Fat32, 512 * 1024 * 1024),
    ] {
        let mut disk = MemDisk::new(size).unwrap();
        format_super_floppy(
            &mut disk,
            &SuperFloppyConfig {
                fat_type,
                label: "BIGVOL".to_string(),
                oem_name: "FFS".to_string(),
            },
        )
        .unwrap();

        let fs = FileSystem::new(disk).unwrap();
        assert_eq!(fs.fat_type(), fat_type);
        {
            let root = fs.root_dir();
            let dir = root.add_directory("nested").unwrap();
            let entry = dir.dir().unwrap().add_file("payload.bin").unwrap();
            let mut file = entry.file().unwrap();
            file.write(&[0xA5; 10_000]).unwrap();
            file.close().unwrap();
        }

        let disk = fs.into_device();
        let fs = FileSystem::new(disk).unwrap();
        assert_eq!(fs.volume_label().unwrap(), "BIGVOL");
        let root = fs.root_dir();
        let dir = root.entry("NESTED").unwrap().unwrap();
        let entry = dir.dir().unwrap().entry("payload.bin").unwrap().unwrap();
        assert_eq!(entry.file_size(), 10_000);

        let mut file = entry.file().unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).unwrap();
        assert!(contents.iter().all(|&b| b == 0xA5));
    }
}
