// Image-layer round trips over temporary files: create, import, scan,
// attribute handling, and wholesale rewriting.

use std::fs;
use std::path::PathBuf;

use ffs_image::{rewrite_image, Attributes, FatType, FfsError, Image};
use tempfile::TempDir;

const FLOPPY_144M: u64 = 1_474_560;

fn image_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn create_floppy(dir: &TempDir, name: &str) -> Image {
    Image::create(
        image_path(dir, name),
        "TESTVOL",
        "FFS",
        FatType::Fat12,
        FLOPPY_144M,
    )
    .unwrap()
}

#[test]
fn test_create_and_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = image_path(&tmp, "boot.img");
    {
        let image = create_floppy(&tmp, "boot.img");
        assert_eq!(image.fat_type(), FatType::Fat12);
        image.close().unwrap();
    }

    let image = Image::open(&path).unwrap();
    assert_eq!(image.volume_label().unwrap(), "TESTVOL");
    assert_eq!(image.oem_name(), "FFS");

    let info = image.info().unwrap();
    assert_eq!(info.total_sectors, 2880);

    let json = serde_json::to_string(&info).unwrap();
    assert!(json.contains("\"volume_label\":\"TESTVOL\""));
}

#[test]
fn test_size_rounds_up_to_kib() {
    let tmp = TempDir::new().unwrap();
    let path = image_path(&tmp, "odd.img");
    let image = Image::create(&path, "ODD", "FFS", FatType::Fat12, 100_000).unwrap();
    image.close().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 100_352);
}

#[test]
fn test_add_and_read_host_file() {
    let tmp = TempDir::new().unwrap();
    let host_file = tmp.path().join("startup.nsh");
    fs::write(&host_file, b"echo hello from the image\n").unwrap();

    let image = create_floppy(&tmp, "shell.img");
    let copied = image.add_file("startup.nsh", &host_file).unwrap();
    assert_eq!(copied, 26);

    let contents = image.read_file("STARTUP.NSH").unwrap();
    assert_eq!(contents, b"echo hello from the image\n");

    assert!(matches!(
        image.read_file("missing.txt"),
        Err(FfsError::NotFound(_))
    ));
}

#[test]
fn test_mkdir_and_nested_paths() {
    let tmp = TempDir::new().unwrap();
    let image = create_floppy(&tmp, "efi.img");

    image.mkdir("EFI").unwrap();
    image.mkdir("EFI/BOOT").unwrap();
    assert!(image.is_dir("EFI/BOOT").unwrap());
    assert!(!image.is_dir("EFI/MISSING").unwrap());

    // Creating an existing directory is refused
    assert!(matches!(
        image.mkdir("EFI"),
        Err(FfsError::NameConflict(_))
    ));

    image.write_file("EFI/BOOT/BOOTX64.EFI", &[0x4D, 0x5A, 0x90, 0x00]).unwrap();
    assert_eq!(
        image.read_file("EFI/BOOT/BOOTX64.EFI").unwrap(),
        vec![0x4D, 0x5A, 0x90, 0x00]
    );
}

#[test]
fn test_import_host_tree_and_scan() {
    let tmp = TempDir::new().unwrap();
    let host_root = tmp.path().join("tree");
    fs::create_dir_all(host_root.join("docs/notes")).unwrap();
    fs::write(host_root.join("top.txt"), b"top").unwrap();
    fs::write(host_root.join("docs/a.txt"), b"aaa").unwrap();
    fs::write(host_root.join("docs/notes/b.txt"), b"bbbb").unwrap();

    let image = create_floppy(&tmp, "tree.img");
    image.import(&host_root).unwrap();

    let records = image.scan_files();
    let records = records.unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec![
        "docs",
        "docs/a.txt",
        "docs/notes",
        "docs/notes/b.txt",
        "top.txt",
    ]);
    assert!(records[0].is_dir);
    assert_eq!(records[3].short_name, "B.TXT");

    assert_eq!(image.read_file("docs/notes/b.txt").unwrap(), b"bbbb");
}

#[test]
fn test_attrs_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = image_path(&tmp, "attr.img");
    {
        let image = create_floppy(&tmp, "attr.img");
        image.write_file("io.sys", b"system file").unwrap();
        image.set_attr("io.sys", Attributes::SYSTEM, true).unwrap();
        image.set_attr("io.sys", Attributes::HIDDEN, true).unwrap();
        image.close().unwrap();
    }

    let image = Image::open(&path).unwrap();
    let attr = image.attrs("IO.SYS").unwrap();
    assert!(attr.is_system());
    assert!(attr.is_hidden());
    assert!(!attr.is_read_only());

    assert!(matches!(
        image.set_attr("io.sys", Attributes::DIRECTORY, true),
        Err(FfsError::InvalidAttr)
    ));
}

#[test]
fn test_rewrite_replicates_and_adds() {
    let tmp = TempDir::new().unwrap();
    let src_path = image_path(&tmp, "src.img");
    let dst_path = image_path(&tmp, "dst.img");

    {
        let src = create_floppy(&tmp, "src.img");
        src.mkdir("EFI").unwrap();
        src.write_file("EFI/shell.efi", &[0xAB; 4096]).unwrap();
        src.write_file("kernel.sys", b"kernel payload").unwrap();
        src.set_attr("kernel.sys", Attributes::SYSTEM, true).unwrap();
        src.set_attr("kernel.sys", Attributes::READ_ONLY, true).unwrap();
        src.close().unwrap();
    }

    let extra_base = tmp.path().join("extra");
    fs::create_dir_all(extra_base.join("cfg")).unwrap();
    fs::write(extra_base.join("cfg/boot.cfg"), b"timeout=5\n").unwrap();

    rewrite_image(
        &dst_path,
        &src_path,
        &extra_base,
        &[extra_base.join("cfg/boot.cfg")],
    )
    .unwrap();

    let dst = Image::open(&dst_path).unwrap();
    assert_eq!(dst.volume_label().unwrap(), "TESTVOL");
    assert_eq!(dst.fat_type(), FatType::Fat12);

    assert_eq!(dst.read_file("EFI/shell.efi").unwrap(), vec![0xAB; 4096]);
    assert_eq!(dst.read_file("kernel.sys").unwrap(), b"kernel payload");

    let attr = dst.attrs("kernel.sys").unwrap();
    assert!(attr.is_system());
    assert!(attr.is_read_only());

    // The extra file lands at its path relative to the base directory
    assert_eq!(dst.read_file("cfg/boot.cfg").unwrap(), b"timeout=5\n");
}
