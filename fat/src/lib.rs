// FAT12/16/32 filesystem engine for super-floppy images: boot sector
// codec, FAT cluster allocator, directory clusters with 8.3 + VFAT
// long-name entries, cluster-chain file I/O, and a formatter.

pub mod boot_sector;
pub mod chain;
pub mod dir_cluster;
pub mod directory;
pub mod file;
pub mod filesystem;
pub mod formatter;
pub mod names;
pub mod table;
pub mod timestamps;

pub use boot_sector::{BootSector, ExtBpb16, ExtBpb32, ExtendedBpb, FatType, Layout};
pub use chain::ClusterChain;
pub use dir_cluster::{DirLocation, DirectoryCluster};
pub use directory::{Dir, DirEntry};
pub use file::File;
pub use filesystem::{FileSystem, VolumeInfo};
pub use formatter::{format_super_floppy, SuperFloppyConfig};
pub use table::{Fat, FatEntry};

pub use ffs_core::{Attributes, BlockDevice, FfsError, FileDisk, MemDisk};
