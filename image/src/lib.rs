// Host-side convenience layer over the FAT engine: create or open image
// files, move files in and out, and rebuild images wholesale.

pub mod image;
pub mod rewrite;

pub use image::{FileRecord, Image};
pub use rewrite::rewrite_image;

pub use ffs_core::{Attributes, FfsError};
pub use ffs_fat::FatType;
