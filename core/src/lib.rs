pub mod attr;
pub mod device;
pub mod error;

pub use attr::Attributes;
pub use device::{BlockDevice, FileDisk, MemDisk, DEFAULT_SECTOR_SIZE};
pub use error::FfsError;
