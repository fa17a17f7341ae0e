// FAT directory entry attribute bits, shared by the engine and the image
// layer.

use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Attribute bitfield of a 32-byte directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes(u8);

impl Attributes {
    pub const READ_ONLY: Attributes = Attributes(0x01);
    pub const HIDDEN: Attributes = Attributes(0x02);
    pub const SYSTEM: Attributes = Attributes(0x04);
    pub const VOLUME_ID: Attributes = Attributes(0x08);
    pub const DIRECTORY: Attributes = Attributes(0x10);
    pub const ARCHIVE: Attributes = Attributes(0x20);

    /// All four low bits set marks a VFAT long-name slot.
    pub const LONG_NAME: Attributes = Attributes(0x0F);

    const LONG_NAME_MASK: u8 = 0x3F;

    pub const fn from_bits(bits: u8) -> Attributes {
        Attributes(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Attributes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Attributes) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Attributes) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Attributes, state: bool) {
        if state {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    pub const fn is_read_only(self) -> bool {
        self.contains(Self::READ_ONLY)
    }

    pub const fn is_hidden(self) -> bool {
        self.contains(Self::HIDDEN)
    }

    pub const fn is_system(self) -> bool {
        self.contains(Self::SYSTEM)
    }

    pub const fn is_volume_id(self) -> bool {
        self.contains(Self::VOLUME_ID)
    }

    pub const fn is_directory(self) -> bool {
        self.contains(Self::DIRECTORY)
    }

    pub const fn is_archive(self) -> bool {
        self.contains(Self::ARCHIVE)
    }

    pub const fn is_long_name(self) -> bool {
        self.0 & Self::LONG_NAME_MASK == Self::LONG_NAME.0
    }

    /// True for the attribute bits a caller may toggle on an entry:
    /// ReadOnly, Hidden and System (alone or combined).
    pub const fn is_settable(self) -> bool {
        self.0 != 0 && self.0 & !(0x01 | 0x02 | 0x04) == 0
    }
}

impl BitOr for Attributes {
    type Output = Attributes;

    fn bitor(self, rhs: Attributes) -> Attributes {
        Attributes(self.0 | rhs.0)
    }
}

impl BitAnd for Attributes {
    type Output = Attributes;

    fn bitand(self, rhs: Attributes) -> Attributes {
        Attributes(self.0 & rhs.0)
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (Self::READ_ONLY, 'R'),
            (Self::HIDDEN, 'H'),
            (Self::SYSTEM, 'S'),
            (Self::VOLUME_ID, 'V'),
            (Self::DIRECTORY, 'D'),
            (Self::ARCHIVE, 'A'),
        ];
        for (flag, ch) in flags {
            if self.contains(flag) {
                write!(f, "{}", ch)?;
            } else {
                write!(f, "-")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_name_marker() {
        assert!(Attributes::from_bits(0x0F).is_long_name());
        // The archive bit does not disturb the marker check
        assert!(!Attributes::from_bits(0x10).is_long_name());
        assert!(!Attributes::DIRECTORY.is_long_name());
    }

    #[test]
    fn test_settable_bits() {
        assert!(Attributes::HIDDEN.is_settable());
        assert!((Attributes::HIDDEN | Attributes::SYSTEM).is_settable());
        assert!(!Attributes::DIRECTORY.is_settable());
        assert!(!Attributes::VOLUME_ID.is_settable());
        assert!(!Attributes::from_bits(0).is_settable());
    }

    #[test]
    fn test_set_and_clear() {
        let mut attr = Attributes::ARCHIVE;
        attr.set(Attributes::HIDDEN, true);
        assert!(attr.is_hidden());
        attr.set(Attributes::HIDDEN, false);
        assert!(!attr.is_hidden());
        assert!(attr.is_archive());
    }

    #[test]
    fn test_display() {
        let attr = Attributes::READ_ONLY | Attributes::DIRECTORY;
        assert_eq!(attr.to_string(), "R---D-");
    }
}
