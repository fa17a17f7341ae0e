// 8.3 short-name handling: generation from long names with numeric-tail
// uniquification, packing to the 11-byte on-disk form, and the checksum
// that pairs long-name slots with their short entry.

use ffs_core::FfsError;

/// Check if a byte is valid in an 8.3 filename.
fn is_short_char(b: u8) -> bool {
    matches!(b,
        b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'%' | b'&' |
        b'\'' | b'(' | b')' | b'-' | b'@' | b'^' | b'_' | b'`' |
        b'{' | b'}' | b'~')
}

/// Uppercase, drop spaces, and substitute every other disallowed
/// character (embedded dots included) with '_'.
fn clean_short_fragment(s: &str) -> String {
    s.to_uppercase()
        .chars()
        .filter(|&c| c != ' ')
        .map(|c| {
            if c.is_ascii() && is_short_char(c as u8) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive an 8.3 name (rendered as `STEM.EXT`) for `long_name`, unique
/// among `used` (compared case-insensitively against full 8.3 forms).
///
/// The last dot splits stem from extension; the extension truncates to
/// three characters. A stem that fits eight characters is used as-is when
/// free, otherwise a numeric tail `~1`..`~999999` is appended, shortening
/// the stem to keep eight characters total. An exhausted tail space is
/// `NoSpace`; a name with nothing encodable is `InvalidName`.
pub fn generate_short_name(long_name: &str, used: &[String]) -> Result<String, FfsError> {
    let trimmed = long_name.trim();
    if trimmed.is_empty() {
        return Err(FfsError::InvalidName(long_name.to_string()));
    }

    let (stem_src, ext_src) = match trimmed.rfind('.') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => (trimmed, ""),
    };

    let mut stem = clean_short_fragment(stem_src);
    let mut ext = clean_short_fragment(ext_src);

    if stem.is_empty() {
        // Dotfile-style names: promote the extension to the stem
        if ext.is_empty() {
            return Err(FfsError::InvalidName(long_name.to_string()));
        }
        stem = std::mem::take(&mut ext);
    }
    ext.truncate(3);

    let render = |stem: &str, ext: &str| {
        if ext.is_empty() {
            stem.to_string()
        } else {
            format!("{}.{}", stem, ext)
        }
    };
    let in_use = |name: &str| used.iter().any(|u| u.eq_ignore_ascii_case(name));

    if stem.len() <= 8 {
        let candidate = render(&stem, &ext);
        if !in_use(&candidate) {
            return Ok(candidate);
        }
    }

    for n in 1..=999_999u32 {
        let tail = format!("~{}", n);
        let prefix: String = stem.chars().take(8 - tail.len()).collect();
        let candidate = render(&format!("{}{}", prefix, tail), &ext);
        if !in_use(&candidate) {
            return Ok(candidate);
        }
    }

    Err(FfsError::NoSpace)
}

/// Pack a rendered 8.3 name into the 11-byte space-padded on-disk form.
/// A leading 0xE5 byte is escaped to 0x05 per the FAT deleted-entry rule.
pub fn pack_short_name(name: &str) -> Result<[u8; 11], FfsError> {
    let (stem, ext) = match name.rfind('.') {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => (name, ""),
    };
    if stem.is_empty() || stem.len() > 8 || ext.len() > 3 {
        return Err(FfsError::InvalidName(name.to_string()));
    }

    let mut out = [0x20u8; 11];
    for (i, b) in stem.bytes().enumerate() {
        if !is_short_char(b) {
            return Err(FfsError::InvalidName(name.to_string()));
        }
        out[i] = b;
    }
    for (i, b) in ext.bytes().enumerate() {
        if !is_short_char(b) {
            return Err(FfsError::InvalidName(name.to_string()));
        }
        out[8 + i] = b;
    }
    if out[0] == 0xE5 {
        out[0] = 0x05;
    }
    Ok(out)
}

/// Render the 11-byte on-disk form back to `STEM.EXT`.
pub fn unpack_short_name(raw: &[u8; 11]) -> String {
    let mut name = String::new();

    for (i, &b) in raw[..8].iter().enumerate() {
        if b == 0x20 || b == 0x00 {
            break;
        }
        if i == 0 && b == 0x05 {
            name.push(0xE5 as char);
        } else {
            name.push(b as char);
        }
    }

    let mut has_ext = false;
    for &b in &raw[8..11] {
        if b == 0x20 || b == 0x00 {
            continue;
        }
        if !has_ext {
            name.push('.');
            has_ext = true;
        }
        name.push(b as char);
    }

    name
}

/// Rotate-right checksum over the 11 short-name bytes, stored in every
/// paired long-name slot.
pub fn short_name_checksum(short: &[u8; 11]) -> u8 {
    let mut sum = 0u8;
    for &b in short {
        sum = ((sum >> 1) | (sum << 7)).wrapping_add(b);
    }
    sum
}
