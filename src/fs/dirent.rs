//! 32-byte directory slot codec: 8.3 short entries, VFAT long-name chains,
//! and the slot bookkeeping a directory cluster needs.
//!
//! Slot policy shared by listing and allocation: a first byte of 0x00 ends
//! the directory, 0xE5 marks a deleted slot. Deleted slots are skipped when
//! listing and count as free when reserving room for new entries.

use byteorder::{ByteOrder, LittleEndian};

use super::entry::FileEntry;
use crate::error::{FatError, Result};

pub const DIR_ENTRY_SIZE: usize = 32;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

pub const END_OF_DIRECTORY: u8 = 0x00;
pub const DELETED_ENTRY: u8 = 0xE5;

const LAST_LONG_ENTRY: u8 = 0x40;
const LONG_ORDINAL_MASK: u8 = 0x1F;
const LONG_NAME_PADDING: u16 = 0xFFFF;

/// UTF-16 code units carried by one long-name slot.
pub const LFN_UNITS_PER_ENTRY: usize = 13;
pub const MAX_LONG_NAME_UNITS: usize = 255;
const MAX_LONG_ENTRIES: usize = MAX_LONG_NAME_UNITS.div_ceil(LFN_UNITS_PER_ENTRY);

/// Byte offsets of the 13 name units inside a long-name slot (5 + 6 + 2).
const LFN_UNIT_OFFSETS: [usize; LFN_UNITS_PER_ENTRY] =
    [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

/// Characters legal in an 8.3 name besides ASCII letters and digits.
const SHORT_NAME_SPECIALS: &[u8] = b"$%'-_@~`!(){}^#&";

/// On-disk 8.3 name: 8 name bytes and 3 extension bytes, space padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortName([u8; 11]);

impl ShortName {
    pub const DOT: ShortName = ShortName(*b".          ");
    pub const DOTDOT: ShortName = ShortName(*b"..         ");

    /// Pad or truncate `name` to 8 bytes and `ext` to 3. Case is kept.
    pub fn from_parts(name: &[u8], ext: &[u8]) -> Self {
        let mut bytes = [b' '; 11];
        for (slot, &b) in bytes[..8].iter_mut().zip(name) {
            *slot = b;
        }
        for (slot, &b) in bytes[8..].iter_mut().zip(ext) {
            *slot = b;
        }
        Self(bytes)
    }

    /// Short-only form of a name that [`needs_long_name`] accepts as-is.
    pub fn from_plain(name: &str) -> Self {
        Self::from_parts(name.as_bytes(), b"")
    }

    /// Numeric-tail alias (`BASISN~1.EXT`) for a name stored as a long-name
    /// chain, unique among `existing`.
    pub fn alias(name: &str, existing: &[ShortName]) -> Result<Self> {
        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => (&name[..dot], &name[dot + 1..]),
            _ => (name, ""),
        };
        let mut basis = sanitize_short_part(stem);
        if basis.is_empty() {
            basis.push(b'_');
        }
        basis.truncate(6);
        let mut ext = sanitize_short_part(ext);
        ext.truncate(3);

        for tail in 1..=9u8 {
            let mut candidate = basis.clone();
            candidate.extend_from_slice(&[b'~', b'0' + tail]);
            let short = Self::from_parts(&candidate, &ext);
            if !existing.contains(&short) {
                return Ok(short);
            }
        }
        Err(FatError::UnsupportedName(format!(
            "no free short-name alias for {name:?}"
        )))
    }

    pub fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }

    pub fn checksum(&self) -> u8 {
        compute_checksum(&self.0)
    }

    /// `NAME.EXT` with padding removed; the dot only appears when there is an
    /// extension.
    pub fn display(&self) -> String {
        let name = trim_padding(&self.0[..8]);
        let ext = trim_padding(&self.0[8..]);
        if ext.is_empty() {
            String::from_utf8_lossy(name).into_owned()
        } else {
            format!(
                "{}.{}",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(ext)
            )
        }
    }
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ')
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}

fn is_short_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || SHORT_NAME_SPECIALS.contains(&b)
}

fn sanitize_short_part(part: &str) -> Vec<u8> {
    part.chars()
        .filter(|&c| c != ' ' && c != '.')
        .map(|c| {
            if c.is_ascii() && is_short_name_byte(c as u8) {
                c as u8
            } else {
                b'_'
            }
        })
        .collect()
}

/// VFAT checksum of an 11-byte short name, stored in every long-name slot
/// of the chain that belongs to it.
pub fn compute_checksum(short_name: &[u8; 11]) -> u8 {
    short_name
        .iter()
        .fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

/// Reject names no directory entry can carry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FatError::UnsupportedName("empty name".into()));
    }
    if name == "." || name == ".." {
        return Err(FatError::UnsupportedName(format!("{name:?} is reserved")));
    }
    if name.contains(['/', '\0']) {
        return Err(FatError::UnsupportedName(format!(
            "{name:?} contains '/' or NUL"
        )));
    }
    let units = name.encode_utf16().count();
    if units > MAX_LONG_NAME_UNITS {
        return Err(FatError::UnsupportedName(format!(
            "name is {units} UTF-16 units, limit is {MAX_LONG_NAME_UNITS}"
        )));
    }
    Ok(())
}

/// True unless `name` fits a bare 8-byte short entry: at most 8 bytes, no
/// extension, only 8.3-legal characters (spaces allowed after the first byte,
/// but not trailing).
pub fn needs_long_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let fits = !bytes.is_empty()
        && bytes.len() <= 8
        && bytes[0] != b' '
        && bytes[bytes.len() - 1] != b' '
        && bytes.iter().all(|&b| b == b' ' || is_short_name_byte(b));
    !fits
}

/// Directory slots one entry for `name` occupies: the long-name chain, if
/// any, plus the short entry.
pub fn slots_for_name(name: &str) -> usize {
    if needs_long_name(name) {
        name.encode_utf16().count().div_ceil(LFN_UNITS_PER_ENTRY).max(1) + 1
    } else {
        1
    }
}

/// Encode one short (8.3) slot.
pub fn encode_short_entry(
    short: &ShortName,
    attributes: u8,
    first_cluster: u32,
    size: u32,
) -> [u8; DIR_ENTRY_SIZE] {
    let mut entry = [0u8; DIR_ENTRY_SIZE];
    entry[0..11].copy_from_slice(short.as_bytes());
    entry[11] = attributes;
    LittleEndian::write_u16(&mut entry[20..22], (first_cluster >> 16) as u16);
    LittleEndian::write_u16(&mut entry[26..28], (first_cluster & 0xFFFF) as u16);
    LittleEndian::write_u32(&mut entry[28..32], size);
    entry
}

/// Encode the long-name chain for `name_utf16` in on-disk order: the slot
/// with the highest ordinal (flagged 0x40) first, ordinal 1 last. Unused
/// units of the final chunk are 0xFFFF.
pub fn encode_long_entries(name_utf16: &[u16], checksum: u8) -> Vec<[u8; DIR_ENTRY_SIZE]> {
    let entries_needed = name_utf16.len().div_ceil(LFN_UNITS_PER_ENTRY).max(1);

    (1..=entries_needed)
        .rev()
        .map(|ordinal| {
            let mut entry = [0u8; DIR_ENTRY_SIZE];
            entry[0] = ordinal as u8;
            if ordinal == entries_needed {
                entry[0] |= LAST_LONG_ENTRY;
            }
            entry[11] = ATTR_LONG_NAME;
            entry[13] = checksum;

            let start = (ordinal - 1) * LFN_UNITS_PER_ENTRY;
            for (i, &off) in LFN_UNIT_OFFSETS.iter().enumerate() {
                let unit = name_utf16
                    .get(start + i)
                    .copied()
                    .unwrap_or(LONG_NAME_PADDING);
                LittleEndian::write_u16(&mut entry[off..off + 2], unit);
            }
            entry
        })
        .collect()
}

/// All slots for one entry: the long-name chain (when the name needs one)
/// followed by the short entry.
///
/// `short` must be `ShortName::from_plain(name)` when `name` needs no long
/// chain, and an alias otherwise; the slot count always equals
/// [`slots_for_name`].
pub fn encode_entry_set(
    name: &str,
    short: &ShortName,
    attributes: u8,
    first_cluster: u32,
    size: u32,
) -> Vec<[u8; DIR_ENTRY_SIZE]> {
    debug_assert!(
        needs_long_name(name) || *short == ShortName::from_plain(name),
        "short-only name {name:?} paired with a different short name {:?}",
        short.display()
    );
    let mut slots = if needs_long_name(name) {
        let units: Vec<u16> = name.encode_utf16().collect();
        encode_long_entries(&units, short.checksum())
    } else {
        Vec::new()
    };
    slots.push(encode_short_entry(short, attributes, first_cluster, size));
    slots
}

/// Reconstruct the entries of one directory cluster, in slot order.
///
/// Long-name fragments are placed by ordinal into an accumulation buffer and
/// attached to the next short entry; "." and ".." are reported like any
/// other directory.
pub fn decode_directory(data: &[u8]) -> Vec<FileEntry> {
    let mut entries = Vec::new();
    let mut long_name: Vec<u16> = Vec::new();

    for slot in data.chunks_exact(DIR_ENTRY_SIZE) {
        match slot[0] {
            END_OF_DIRECTORY => break,
            DELETED_ENTRY => {
                long_name.clear();
                continue;
            }
            _ => {}
        }

        let attr = slot[11];
        if attr == ATTR_LONG_NAME {
            let ordinal = (slot[0] & LONG_ORDINAL_MASK) as usize;
            if ordinal == 0 || ordinal > MAX_LONG_ENTRIES {
                continue;
            }
            // First slot of a new chain; drop fragments of any orphaned one.
            if slot[0] & LAST_LONG_ENTRY != 0 {
                long_name.clear();
            }
            let start = (ordinal - 1) * LFN_UNITS_PER_ENTRY;
            if long_name.len() < start + LFN_UNITS_PER_ENTRY {
                long_name.resize(start + LFN_UNITS_PER_ENTRY, 0);
            }
            for (i, &off) in LFN_UNIT_OFFSETS.iter().enumerate() {
                long_name[start + i] = LittleEndian::read_u16(&slot[off..off + 2]);
            }
            continue;
        }

        // Volume label
        if attr & ATTR_VOLUME_ID != 0 {
            long_name.clear();
            continue;
        }

        let short = short_name_at(slot);
        let name = match decode_long_name(&long_name) {
            Some(name) => name,
            None => short.display(),
        };
        long_name.clear();

        let first_cluster = slot_cluster(slot);
        let size = LittleEndian::read_u32(&slot[28..32]);
        entries.push(if attr & ATTR_DIRECTORY != 0 {
            FileEntry::new_directory(name, first_cluster)
        } else {
            FileEntry::new_file(name, size, first_cluster)
        });
    }

    entries
}

fn decode_long_name(units: &[u16]) -> Option<String> {
    let end = units
        .iter()
        .position(|&u| u == 0x0000 || u == LONG_NAME_PADDING)
        .unwrap_or(units.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&units[..end]))
}

fn short_name_at(slot: &[u8]) -> ShortName {
    let mut bytes = [0u8; 11];
    bytes.copy_from_slice(&slot[0..11]);
    ShortName(bytes)
}

fn slot_cluster(slot: &[u8]) -> u32 {
    let hi = LittleEndian::read_u16(&slot[20..22]) as u32;
    let lo = LittleEndian::read_u16(&slot[26..28]) as u32;
    (hi << 16) | lo
}

/// Short names of every live short entry, for alias collision checks.
pub fn short_names(data: &[u8]) -> Vec<ShortName> {
    data.chunks_exact(DIR_ENTRY_SIZE)
        .take_while(|slot| slot[0] != END_OF_DIRECTORY)
        .filter(|slot| slot[0] != DELETED_ENTRY && slot[11] != ATTR_LONG_NAME)
        .map(short_name_at)
        .collect()
}

/// Byte offset of the first run of `count` contiguous free slots.
///
/// Everything from the end-of-directory marker onward counts as free. When
/// the run reaches past the marker, those trailing slots are zeroed so the
/// directory stays terminated after the new entries.
pub fn reserve_slots(data: &mut [u8], count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let total = data.len() / DIR_ENTRY_SIZE;
    let mut run_start = 0;
    let mut run_len = 0;

    for index in 0..total {
        let first = data[index * DIR_ENTRY_SIZE];
        if first == END_OF_DIRECTORY {
            let start = if run_len > 0 { run_start } else { index };
            if total - start < count {
                return None;
            }
            data[index * DIR_ENTRY_SIZE..total * DIR_ENTRY_SIZE].fill(0);
            return Some(start * DIR_ENTRY_SIZE);
        }
        if first == DELETED_ENTRY {
            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;
            if run_len == count {
                return Some(run_start * DIR_ENTRY_SIZE);
            }
        } else {
            run_len = 0;
        }
    }
    None
}

/// A fresh directory cluster holding only "." and "..".
pub fn init_directory_cluster(cluster_size: usize, self_cluster: u32, parent_cluster: u32) -> Vec<u8> {
    let mut data = vec![0u8; cluster_size];
    data[..DIR_ENTRY_SIZE].copy_from_slice(&encode_short_entry(
        &ShortName::DOT,
        ATTR_DIRECTORY,
        self_cluster,
        0,
    ));
    data[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE].copy_from_slice(&encode_short_entry(
        &ShortName::DOTDOT,
        ATTR_DIRECTORY,
        parent_cluster,
        0,
    ));
    data
}

/// Parent cluster recorded in the ".." slot (the second slot) of a
/// directory cluster.
pub fn parent_cluster(data: &[u8]) -> Option<u32> {
    let slot = data.get(DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE)?;
    if short_name_at(slot) != ShortName::DOTDOT || slot[11] & ATTR_DIRECTORY == 0 {
        return None;
    }
    Some(slot_cluster(slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory_with(slots: &[[u8; DIR_ENTRY_SIZE]]) -> Vec<u8> {
        let mut data = vec![0u8; 4096];
        for (i, slot) in slots.iter().enumerate() {
            data[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE].copy_from_slice(slot);
        }
        data
    }

    fn name_of_len(len: usize) -> String {
        "abcdefghijklmnopqrstuvwxyz0123456789"
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn test_checksum_vectors() {
        assert_eq!(compute_checksum(&[0u8; 11]), 0x00);
        assert_eq!(compute_checksum(&[0xFFu8; 11]), 0xFE);
        assert_eq!(compute_checksum(b"README  TXT"), 0x73);
    }

    #[test]
    fn test_short_name_display() {
        assert_eq!(ShortName::from_parts(b"KERNEL", b"SYS").display(), "KERNEL.SYS");
        assert_eq!(ShortName::from_parts(b"README", b"TXT").display(), "README.TXT");
        assert_eq!(ShortName::from_plain("BOOTMGR").display(), "BOOTMGR");
        assert_eq!(ShortName::from_plain("docs").display(), "docs");
        assert_eq!(ShortName::DOT.display(), ".");
        assert_eq!(ShortName::DOTDOT.display(), "..");
    }

    #[test]
    fn test_short_name_truncates() {
        let short = ShortName::from_parts(b"VERYLONGNAME", b"TEXT");
        assert_eq!(short.as_bytes(), b"VERYLONGTEX");
    }

    #[test]
    fn test_needs_long_name() {
        assert!(!needs_long_name("sub"));
        assert!(!needs_long_name("ABCDEFGH"));
        assert!(!needs_long_name("my dir"));
        assert!(needs_long_name("ABCDEFGHI"));
        assert!(needs_long_name("a.txt"));
        assert!(needs_long_name("héllo"));
        assert!(needs_long_name("a+b"));
        assert!(needs_long_name(" lead"));
    }

    #[test]
    fn test_slots_for_name() {
        assert_eq!(slots_for_name("docs"), 1);
        assert_eq!(slots_for_name("a.txt"), 2);
        assert_eq!(slots_for_name(&name_of_len(13)), 2);
        assert_eq!(slots_for_name(&name_of_len(14)), 3);
        assert_eq!(slots_for_name(&name_of_len(255)), 21);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("notes.txt").is_ok());
        for bad in ["", ".", "..", "a/b", "nul\0"] {
            assert!(
                matches!(validate_name(bad), Err(FatError::UnsupportedName(_))),
                "{bad:?} accepted"
            );
        }
        assert!(validate_name(&name_of_len(255)).is_ok());
        assert!(validate_name(&name_of_len(256)).is_err());
    }

    #[test]
    fn test_alias_numeric_tail() {
        let first = ShortName::alias("longname.txt", &[]).unwrap();
        assert_eq!(first.as_bytes(), b"longna~1txt");
        let second = ShortName::alias("longnamer.txt", &[first]).unwrap();
        assert_eq!(second.as_bytes(), b"longna~2txt");
        let odd = ShortName::alias("ünï code.markdown", &[]).unwrap();
        assert_eq!(odd.as_bytes(), b"_n_cod~1mar");
        let dotfile = ShortName::alias(".profile", &[]).unwrap();
        assert_eq!(dotfile.as_bytes(), b"profil~1   ");
    }

    #[test]
    fn test_alias_exhausted() {
        let taken: Vec<ShortName> = (1..=9)
            .map(|n| ShortName::from_parts(format!("report~{n}").as_bytes(), b"pdf"))
            .collect();
        assert!(matches!(
            ShortName::alias("report-final.pdf", &taken),
            Err(FatError::UnsupportedName(_))
        ));
    }

    #[test]
    fn test_encode_short_entry_layout() {
        let short = ShortName::from_parts(b"README", b"TXT");
        let entry = encode_short_entry(&short, ATTR_ARCHIVE, 0x0012_3456, 8192);
        assert_eq!(&entry[0..11], b"README  TXT");
        assert_eq!(entry[11], 0x20);
        assert_eq!(&entry[20..22], &[0x12, 0x00]);
        assert_eq!(&entry[26..28], &[0x56, 0x34]);
        assert_eq!(&entry[28..32], &8192u32.to_le_bytes());
    }

    #[test]
    fn test_encode_long_entries_order_and_padding() {
        let units: Vec<u16> = name_of_len(14).encode_utf16().collect();
        let entries = encode_long_entries(&units, 0xAB);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0][0], 0x42);
        assert_eq!(entries[1][0], 0x01);
        for entry in &entries {
            assert_eq!(entry[11], ATTR_LONG_NAME);
            assert_eq!(entry[13], 0xAB);
            assert_eq!(&entry[26..28], &[0, 0]);
        }
        // Second chunk carries one unit ('n') then 12 units of padding.
        assert_eq!(&entries[0][1..3], &[b'n', 0]);
        assert_eq!(&entries[0][3..5], &[0xFF, 0xFF]);
        assert_eq!(&entries[0][30..32], &[0xFF, 0xFF]);
        // First chunk is full: 'a' at unit 0, 'm' at unit 12.
        assert_eq!(&entries[1][1..3], &[b'a', 0]);
        assert_eq!(&entries[1][30..32], &[b'm', 0]);
    }

    #[test]
    fn test_long_name_chain_boundaries() {
        for len in [1, 13, 14, 26] {
            let name = name_of_len(len);
            let short = ShortName::alias(&name, &[]).unwrap();
            let units: Vec<u16> = name.encode_utf16().collect();
            let mut slots = encode_long_entries(&units, short.checksum());
            assert_eq!(slots.len(), len.div_ceil(13));
            slots.push(encode_short_entry(&short, ATTR_ARCHIVE, 5, 0));

            let entries = decode_directory(&directory_with(&slots));
            assert_eq!(entries.len(), 1, "length {len}");
            assert_eq!(entries[0].name, name, "length {len}");
            assert_eq!(entries[0].first_cluster, 5);
        }
    }

    #[test]
    fn test_long_name_non_ascii() {
        let name = "résumé 📄 final.txt";
        let short = ShortName::alias(name, &[]).unwrap();
        let slots = encode_entry_set(name, &short, ATTR_ARCHIVE, 9, 4096);
        let entries = decode_directory(&directory_with(&slots));
        assert_eq!(entries[0].name, name);
        assert_eq!(entries[0].size, 4096);
        assert!(entries[0].is_file());
    }

    #[test]
    fn test_entry_set_checksum_matches_short_entry() {
        let short = ShortName::alias("Quarterly Report.xlsx", &[]).unwrap();
        let slots = encode_entry_set("Quarterly Report.xlsx", &short, ATTR_ARCHIVE, 3, 0);
        let short_slot = slots.last().unwrap();
        let mut written = [0u8; 11];
        written.copy_from_slice(&short_slot[0..11]);
        for long in &slots[..slots.len() - 1] {
            assert_eq!(long[13], compute_checksum(&written));
        }
    }

    #[test]
    fn test_decode_short_only_and_dot_entries() {
        let mut data = init_directory_cluster(4096, 7, 2);
        let sub = encode_short_entry(&ShortName::from_plain("sub"), ATTR_DIRECTORY, 8, 0);
        data[64..96].copy_from_slice(&sub);

        let entries = decode_directory(&data);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "sub"]);
        assert!(entries.iter().all(|e| e.is_directory()));
        assert_eq!(entries[0].first_cluster, 7);
        assert_eq!(entries[1].first_cluster, 2);
        assert_eq!(entries[2].first_cluster, 8);
    }

    #[test]
    fn test_decode_stops_at_end_marker() {
        let a = encode_short_entry(&ShortName::from_plain("A"), ATTR_ARCHIVE, 3, 0);
        let b = encode_short_entry(&ShortName::from_plain("B"), ATTR_ARCHIVE, 4, 0);
        let mut data = directory_with(&[a]);
        data[64..96].copy_from_slice(&b);
        let entries = decode_directory(&data);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "A");
    }

    #[test]
    fn test_decode_skips_deleted_slots() {
        let units: Vec<u16> = "deleted-long-name".encode_utf16().collect();
        let mut orphan = encode_long_entries(&units, 0);
        let mut deleted = encode_short_entry(&ShortName::from_plain("GONE"), ATTR_ARCHIVE, 3, 0);
        deleted[0] = DELETED_ENTRY;
        orphan.push(deleted);
        orphan.push(encode_short_entry(&ShortName::from_plain("KEEP"), ATTR_ARCHIVE, 4, 0));

        let entries = decode_directory(&directory_with(&orphan));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "KEEP");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "short-only name")]
    fn test_entry_set_rejects_alias_for_short_only_name() {
        let alias = ShortName::from_parts(b"x~1", b"");
        encode_entry_set("x", &alias, ATTR_ARCHIVE, 3, 0);
    }

    #[test]
    fn test_entry_set_slot_count_matches_plan() {
        for name in ["x", "notes.txt", "abcdefghijklmn"] {
            let short = if needs_long_name(name) {
                ShortName::alias(name, &[]).unwrap()
            } else {
                ShortName::from_plain(name)
            };
            let slots = encode_entry_set(name, &short, ATTR_ARCHIVE, 3, 0);
            assert_eq!(slots.len(), slots_for_name(name), "{name}");
            assert_eq!(decode_directory(&directory_with(&slots))[0].name, name);
        }
    }

    #[test]
    fn test_decode_drops_orphaned_chain_fragments() {
        // Two-slot chain with no short entry behind it.
        let units: Vec<u16> = "AAAAAAAAAAAAABBBBB".encode_utf16().collect();
        let mut slots = encode_long_entries(&units, 0);
        assert_eq!(slots.len(), 2);

        let name = "abcdefghijklm";
        let short = ShortName::alias(name, &[]).unwrap();
        slots.extend(encode_entry_set(name, &short, ATTR_ARCHIVE, 5, 0));

        let entries = decode_directory(&directory_with(&slots));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, name);
    }

    #[test]
    fn test_decode_skips_volume_label() {
        let label = encode_short_entry(&ShortName::from_parts(b"MYDISK", b""), ATTR_VOLUME_ID, 0, 0);
        let file = encode_short_entry(&ShortName::from_parts(b"IO", b"SYS"), ATTR_ARCHIVE, 3, 10);
        let entries = decode_directory(&directory_with(&[label, file]));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "IO.SYS");
    }

    #[test]
    fn test_reserve_slots_after_dot_entries() {
        let mut data = init_directory_cluster(4096, 2, 2);
        assert_eq!(reserve_slots(&mut data, 3), Some(64));
    }

    #[test]
    fn test_reserve_slots_reuses_deleted_run() {
        let a = encode_short_entry(&ShortName::from_plain("A"), ATTR_ARCHIVE, 3, 0);
        let mut gone = a;
        gone[0] = DELETED_ENTRY;
        let mut data = directory_with(&[a, gone, gone, a]);
        assert_eq!(reserve_slots(&mut data, 2), Some(32));
        // A run of three does not fit between the live entries.
        assert_eq!(reserve_slots(&mut data, 3), Some(128));
    }

    #[test]
    fn test_reserve_slots_clears_garbage_past_end_marker() {
        let a = encode_short_entry(&ShortName::from_plain("A"), ATTR_ARCHIVE, 3, 0);
        let mut data = directory_with(&[a]);
        data[96] = b'X';
        data[96 + 11] = ATTR_ARCHIVE;
        assert_eq!(reserve_slots(&mut data, 2), Some(32));
        assert!(data[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reserve_slots_full_directory() {
        let a = encode_short_entry(&ShortName::from_plain("A"), ATTR_ARCHIVE, 3, 0);
        let mut data = vec![0u8; 128];
        for chunk in data.chunks_exact_mut(DIR_ENTRY_SIZE).take(3) {
            chunk.copy_from_slice(&a);
        }
        assert_eq!(reserve_slots(&mut data, 1), Some(96));
        assert_eq!(reserve_slots(&mut data, 2), None);
    }

    #[test]
    fn test_parent_cluster() {
        let data = init_directory_cluster(4096, 9, 4);
        assert_eq!(parent_cluster(&data), Some(4));
        assert_eq!(parent_cluster(&[0u8; 4096]), None);
    }
}
