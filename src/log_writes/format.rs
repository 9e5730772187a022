// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! On-disk layout of a dm-log-writes log.
//!
//! A log starts with a superblock occupying one sector, followed by
//! `nr_entries` entries. Every entry begins with a header padded out to one
//! sector. Write entries are followed by `nr_sectors * sectorsize` bytes of
//! data. Discard entries and zero length entries carry no data. Mark entries
//! keep their label in the header sector, directly after the header.
//! All integers are little endian.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

use byteorder::{ByteOrder, LittleEndian};

use crate::errors::{LogError, LogResult};

pub const WRITE_LOG_MAGIC: u64 = 0x006a_7366_7773_6872;
pub const WRITE_LOG_VERSION: u64 = 1;

/// Bytes of the superblock that carry information; the rest of its sector
/// is padding.
pub const SUPERBLOCK_SIZE: usize = 28;

/// Size of the fixed part of an entry.
pub const ENTRY_HEADER_SIZE: usize = 32;

/// Flags recorded with each entry, as defined by the kernel target.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct EntryFlags(u64);

impl EntryFlags {
    pub const NONE: EntryFlags = EntryFlags(0);
    pub const FLUSH: EntryFlags = EntryFlags(1 << 0);
    pub const FUA: EntryFlags = EntryFlags(1 << 1);
    pub const DISCARD: EntryFlags = EntryFlags(1 << 2);
    pub const MARK: EntryFlags = EntryFlags(1 << 3);

    const NAMES: [(EntryFlags, &'static str); 4] = [
        (EntryFlags::FLUSH, "FLUSH"),
        (EntryFlags::FUA, "FUA"),
        (EntryFlags::DISCARD, "DISCARD"),
        (EntryFlags::MARK, "MARK"),
    ];

    pub const fn from_bits(bits: u64) -> EntryFlags {
        EntryFlags(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is set in `self`.
    pub const fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is set in `self`.
    pub const fn intersects(self, other: EntryFlags) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn difference(self, other: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 & !other.0)
    }
}

impl BitOr for EntryFlags {
    type Output = EntryFlags;

    fn bitor(self, rhs: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntryFlags {
    fn bitor_assign(&mut self, rhs: EntryFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EntryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut names = EntryFlags::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| (*name).to_string())
            .collect::<Vec<_>>();
        let unknown = EntryFlags::NAMES
            .iter()
            .fold(*self, |acc, (flag, _)| acc.difference(*flag));
        if !unknown.is_empty() {
            names.push(format!("{:#x}", unknown.0));
        }
        write!(f, "{}", names.join("|"))
    }
}

impl fmt::Debug for EntryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryFlags({self})")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LogSuperblock {
    pub magic: u64,
    pub version: u64,
    pub nr_entries: u64,
    pub sectorsize: u32,
}

impl LogSuperblock {
    pub fn new(nr_entries: u64, sectorsize: u32) -> LogSuperblock {
        LogSuperblock {
            magic: WRITE_LOG_MAGIC,
            version: WRITE_LOG_VERSION,
            nr_entries,
            sectorsize,
        }
    }

    /// Decode and validate a superblock.
    /// The magic and version must match exactly, and the sector size must be
    /// large enough to hold an entry header.
    pub fn from_buf(buf: &[u8; SUPERBLOCK_SIZE]) -> LogResult<LogSuperblock> {
        let magic = LittleEndian::read_u64(&buf[0..8]);
        if magic != WRITE_LOG_MAGIC {
            return Err(LogError::Format(format!(
                "Magic doesn't match, wanted {WRITE_LOG_MAGIC:#x}, have {magic:#x}"
            )));
        }

        let version = LittleEndian::read_u64(&buf[8..16]);
        if version != WRITE_LOG_VERSION {
            return Err(LogError::Format(format!(
                "Version mismatch, wanted {WRITE_LOG_VERSION}, have {version}"
            )));
        }

        let sectorsize = LittleEndian::read_u32(&buf[24..28]);
        if (sectorsize as usize) < ENTRY_HEADER_SIZE {
            return Err(LogError::Format(format!(
                "Sector size {sectorsize} is smaller than an entry header"
            )));
        }

        Ok(LogSuperblock {
            magic,
            version,
            nr_entries: LittleEndian::read_u64(&buf[16..24]),
            sectorsize,
        })
    }

    pub fn to_buf(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.magic);
        LittleEndian::write_u64(&mut buf[8..16], self.version);
        LittleEndian::write_u64(&mut buf[16..24], self.nr_entries);
        LittleEndian::write_u32(&mut buf[24..28], self.sectorsize);
        buf
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EntryHeader {
    pub sector: u64,
    pub nr_sectors: u64,
    pub flags: EntryFlags,
    pub data_len: u64,
}

impl EntryHeader {
    pub fn from_buf(buf: &[u8; ENTRY_HEADER_SIZE]) -> EntryHeader {
        EntryHeader {
            sector: LittleEndian::read_u64(&buf[0..8]),
            nr_sectors: LittleEndian::read_u64(&buf[8..16]),
            flags: EntryFlags(LittleEndian::read_u64(&buf[16..24])),
            data_len: LittleEndian::read_u64(&buf[24..32]),
        }
    }

    pub fn to_buf(&self) -> [u8; ENTRY_HEADER_SIZE] {
        let mut buf = [0u8; ENTRY_HEADER_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.sector);
        LittleEndian::write_u64(&mut buf[8..16], self.nr_sectors);
        LittleEndian::write_u64(&mut buf[16..24], self.flags.0);
        LittleEndian::write_u64(&mut buf[24..32], self.data_len);
        buf
    }

    /// Number of data bytes that follow the header sector in the log.
    /// Returns None if the length does not fit in 64 bits.
    pub fn payload_len(&self, sectorsize: u64) -> Option<u64> {
        if self.flags.contains(EntryFlags::DISCARD) {
            Some(0)
        } else {
            self.nr_sectors.checked_mul(sectorsize)
        }
    }
}

/// Check the header sector of an entry for signs of corruption.
///
/// An entry with neither flags nor sectors is what an unwritten, zeroed
/// region looks like. The kernel zero pads the header sector of every entry
/// except a mark, so a non-zero byte right after the header means the
/// reader has lost its place in the log.
pub fn entry_is_valid(header_sector: &[u8]) -> bool {
    let (header, tail) = match header_sector.split_first_chunk::<ENTRY_HEADER_SIZE>() {
        Some(parts) => parts,
        None => return false,
    };
    let header = EntryHeader::from_buf(header);

    if header.flags.is_empty() && header.nr_sectors == 0 {
        return false;
    }

    if header.flags != EntryFlags::MARK && tail.first().is_some_and(|b| *b != 0) {
        return false;
    }

    true
}

/// An entry read from the log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEntry {
    pub sector: u64,
    pub nr_sectors: u64,
    pub flags: EntryFlags,
    pub data_len: u64,
    /// The remainder of the header sector, if it was requested.
    data: Vec<u8>,
}

impl LogEntry {
    /// Build an entry from a complete header sector. The bytes following
    /// the header are kept only if `keep_data` is true.
    pub fn from_header_sector(
        header_sector: &[u8; ENTRY_HEADER_SIZE],
        tail: &[u8],
        keep_data: bool,
    ) -> LogEntry {
        let header = EntryHeader::from_buf(header_sector);
        LogEntry {
            sector: header.sector,
            nr_sectors: header.nr_sectors,
            flags: header.flags,
            data_len: header.data_len,
            data: if keep_data { tail.to_vec() } else { Vec::new() },
        }
    }

    pub fn header(&self) -> EntryHeader {
        EntryHeader {
            sector: self.sector,
            nr_sectors: self.nr_sectors,
            flags: self.flags,
            data_len: self.data_len,
        }
    }

    /// Bytes stored after the header in the header sector. Empty unless the
    /// entry was read with its data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The label of a mark entry, without any terminating NUL.
    /// None if this is not a mark or its data was not read.
    ///
    /// The kernel pads the label with at least one NUL, so up to
    /// data_len + 1 bytes are looked at. A label with no NUL in that window
    /// is cut at data_len + 1 bytes.
    pub fn mark(&self) -> Option<&[u8]> {
        if !self.flags.contains(EntryFlags::MARK) || self.data.is_empty() {
            return None;
        }

        let label = &self.data[..self.mark_window()];
        Some(
            label
                .iter()
                .position(|b| *b == 0)
                .map_or(label, |nul| &label[..nul]),
        )
    }

    /// Whether this is a mark whose label matches mark. Only the first
    /// data_len + 1 bytes of mark take part in the comparison.
    pub fn mark_matches(&self, mark: &[u8]) -> bool {
        match self.mark() {
            Some(label) => mark[..mark.len().min(self.mark_window())] == *label,
            None => false,
        }
    }

    fn mark_window(&self) -> usize {
        usize::try_from(self.data_len.saturating_add(1))
            .unwrap_or(usize::MAX)
            .min(self.data.len())
    }
}
