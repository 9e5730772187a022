// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{num::NonZeroU64, path::PathBuf};

use crate::{
    log_writes::{EntryFlags, Verbosity, ENTRY_HEADER_SIZE},
    replay::fsck::{CheckMode, FsckCommand},
};

/// Longest mark label that fits in a 4 KiB header sector along with the
/// header, leaving room for the terminating NUL.
pub const MAX_MARK_LEN: usize = 4097 - ENTRY_HEADER_SIZE;

/// Where in the log to begin.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StartPosition {
    Entry(u64),
    /// Just after the mark with this label.
    Mark(String),
}

impl Default for StartPosition {
    fn default() -> StartPosition {
        StartPosition::Entry(0)
    }
}

/// What the driver does once positioned in the log.
/// Checked in this order; the first that applies wins.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    /// Report the first entry that satisfies the stop conditions.
    Find,
    /// Report the number of entries in the log.
    NumEntries,
    /// Report the log's version, sector size and entry count, or replay it
    /// if a replay target is configured.
    #[default]
    Replay,
}

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    pub log: PathBuf,
    pub replay: Option<PathBuf>,
    pub mode: Mode,
    pub start: StartPosition,
    pub stop_flags: EntryFlags,
    pub end_mark: Option<String>,
    /// Process at most this many entries.
    pub limit: Option<NonZeroU64>,
    pub discard: bool,
    pub check: Option<(FsckCommand, CheckMode)>,
    pub start_sector: u64,
    pub end_sector: u64,
    pub verbosity: Verbosity,
}

impl ReplayConfig {
    pub fn new(log: PathBuf) -> ReplayConfig {
        ReplayConfig {
            log,
            replay: None,
            mode: Mode::default(),
            start: StartPosition::default(),
            stop_flags: EntryFlags::NONE,
            end_mark: None,
            limit: None,
            discard: true,
            check: None,
            start_sector: 0,
            end_sector: u64::MAX,
            verbosity: Verbosity::Quiet,
        }
    }

    /// Stop at the mark with this label; also turns on the MARK stop flag.
    pub fn set_end_mark(&mut self, mark: &str) {
        self.end_mark = Some(truncate_mark(mark));
        self.stop_flags |= EntryFlags::MARK;
    }
}

/// Parse an unsigned integer the way strtoull does with base 0: a 0x or 0X
/// prefix means hexadecimal, a leading 0 means octal, anything else is
/// decimal. The whole string must be consumed.
pub fn parse_number(s: &str) -> Result<u64, String> {
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(format!("Invalid number \"{s}\""));
    }

    u64::from_str_radix(digits, radix).map_err(|err| format!("Invalid number \"{s}\": {err}"))
}

/// Shorten a mark label to at most MAX_MARK_LEN bytes, on a character
/// boundary.
pub fn truncate_mark(mark: &str) -> String {
    if mark.len() <= MAX_MARK_LEN {
        return mark.to_string();
    }

    let mut end = MAX_MARK_LEN;
    while !mark.is_char_boundary(end) {
        end -= 1;
    }
    mark[..end].to_string()
}
