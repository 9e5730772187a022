// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use crate::{
    errors::{LogError, LogResult},
    log_writes::{
        device::ReplayTarget,
        format::{
            entry_is_valid, EntryFlags, LogEntry, LogSuperblock, ENTRY_HEADER_SIZE,
            SUPERBLOCK_SIZE,
        },
    },
};

/// Largest discard that will be emulated by writing zeros.
pub const DEFAULT_MAX_ZERO_SIZE: u64 = 128 * 1024 * 1024;

/// How discard entries are handled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscardMode {
    /// Issue discards to the replay target.
    Discard,
    /// The replay target can not discard; write zeros instead. Once entered
    /// this mode is never left.
    ZeroFill,
    /// Skip discard entries entirely.
    Ignore,
}

#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Verbosity {
    #[default]
    Quiet,
    /// Report every entry that is applied to the replay target.
    Replayed,
    /// Also report skipped entries and entries passed over while seeking.
    All,
}

impl From<u8> for Verbosity {
    fn from(count: u8) -> Verbosity {
        match count {
            0 => Verbosity::Quiet,
            1 => Verbosity::Replayed,
            _ => Verbosity::All,
        }
    }
}

/// A dm-log-writes log opened for reading, with an optional device to
/// replay it onto.
///
/// Entries are only ever consumed in order; cur_entry is the index of the
/// next entry to be read and cur_pos the byte offset in the log at which it
/// starts.
#[derive(Debug)]
pub struct WriteLog<F = File, T = File> {
    log: F,
    pub(super) replay: Option<T>,
    pub(super) discard_mode: DiscardMode,
    pub(super) sectorsize: u64,
    nr_entries: u64,
    cur_entry: u64,
    cur_pos: u64,
    pub(super) max_zero_size: u64,
    start_sector: u64,
    end_sector: u64,
    pub(super) verbosity: Verbosity,
    // Scratch space holding one header sector.
    sector_buf: Vec<u8>,
}

impl WriteLog<File, File> {
    /// Open a log file and, optionally, the file or device to replay it onto.
    pub fn open(log_path: &Path, replay_path: Option<&Path>) -> LogResult<WriteLog> {
        let log = OpenOptions::new()
            .read(true)
            .open(log_path)
            .map_err(LogError::io(format!(
                "opening log {}",
                log_path.display()
            )))?;

        let replay = replay_path
            .map(|path| {
                OpenOptions::new()
                    .write(true)
                    .open(path)
                    .map_err(LogError::io(format!(
                        "opening replay file {}",
                        path.display()
                    )))
            })
            .transpose()?;

        WriteLog::from_parts(log, replay)
    }
}

impl<F, T> WriteLog<F, T>
where
    F: Read + Seek,
    T: ReplayTarget,
{
    /// Read the superblock from the log and position it at the first entry.
    pub fn from_parts(mut log: F, replay: Option<T>) -> LogResult<WriteLog<F, T>> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        log.seek(SeekFrom::Start(0))
            .and_then(|_| log.read_exact(&mut buf))
            .map_err(LogError::io("reading super"))?;
        let superblock = LogSuperblock::from_buf(&buf)?;

        let sectorsize = u64::from(superblock.sectorsize);
        let sector_buf_len = usize::try_from(superblock.sectorsize)
            .map_err(|_| LogError::Format(format!("Sector size {sectorsize} is too large")))?;

        let cur_pos = log
            .seek(SeekFrom::Start(sectorsize))
            .map_err(LogError::io("seeking to first entry"))?;

        Ok(WriteLog {
            log,
            replay,
            discard_mode: DiscardMode::Discard,
            sectorsize,
            nr_entries: superblock.nr_entries,
            cur_entry: 0,
            cur_pos,
            max_zero_size: DEFAULT_MAX_ZERO_SIZE,
            start_sector: 0,
            end_sector: u64::MAX,
            verbosity: Verbosity::Quiet,
            sector_buf: vec![0u8; sector_buf_len],
        })
    }

    pub fn sectorsize(&self) -> u64 {
        self.sectorsize
    }

    pub fn nr_entries(&self) -> u64 {
        self.nr_entries
    }

    /// Index of the next entry that will be read.
    pub fn cur_entry(&self) -> u64 {
        self.cur_entry
    }

    /// Byte offset in the log of the next entry that will be read.
    pub fn cur_pos(&self) -> u64 {
        self.cur_pos
    }

    pub fn replay_target(&self) -> Option<&T> {
        self.replay.as_ref()
    }

    pub fn discard_mode(&self) -> DiscardMode {
        self.discard_mode
    }

    /// Treat all discard entries as no-ops.
    pub fn ignore_discard(&mut self) {
        self.discard_mode = DiscardMode::Ignore;
    }

    pub fn set_max_zero_size(&mut self, max_zero_size: u64) {
        self.max_zero_size = max_zero_size;
    }

    /// Only apply entries that touch sectors in [start_sector, end_sector].
    pub fn set_sector_window(&mut self, start_sector: u64, end_sector: u64) {
        self.start_sector = start_sector;
        self.end_sector = end_sector;
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    /// True if the entry should not be applied to the replay target, because
    /// it carries no sectors or lies entirely outside the sector window.
    pub fn should_skip(&self, entry: &LogEntry) -> bool {
        if entry.nr_sectors == 0 {
            return true;
        }

        entry.sector.saturating_add(entry.nr_sectors) <= self.start_sector
            || entry.sector > self.end_sector
    }

    /// Read and validate the next header sector, advancing past it.
    fn read_entry(&mut self, read_data: bool) -> LogResult<Option<LogEntry>> {
        if self.cur_entry >= self.nr_entries {
            return Ok(None);
        }

        self.log
            .read_exact(&mut self.sector_buf)
            .map_err(LogError::io("reading entry"))?;

        if !entry_is_valid(&self.sector_buf) {
            return Err(LogError::CorruptLog {
                entry: self.cur_entry,
                sector: self.cur_pos / self.sectorsize,
            });
        }

        let entry = match self.sector_buf.split_first_chunk::<ENTRY_HEADER_SIZE>() {
            Some((header, tail)) => LogEntry::from_header_sector(header, tail, read_data),
            None => {
                return Err(LogError::CorruptLog {
                    entry: self.cur_entry,
                    sector: self.cur_pos / self.sectorsize,
                })
            }
        };

        self.cur_entry += 1;
        self.cur_pos += self.sectorsize;
        Ok(Some(entry))
    }

    fn payload_len(&self, entry: &LogEntry) -> LogResult<u64> {
        entry
            .header()
            .payload_len(self.sectorsize)
            .ok_or(LogError::CorruptLog {
                entry: self.cur_entry - 1,
                sector: self.cur_pos / self.sectorsize,
            })
    }

    fn skip_payload(&mut self, len: u64) -> LogResult<()> {
        let offset = i64::try_from(len)
            .map_err(|_| LogError::Msg(format!("Entry data length {len} is too large")))?;
        self.cur_pos = self
            .log
            .seek(SeekFrom::Current(offset))
            .map_err(LogError::io("seeking in log"))?;
        Ok(())
    }

    fn trace_entry(&self, action: &str, entry: &LogEntry) {
        info!(
            "{} {}@{}: sector {}, size {}, flags {:#x}({})",
            action,
            self.cur_entry - 1,
            self.cur_pos / self.sectorsize - 1,
            entry.sector,
            entry.nr_sectors.saturating_mul(self.sectorsize),
            entry.flags.bits(),
            entry.flags
        );
    }

    /// Read the next entry and apply it to the replay target.
    ///
    /// Write data is written at the entry's sector; discards are issued or
    /// emulated. Entries outside the sector window are read past without
    /// touching the target. If no target is open, nothing is written but
    /// the log is still read in full. Returns None at the end of the log.
    pub fn replay_next_entry(&mut self, read_data: bool) -> LogResult<Option<LogEntry>> {
        let entry = match self.read_entry(read_data)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let skip = self.should_skip(&entry);
        if self.verbosity >= Verbosity::All || (self.verbosity >= Verbosity::Replayed && !skip) {
            self.trace_entry(if skip { "skipping" } else { "replaying" }, &entry);
        }

        if entry.nr_sectors == 0 {
            return Ok(Some(entry));
        }

        if entry.flags.contains(EntryFlags::DISCARD) {
            if !skip {
                self.discard(&entry)?;
            }
            return Ok(Some(entry));
        }

        let size = self.payload_len(&entry)?;
        if skip {
            self.skip_payload(size)?;
            return Ok(Some(entry));
        }

        let buf_len = usize::try_from(size)
            .map_err(|_| LogError::Msg(format!("Entry data length {size} is too large")))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(buf_len).map_err(|_| {
            LogError::Msg(format!(
                "Error allocating buffer {} entry {}",
                size,
                self.cur_entry - 1
            ))
        })?;
        buf.resize(buf_len, 0u8);

        self.log
            .read_exact(&mut buf)
            .map_err(LogError::io("reading data"))?;
        self.cur_pos += size;

        let offset = entry
            .sector
            .checked_mul(self.sectorsize)
            .ok_or(LogError::CorruptLog {
                entry: self.cur_entry - 1,
                sector: self.cur_pos / self.sectorsize,
            })?;
        if let Some(replay) = self.replay.as_mut() {
            replay
                .write_all_at(&buf, offset)
                .map_err(LogError::io("writing data"))?;
        }

        Ok(Some(entry))
    }

    /// Read the next entry without applying it, seeking past its data.
    /// Returns None at the end of the log.
    pub fn seek_next_entry(&mut self, read_data: bool) -> LogResult<Option<LogEntry>> {
        let entry = match self.read_entry(read_data)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if self.verbosity >= Verbosity::All {
            self.trace_entry("seek entry", &entry);
        }

        let size = self.payload_len(&entry)?;
        if size > 0 {
            self.skip_payload(size)?;
        }

        Ok(Some(entry))
    }

    /// Position the log at the given entry, counting from 0.
    ///
    /// There is no index in the log, so every header before the requested
    /// entry is read and validated again, starting from the first one.
    pub fn seek_entry(&mut self, entry_num: u64) -> LogResult<()> {
        if entry_num >= self.nr_entries {
            return Err(LogError::InvalidEntry {
                entry: entry_num,
                nr_entries: self.nr_entries,
            });
        }

        self.cur_pos = self
            .log
            .seek(SeekFrom::Start(self.sectorsize))
            .map_err(LogError::io("seeking in file"))?;
        self.cur_entry = 0;

        debug!("Seeking to entry {entry_num}");
        while self.cur_entry < entry_num {
            if self.seek_next_entry(false)?.is_none() {
                break;
            }
        }

        Ok(())
    }

    /// Flush everything written to the replay target to stable storage.
    pub fn sync(&mut self) -> LogResult<()> {
        match self.replay.as_mut() {
            Some(replay) => replay
                .sync_all()
                .map_err(LogError::io("syncing replay device")),
            None => Ok(()),
        }
    }
}
