// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Scratch logs and replay targets for the replay-log tests.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use logwrites::log_writes::{
    EntryFlags, EntryHeader, LogSuperblock, ENTRY_HEADER_SIZE, SUPERBLOCK_SIZE,
};

/// Assembles a log in memory, one entry at a time.
pub struct LogBuilder {
    sectorsize: u32,
    nr_entries: u64,
    body: Vec<u8>,
}

impl LogBuilder {
    pub fn new(sectorsize: u32) -> LogBuilder {
        LogBuilder {
            sectorsize,
            nr_entries: 0,
            body: Vec::new(),
        }
    }

    fn entry(mut self, header: EntryHeader, tail: &[u8], data: &[u8]) -> LogBuilder {
        let mut sector = vec![0u8; self.sectorsize as usize];
        sector[..ENTRY_HEADER_SIZE].copy_from_slice(&header.to_buf());
        sector[ENTRY_HEADER_SIZE..ENTRY_HEADER_SIZE + tail.len()].copy_from_slice(tail);
        self.body.extend_from_slice(&sector);
        self.body.extend_from_slice(data);
        self.nr_entries += 1;
        self
    }

    pub fn write(self, sector: u64, data: &[u8], flags: EntryFlags) -> LogBuilder {
        let nr_sectors = (data.len() / self.sectorsize as usize) as u64;
        self.entry(
            EntryHeader {
                sector,
                nr_sectors,
                flags,
                data_len: 0,
            },
            &[],
            data,
        )
    }

    pub fn discard(self, sector: u64, nr_sectors: u64) -> LogBuilder {
        self.entry(
            EntryHeader {
                sector,
                nr_sectors,
                flags: EntryFlags::DISCARD,
                data_len: 0,
            },
            &[],
            &[],
        )
    }

    pub fn flush(self) -> LogBuilder {
        self.entry(
            EntryHeader {
                sector: 0,
                nr_sectors: 0,
                flags: EntryFlags::FLUSH,
                data_len: 0,
            },
            &[],
            &[],
        )
    }

    pub fn mark(self, label: &str) -> LogBuilder {
        let mut data = label.as_bytes().to_vec();
        data.push(0);
        self.entry(
            EntryHeader {
                sector: 0,
                nr_sectors: 0,
                flags: EntryFlags::MARK,
                data_len: data.len() as u64,
            },
            &data,
            &[],
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut log = vec![0u8; self.sectorsize as usize];
        log[..SUPERBLOCK_SIZE]
            .copy_from_slice(&LogSuperblock::new(self.nr_entries, self.sectorsize).to_buf());
        log.extend_from_slice(&self.body);
        log
    }
}

/// A log file and a replay target file in a temporary directory, removed
/// when dropped.
pub struct Scratch {
    _dir: TempDir,
    pub log: PathBuf,
    pub target: PathBuf,
}

impl Scratch {
    pub fn new(log: &[u8], target: &[u8]) -> Result<Scratch, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("log");
        let target_path = dir.path().join("target");
        fs::write(&log_path, log)?;
        fs::write(&target_path, target)?;
        Ok(Scratch {
            _dir: dir,
            log: log_path,
            target: target_path,
        })
    }
}

/// Write 0xaa to sector 0, discard it, then mark "done".
pub fn done_log() -> Vec<u8> {
    LogBuilder::new(512)
        .write(0, &[0xaa; 512], EntryFlags::NONE)
        .discard(0, 1)
        .mark("done")
        .build()
}

/// True if every byte of the file in range is the given value.
pub fn all_bytes(path: &Path, range: std::ops::Range<usize>, value: u8) -> bool {
    fs::read(path)
        .map(|image| image[range].iter().all(|b| *b == value))
        .unwrap_or(false)
}
