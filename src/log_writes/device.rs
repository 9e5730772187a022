// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
use std::io::{Cursor, Seek, SeekFrom, Write};
use std::{
    fs::File,
    io,
    os::unix::{fs::FileExt, io::AsRawFd},
};

use nix::{ioctl_write_ptr_bad, request_code_none};

// BLKDISCARD takes a pointer to a {start, length} pair, both in bytes.
ioctl_write_ptr_bad!(blkdiscard, request_code_none!(0x12, 119), [u64; 2]);

/// The device or file that log entries are replayed onto.
pub trait ReplayTarget {
    /// Write all of buf at the given byte offset.
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Discard len bytes starting at offset. An error means the target can
    /// not discard, the caller must not assume anything about its contents.
    fn discard(&mut self, offset: u64, len: u64) -> io::Result<()>;

    /// Make all previous writes durable.
    fn sync_all(&mut self) -> io::Result<()>;
}

impl ReplayTarget for File {
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        FileExt::write_all_at(self, buf, offset)
    }

    fn discard(&mut self, offset: u64, len: u64) -> io::Result<()> {
        let range = [offset, len];
        unsafe { blkdiscard(self.as_raw_fd(), &range) }
            .map(|_| ())
            .map_err(io::Error::from)
    }

    /// Invokes File::sync_all() thereby syncing all the data
    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }
}

#[cfg(test)]
impl ReplayTarget for Cursor<Vec<u8>> {
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }

    /// An in-memory buffer has nothing to discard with.
    fn discard(&mut self, _offset: u64, _len: u64) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    /// A no-op. The data is already in the Cursor inner value.
    fn sync_all(&mut self) -> io::Result<()> {
        Ok(())
    }
}
