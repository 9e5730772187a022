// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

mod device;
mod discard;
mod format;
mod write_log;


pub use self::{
    device::ReplayTarget,
    discard::MAX_DISCARD_CHUNK,
    format::{
        entry_is_valid, EntryFlags, EntryHeader, LogEntry, LogSuperblock, ENTRY_HEADER_SIZE,
        SUPERBLOCK_SIZE, WRITE_LOG_MAGIC, WRITE_LOG_VERSION,
    },
    write_log::{DiscardMode, Verbosity, WriteLog, DEFAULT_MAX_ZERO_SIZE},
};
