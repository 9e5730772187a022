// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{error::Error, fmt, io, process::ExitStatus};

pub type LogResult<T> = Result<T, LogError>;

#[derive(Debug)]
pub enum LogError {
    /// A miscellaneous error with a message.
    Msg(String),
    /// The superblock does not describe a log this tool understands.
    Format(String),
    /// An entry header failed validation. `sector` is the position in the
    /// log, in units of the log's sector size, where the entry was read.
    CorruptLog { entry: u64, sector: u64 },
    /// Requested entry index is past the end of the log.
    InvalidEntry { entry: u64, nr_entries: u64 },
    /// The log was exhausted without finding the named mark.
    MarkNotFound(String),
    /// The consistency check command exited unsuccessfully after replaying
    /// the given entry.
    FsckFailed { entry: u64, status: ExitStatus },
    /// The consistency check command could not be started.
    Command(String, io::Error),
    /// An I/O operation on the log or the replay target failed; the string
    /// names the operation.
    Io(String, io::Error),
}

impl LogError {
    /// Attach a description of the failed operation to an I/O error.
    pub fn io<S>(op: S) -> impl FnOnce(io::Error) -> LogError
    where
        S: Into<String>,
    {
        move |err| LogError::Io(op.into(), err)
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::Msg(s) => write!(f, "{s}"),
            LogError::Format(s) => write!(f, "Invalid log format: {s}"),
            LogError::CorruptLog { entry, sector } => {
                write!(f, "Malformed entry {entry} @{sector}")
            }
            LogError::InvalidEntry { entry, nr_entries } => write!(
                f,
                "Invalid entry number {entry}, log has {nr_entries} entries"
            ),
            LogError::MarkNotFound(mark) => write!(f, "Couldn't find mark \"{mark}\""),
            LogError::FsckFailed { entry, status } => {
                write!(f, "Fsck errored out on entry {entry}: {status}")
            }
            LogError::Command(cmd, err) => write!(f, "Failed to run {cmd}: {err}"),
            LogError::Io(op, err) => write!(f, "Error {op}: {err}"),
        }
    }
}

impl Error for LogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LogError::Msg(_)
            | LogError::Format(_)
            | LogError::CorruptLog { .. }
            | LogError::InvalidEntry { .. }
            | LogError::MarkNotFound(_)
            | LogError::FsckFailed { .. } => None,
            LogError::Command(_, err) | LogError::Io(_, err) => Some(err),
        }
    }
}
