// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Runs the consistency check command between replayed entries.
// The command line is split on whitespace and executed directly, without a
// shell. Its output goes to this process's stdout and stderr.

use std::{
    fmt,
    num::NonZeroU64,
    process::Command,
    str::FromStr,
};

use crate::{
    errors::{LogError, LogResult},
    log_writes::{EntryFlags, LogEntry},
};

/// When to run the check command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckMode {
    /// After every n-th replayed entry.
    Every(NonZeroU64),
    /// After every entry carrying FLUSH.
    Flush,
    /// After every entry carrying FUA.
    Fua,
}

impl CheckMode {
    /// Whether the check is due after the entry_count-th replayed entry.
    pub fn is_due(self, entry: &LogEntry, entry_count: u64) -> bool {
        match self {
            CheckMode::Every(n) => entry_count % n.get() == 0,
            CheckMode::Flush => entry.flags.contains(EntryFlags::FLUSH),
            CheckMode::Fua => entry.flags.contains(EntryFlags::FUA),
        }
    }
}

impl FromStr for CheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<CheckMode, String> {
        match s {
            "flush" => Ok(CheckMode::Flush),
            "fua" => Ok(CheckMode::Fua),
            _ => super::parse_number(s)
                .ok()
                .and_then(NonZeroU64::new)
                .map(CheckMode::Every)
                .ok_or_else(|| format!("Invalid entry number \"{s}\"")),
        }
    }
}

/// A check command, program followed by its arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FsckCommand {
    program: String,
    args: Vec<String>,
}

impl FsckCommand {
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the command and wait for it. entry is the index of the entry
    /// just replayed; it is reported if the command fails.
    pub fn run(&self, entry: u64) -> LogResult<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        debug!("Running {self} after entry {entry}");
        match cmd.status() {
            Err(err) => Err(LogError::Command(format!("{cmd:?}"), err)),
            Ok(status) => {
                if status.success() {
                    Ok(())
                } else {
                    Err(LogError::FsckFailed { entry, status })
                }
            }
        }
    }
}

impl FromStr for FsckCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<FsckCommand, String> {
        let mut words = s.split_whitespace().map(|w| w.to_string());
        match words.next() {
            Some(program) => Ok(FsckCommand {
                program,
                args: words.collect(),
            }),
            None => Err("The fsck command is empty".to_string()),
        }
    }
}

impl fmt::Display for FsckCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::log_writes::{EntryHeader, ENTRY_HEADER_SIZE};

    use super::*;

    fn entry(flags: EntryFlags) -> LogEntry {
        let header = EntryHeader {
            sector: 0,
            nr_sectors: 1,
            flags,
            data_len: 0,
        };
        LogEntry::from_header_sector(&header.to_buf(), &[0u8; ENTRY_HEADER_SIZE], false)
    }

    #[test]
    fn test_parse_check_mode() {
        assert_eq!("flush".parse::<CheckMode>(), Ok(CheckMode::Flush));
        assert_eq!("fua".parse::<CheckMode>(), Ok(CheckMode::Fua));
        assert_eq!(
            "10".parse::<CheckMode>(),
            Ok(CheckMode::Every(NonZeroU64::new(10).unwrap()))
        );
        assert_eq!(
            "0x10".parse::<CheckMode>(),
            Ok(CheckMode::Every(NonZeroU64::new(16).unwrap()))
        );
        assert!("0".parse::<CheckMode>().is_err());
        assert!("FLUSH".parse::<CheckMode>().is_err());
        assert!("3x".parse::<CheckMode>().is_err());
    }

    #[test]
    fn test_check_due() {
        let every_two = CheckMode::Every(NonZeroU64::new(2).unwrap());
        let plain = entry(EntryFlags::NONE);
        assert!(!every_two.is_due(&plain, 1));
        assert!(every_two.is_due(&plain, 2));
        assert!(!every_two.is_due(&plain, 3));

        assert!(CheckMode::Flush.is_due(&entry(EntryFlags::FLUSH), 1));
        assert!(!CheckMode::Flush.is_due(&entry(EntryFlags::FUA), 1));
        assert!(CheckMode::Fua.is_due(&entry(EntryFlags::FUA | EntryFlags::FLUSH), 1));
        assert!(!CheckMode::Fua.is_due(&plain, 1));
    }

    #[test]
    fn test_parse_command() {
        let cmd = "fsck.ext4  -fn /dev/loop0".parse::<FsckCommand>().unwrap();
        assert_eq!(cmd.program(), "fsck.ext4");
        assert_eq!(cmd.args(), ["-fn", "/dev/loop0"]);
        assert_eq!(cmd.to_string(), "fsck.ext4 -fn /dev/loop0");
        assert!("   ".parse::<FsckCommand>().is_err());
    }

    #[test]
    fn test_run_command() {
        assert_matches!("true".parse::<FsckCommand>().unwrap().run(3), Ok(()));
        assert_matches!(
            "false".parse::<FsckCommand>().unwrap().run(3),
            Err(LogError::FsckFailed { entry: 3, .. })
        );
        assert_matches!(
            "/nonexistent/fsck".parse::<FsckCommand>().unwrap().run(3),
            Err(LogError::Command(_, _))
        );
    }
}
