// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::{Read, Seek};

use crate::{
    errors::{LogError, LogResult},
    log_writes::{EntryFlags, LogEntry, ReplayTarget, WriteLog},
};

/// Check whether entry satisfies the stop conditions.
///
/// The entry must carry one of stop_flags. If MARK is among stop_flags, only
/// a mark entry whose label matches mark stops; a FLUSH or FUA entry then
/// never does. The entry must have been read with its data.
pub fn should_stop(entry: &LogEntry, stop_flags: EntryFlags, mark: Option<&str>) -> bool {
    if !entry.flags.intersects(stop_flags) {
        return false;
    }

    if !stop_flags.contains(EntryFlags::MARK) {
        return true;
    }

    entry.flags.contains(EntryFlags::MARK)
        && mark.is_some_and(|mark| entry.mark_matches(mark.as_bytes()))
}

/// Advance the log until just past the mark with the given label.
/// Fails with MarkNotFound if the rest of the log holds no such mark.
pub fn seek_to_mark<F, T>(log: &mut WriteLog<F, T>, mark: &str) -> LogResult<LogEntry>
where
    F: Read + Seek,
    T: ReplayTarget,
{
    while let Some(entry) = log.seek_next_entry(true)? {
        if should_stop(&entry, EntryFlags::MARK, Some(mark)) {
            debug!("Found mark \"{}\" at entry {}", mark, log.cur_entry() - 1);
            return Ok(entry);
        }
    }

    Err(LogError::MarkNotFound(mark.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use crate::log_writes::{EntryHeader, LogSuperblock, ENTRY_HEADER_SIZE};

    use super::*;

    fn entry(flags: EntryFlags, label: &[u8]) -> LogEntry {
        let header = EntryHeader {
            sector: 0,
            nr_sectors: if flags.contains(EntryFlags::MARK) { 0 } else { 1 },
            flags,
            data_len: label.len() as u64,
        };
        let mut tail = vec![0u8; 512 - ENTRY_HEADER_SIZE];
        tail[..label.len()].copy_from_slice(label);
        LogEntry::from_header_sector(&header.to_buf(), &tail, true)
    }

    /// A log holding only marks, one per label.
    fn mark_log(labels: &[&str]) -> Vec<u8> {
        let mut log = vec![0u8; 512];
        log[..28].copy_from_slice(&LogSuperblock::new(labels.len() as u64, 512).to_buf());
        for label in labels {
            let mut sector = vec![0u8; 512];
            let header = EntryHeader {
                sector: 0,
                nr_sectors: 0,
                flags: EntryFlags::MARK,
                data_len: label.len() as u64 + 1,
            };
            sector[..ENTRY_HEADER_SIZE].copy_from_slice(&header.to_buf());
            sector[ENTRY_HEADER_SIZE..ENTRY_HEADER_SIZE + label.len()]
                .copy_from_slice(label.as_bytes());
            log.extend_from_slice(&sector);
        }
        log
    }

    #[test]
    fn test_stop_on_flags() {
        let flush = entry(EntryFlags::FLUSH, b"");
        let fua = entry(EntryFlags::FUA | EntryFlags::FLUSH, b"");
        let write = entry(EntryFlags::NONE, b"");

        assert!(should_stop(&flush, EntryFlags::FLUSH, None));
        assert!(!should_stop(&flush, EntryFlags::FUA, None));
        assert!(should_stop(&fua, EntryFlags::FUA, None));
        assert!(!should_stop(&write, EntryFlags::FLUSH | EntryFlags::FUA, None));
        assert!(!should_stop(&write, EntryFlags::NONE, None));
    }

    #[test]
    fn test_stop_on_mark() {
        let done = entry(EntryFlags::MARK, b"done\0");
        let unterminated = entry(EntryFlags::MARK, b"done");

        assert!(should_stop(&done, EntryFlags::MARK, Some("done")));
        assert!(should_stop(&unterminated, EntryFlags::MARK, Some("done")));
        assert!(!should_stop(&done, EntryFlags::MARK, Some("don")));
        assert!(!should_stop(&done, EntryFlags::MARK, Some("done1")));
        assert!(!should_stop(&done, EntryFlags::MARK, None));
        assert!(!should_stop(&done, EntryFlags::FLUSH, Some("done")));
    }

    #[test]
    /// Once a mark is asked for, flush and FUA entries no longer stop.
    fn test_stop_on_mark_ignores_flush() {
        let stop = EntryFlags::MARK | EntryFlags::FLUSH;
        assert!(!should_stop(&entry(EntryFlags::FLUSH, b""), stop, Some("x")));
        assert!(!should_stop(
            &entry(EntryFlags::FLUSH | EntryFlags::FUA, b""),
            stop | EntryFlags::FUA,
            Some("x")
        ));
        assert!(should_stop(&entry(EntryFlags::MARK, b"x\0"), stop, Some("x")));
        assert!(!should_stop(&entry(EntryFlags::MARK, b"y\0"), stop, Some("x")));
    }

    #[test]
    /// Each label present once is found at its own entry.
    fn test_seek_to_each_mark() {
        let labels = ["first", "second", "third"];
        for (index, label) in labels.iter().enumerate() {
            let mut log =
                WriteLog::<_, Cursor<Vec<u8>>>::from_parts(Cursor::new(mark_log(&labels)), None)
                    .unwrap();
            let entry = seek_to_mark(&mut log, label).unwrap();
            assert_eq!(entry.mark(), Some(label.as_bytes()));
            assert_eq!(log.cur_entry(), index as u64 + 1);
        }
    }

    #[test]
    /// A missing label consumes the whole log before failing.
    fn test_seek_to_missing_mark() {
        let labels = ["first", "second"];
        let mut log =
            WriteLog::<_, Cursor<Vec<u8>>>::from_parts(Cursor::new(mark_log(&labels)), None)
                .unwrap();
        assert_matches!(
            seek_to_mark(&mut log, "third"),
            Err(LogError::MarkNotFound(ref mark)) if mark == "third"
        );
        assert_eq!(log.cur_entry(), 2);
    }
}
