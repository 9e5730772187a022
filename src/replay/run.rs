// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::{Read, Seek};

use crate::{
    errors::LogResult,
    log_writes::{ReplayTarget, WriteLog, WRITE_LOG_VERSION},
    replay::{
        config::{Mode, ReplayConfig, StartPosition},
        stop::{seek_to_mark, should_stop},
    },
};

/// The result of a successful run, for the caller to report.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The entry that satisfied the find conditions, and the position in the
    /// log, in sectors, just past it.
    Found { entry: u64, sector: u64 },
    /// The end of the log was reached in find mode.
    NotFound,
    NumEntries(u64),
    Info {
        version: u64,
        sectorsize: u64,
        nr_entries: u64,
    },
    /// Number of entries replayed.
    Replayed(u64),
}

/// Open the configured log and do what the configuration asks.
pub fn run(config: &ReplayConfig) -> LogResult<Outcome> {
    let mut log = WriteLog::open(&config.log, config.replay.as_deref())?;
    run_log(&mut log, config)
}

/// As run(), on an already opened log.
pub fn run_log<F, T>(log: &mut WriteLog<F, T>, config: &ReplayConfig) -> LogResult<Outcome>
where
    F: Read + Seek,
    T: ReplayTarget,
{
    log.set_verbosity(config.verbosity);
    if !config.discard {
        log.ignore_discard();
    }
    log.set_sector_window(config.start_sector, config.end_sector);

    match config.start {
        StartPosition::Mark(ref mark) => {
            seek_to_mark(log, mark)?;
        }
        StartPosition::Entry(0) => (),
        StartPosition::Entry(entry) => log.seek_entry(entry)?,
    }

    match config.mode {
        Mode::Find => find(log, config),
        Mode::NumEntries => Ok(Outcome::NumEntries(log.nr_entries())),
        Mode::Replay if config.replay.is_none() => Ok(Outcome::Info {
            version: WRITE_LOG_VERSION,
            sectorsize: log.sectorsize(),
            nr_entries: log.nr_entries(),
        }),
        Mode::Replay => replay(log, config),
    }
}

fn limit_reached(config: &ReplayConfig, entry_count: u64) -> bool {
    config.limit.is_some_and(|limit| limit.get() == entry_count)
}

/// Scan forward without replaying until an entry meets the stop conditions
/// or the limit is reached.
fn find<F, T>(log: &mut WriteLog<F, T>, config: &ReplayConfig) -> LogResult<Outcome>
where
    F: Read + Seek,
    T: ReplayTarget,
{
    let mut entry_count = 0;
    while let Some(entry) = log.seek_next_entry(true)? {
        entry_count += 1;
        if limit_reached(config, entry_count)
            || should_stop(&entry, config.stop_flags, config.end_mark.as_deref())
        {
            return Ok(Outcome::Found {
                entry: log.cur_entry() - 1,
                sector: log.cur_pos() / log.sectorsize(),
            });
        }
    }

    Ok(Outcome::NotFound)
}

/// Replay entries onto the target until the log ends, the limit is reached
/// or an entry meets the stop conditions. The target is synced when
/// replay ends, whether or not it succeeded.
fn replay<F, T>(log: &mut WriteLog<F, T>, config: &ReplayConfig) -> LogResult<Outcome>
where
    F: Read + Seek,
    T: ReplayTarget,
{
    let mut entry_count = 0;
    let result = replay_entries(log, config, &mut entry_count);
    let synced = log.sync();
    result?;
    synced?;

    info!("Replayed {entry_count} entries");
    Ok(Outcome::Replayed(entry_count))
}

fn replay_entries<F, T>(
    log: &mut WriteLog<F, T>,
    config: &ReplayConfig,
    entry_count: &mut u64,
) -> LogResult<()>
where
    F: Read + Seek,
    T: ReplayTarget,
{
    while let Some(entry) = log.replay_next_entry(true)? {
        *entry_count += 1;

        if let Some((ref fsck, mode)) = config.check {
            if mode.is_due(&entry, *entry_count) {
                log.sync()?;
                fsck.run(log.cur_entry() - 1)?;
            }
        }

        if limit_reached(config, *entry_count)
            || should_stop(&entry, config.stop_flags, config.end_mark.as_deref())
        {
            break;
        }
    }

    Ok(())
}
