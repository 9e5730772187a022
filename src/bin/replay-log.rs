// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{env, num::NonZeroU64, path::PathBuf, process};

use clap::{error::ErrorKind, Arg, ArgAction, ArgMatches, Command};
use env_logger::Builder;
use log::LevelFilter;

use logwrites::{
    log_writes::{EntryFlags, Verbosity},
    replay::{
        parse_number, run, truncate_mark, CheckMode, FsckCommand, Mode, Outcome, ReplayConfig,
        StartPosition,
    },
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn cmd() -> Command {
    Command::new("replay-log")
        .version(VERSION)
        .about("Replay, search, or inspect a dm-log-writes log")
        .next_line_help(true)
        .arg(
            Arg::new("log")
                .long("log")
                .value_name("LOGFILE")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true)
                .help("The log file or device to read from"),
        )
        .arg(
            Arg::new("replay")
                .long("replay")
                .value_name("DEVICE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("The device or file to replay the log onto"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_name("NUM")
                .value_parser(parse_number)
                .help("Process at most NUM entries; 0 means no limit"),
        )
        .arg(
            Arg::new("next_flush")
                .long("next-flush")
                .action(ArgAction::SetTrue)
                .help("Stop after the next entry carrying FLUSH"),
        )
        .arg(
            Arg::new("next_fua")
                .long("next-fua")
                .action(ArgAction::SetTrue)
                .help("Stop after the next entry carrying FUA"),
        )
        .arg(
            Arg::new("start_entry")
                .long("start-entry")
                .value_name("NUM")
                .value_parser(parse_number)
                .conflicts_with("start_mark")
                .help("Begin at entry NUM, counting from 0"),
        )
        .arg(
            Arg::new("start_mark")
                .long("start-mark")
                .value_name("MARK")
                .help("Begin just after the mark labelled MARK"),
        )
        .arg(
            Arg::new("end_mark")
                .long("end-mark")
                .value_name("MARK")
                .help("Stop after the mark labelled MARK"),
        )
        .arg(
            Arg::new("find")
                .long("find")
                .action(ArgAction::SetTrue)
                .help("Print the index and log sector of the entry matching the stop conditions"),
        )
        .arg(
            Arg::new("num_entries")
                .long("num-entries")
                .action(ArgAction::SetTrue)
                .help("Print the number of entries in the log"),
        )
        .arg(
            Arg::new("no_discard")
                .long("no-discard")
                .action(ArgAction::SetTrue)
                .help("Do not replay discard entries"),
        )
        .arg(
            Arg::new("fsck")
                .long("fsck")
                .value_name("COMMAND")
                .value_parser(|s: &str| s.parse::<FsckCommand>())
                .requires("check")
                .help("Command to check the replay target with"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .value_name("NUM|flush|fua")
                .value_parser(|s: &str| s.parse::<CheckMode>())
                .requires("fsck")
                .help("Run the fsck command every NUM entries, or after every FLUSH or FUA"),
        )
        .arg(
            Arg::new("start_sector")
                .long("start-sector")
                .value_name("SECTOR")
                .value_parser(parse_number)
                .help("Only replay entries touching sectors at or after SECTOR"),
        )
        .arg(
            Arg::new("end_sector")
                .long("end-sector")
                .value_name("SECTOR")
                .value_parser(parse_number)
                .help("Only replay entries touching sectors at or before SECTOR"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Report replayed entries; repeat to report every entry"),
        )
}

/// Build the replay configuration from the parsed command line.
fn config(matches: &ArgMatches) -> ReplayConfig {
    let log = matches
        .get_one::<PathBuf>("log")
        .expect("'log' is a mandatory argument")
        .clone();

    let mut config = ReplayConfig::new(log);
    config.replay = matches.get_one::<PathBuf>("replay").cloned();
    config.limit = matches
        .get_one::<u64>("limit")
        .and_then(|limit| NonZeroU64::new(*limit));
    config.discard = !matches.get_flag("no_discard");
    config.verbosity = Verbosity::from(matches.get_count("verbose"));

    if matches.get_flag("next_flush") {
        config.stop_flags |= EntryFlags::FLUSH;
    }
    if matches.get_flag("next_fua") {
        config.stop_flags |= EntryFlags::FUA;
    }
    if let Some(mark) = matches.get_one::<String>("end_mark") {
        config.set_end_mark(mark);
    }

    if let Some(mark) = matches.get_one::<String>("start_mark") {
        config.start = StartPosition::Mark(truncate_mark(mark));
    } else if let Some(entry) = matches.get_one::<u64>("start_entry") {
        config.start = StartPosition::Entry(*entry);
    }

    config.mode = if matches.get_flag("find") {
        Mode::Find
    } else if matches.get_flag("num_entries") {
        Mode::NumEntries
    } else {
        Mode::Replay
    };

    if let (Some(fsck), Some(check)) = (
        matches.get_one::<FsckCommand>("fsck"),
        matches.get_one::<CheckMode>("check"),
    ) {
        config.check = Some((fsck.clone(), *check));
    }

    if let Some(sector) = matches.get_one::<u64>("start_sector") {
        config.start_sector = *sector;
    }
    if let Some(sector) = matches.get_one::<u64>("end_sector") {
        config.end_sector = *sector;
    }

    config
}

/// Configure and initialize the logger.
/// Read log configuration parameters from the environment if RUST_LOG
/// is set. Otherwise log errors only, or more for each -v given.
fn initialize_log(verbosity: Verbosity) {
    let mut builder = Builder::new();

    if let Ok(s) = env::var("RUST_LOG") {
        builder.parse_filters(&s);
    }

    match verbosity {
        Verbosity::Quiet => {}
        Verbosity::Replayed => {
            builder.filter(Some("logwrites"), LevelFilter::Info);
        }
        Verbosity::All => {
            builder.filter(Some("logwrites"), LevelFilter::Debug);
        }
    }

    builder.init()
}

fn main() {
    let matches = match cmd().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            if let Err(print_err) = err.print() {
                panic!("Unable to write to stderr: {print_err}");
            }
            process::exit(code);
        }
    };

    let config = config(&matches);
    initialize_log(config.verbosity);

    match run(&config) {
        Ok(Outcome::Found { entry, sector }) => println!("{entry}@{sector}"),
        Ok(Outcome::NotFound) => {
            eprintln!("Couldn't find entry");
            process::exit(1);
        }
        Ok(Outcome::NumEntries(nr_entries)) => println!("{nr_entries}"),
        Ok(Outcome::Info {
            version,
            sectorsize,
            nr_entries,
        }) => println!("Log version={version}, sectorsize={sectorsize}, entries={nr_entries}"),
        Ok(Outcome::Replayed(_)) => {}
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    }
}
