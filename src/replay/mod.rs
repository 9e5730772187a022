// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

mod config;
mod fsck;
mod run;
mod stop;

pub use self::{
    config::{parse_number, truncate_mark, Mode, ReplayConfig, StartPosition, MAX_MARK_LEN},
    fsck::{CheckMode, FsckCommand},
    run::{run, run_log, Outcome},
    stop::{seek_to_mark, should_stop},
};
