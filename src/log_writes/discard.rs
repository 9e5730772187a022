// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Discard handling for replay.
//!
//! A discard entry is first issued to the replay target as a real discard.
//! If the target refuses, the log switches to writing zeros for this and
//! every later discard. Discards too large to zero are skipped; the region
//! keeps whatever data it had.

use std::cmp::min;

use crate::{
    errors::{LogError, LogResult},
    log_writes::{
        device::ReplayTarget,
        format::LogEntry,
        write_log::{DiscardMode, Verbosity, WriteLog},
    },
};

/// No single discard or zeroing request is larger than this.
pub const MAX_DISCARD_CHUNK: u64 = 1024 * 1024 * 1024;

impl<F, T> WriteLog<F, T>
where
    T: ReplayTarget,
{
    /// Discard the sectors described by entry on the replay target.
    pub fn discard(&mut self, entry: &LogEntry) -> LogResult<()> {
        if self.discard_mode == DiscardMode::Ignore || self.replay.is_none() {
            return Ok(());
        }

        let overflow = || LogError::Msg(format!("Discard range of {entry:?} overflows"));
        let mut start = entry
            .sector
            .checked_mul(self.sectorsize)
            .ok_or_else(overflow)?;
        let mut size = entry
            .nr_sectors
            .checked_mul(self.sectorsize)
            .ok_or_else(overflow)?;

        while size > 0 {
            let len = min(size, MAX_DISCARD_CHUNK);

            // Checked before and after so that the first refused discard
            // falls through to zeroing the same chunk.
            if self.discard_mode == DiscardMode::Discard {
                self.discard_range(start, len);
            }
            if self.discard_mode == DiscardMode::ZeroFill {
                self.zero_range(start, len)?;
            }

            size -= len;
            start = start.saturating_add(len);
        }

        Ok(())
    }

    fn discard_range(&mut self, start: u64, len: u64) {
        let result = match self.replay.as_mut() {
            Some(replay) => replay.discard(start, len),
            None => return,
        };

        if let Err(err) = result {
            if self.verbosity > Verbosity::Quiet {
                info!("replay device doesn't support discard, switching to writing zeros: {err}");
            }
            self.discard_mode = DiscardMode::ZeroFill;
        }
    }

    fn zero_range(&mut self, mut start: u64, mut len: u64) -> LogResult<()> {
        if len > self.max_zero_size {
            if self.verbosity > Verbosity::Quiet {
                info!(
                    "discard len {} larger than max {}",
                    len, self.max_zero_size
                );
            }
            return Ok(());
        }

        let mut bufsize = usize::try_from(len).unwrap_or(usize::MAX);
        let mut buf = Vec::new();
        loop {
            if bufsize == 0 {
                return Err(LogError::Msg("Couldn't allocate zero buffer".to_string()));
            }
            if buf.try_reserve_exact(bufsize).is_ok() {
                break;
            }
            bufsize >>= 1;
        }
        buf.resize(bufsize, 0u8);

        let replay = match self.replay.as_mut() {
            Some(replay) => replay,
            None => return Ok(()),
        };
        while len > 0 {
            let chunk = min(len, buf.len() as u64);
            let chunk_len = usize::try_from(chunk).unwrap_or(buf.len());
            replay
                .write_all_at(&buf[..chunk_len], start)
                .map_err(LogError::io("zeroing file"))?;
            len -= chunk;
            start += chunk;
        }

        Ok(())
    }
}
