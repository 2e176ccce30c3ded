// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    path::{Path, PathBuf},
    time::Duration,
};

use duration_string::DurationString;
use serde::Deserialize;

use crate::arena::DEFAULT_POOL_LIMIT;
use crate::cache::{DEFAULT_WINDOW, MAX_WINDOW};

const DEFAULT_PLAYBACK_DELAY: Duration = Duration::ZERO;
const DEFAULT_EXTENDED_KB: usize = 2048;
const DEFAULT_CLOCK: &str = "monotonic";

/// Where song events are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Memory {
    /// One large block of the given number of bytes.
    Extended { bytes: usize },
    /// Up to the given number of small pools, reserved as they're needed.
    Local { pools: usize },
}

impl Default for Memory {
    fn default() -> Self {
        Memory::Local {
            pools: DEFAULT_POOL_LIMIT,
        }
    }
}

/// A YAML representation of the player configuration.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Player {
    /// The MIDI output to play through.
    device: Option<String>,

    /// Either "extended" or "local" (default: local).
    memory: Option<String>,

    /// Size of extended memory in kilobytes (default: 2048).
    extended_kb: Option<usize>,

    /// The most local pools to reserve (default: 64).
    local_pools: Option<usize>,

    /// Records held by the read-ahead cache, from 1 to 4096 (default: 64).
    cache_window: Option<usize>,

    /// How long to wait before the first record of a song is played.
    playback_delay: Option<String>,

    /// Pause briefly before refilling the cache during slack time (default: false).
    pacing_delay: Option<bool>,

    /// Idle the processor between records instead of spinning (default: true).
    power_save: Option<bool>,

    /// Note velocity scaling in percent (default: 100).
    volume: Option<u8>,

    /// A SYX file sent to the device before every song.
    syx_reset: Option<PathBuf>,

    /// Shuffle the playlist (default: false).
    random: Option<bool>,

    /// The clock driving playback, "monotonic" or "ticker" (default: monotonic).
    clock: Option<String>,
}

impl Player {
    /// Creates a configuration with defaults for everything but the device.
    pub fn new(device: &str) -> Player {
        Player {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the memory the song arena is built from.
    pub fn memory(&self) -> Result<Memory, Box<dyn Error>> {
        match self.memory.as_deref() {
            None | Some("local") => Ok(Memory::Local {
                pools: self.local_pools.unwrap_or(DEFAULT_POOL_LIMIT).max(1),
            }),
            Some("extended") => Ok(Memory::Extended {
                bytes: self.extended_kb.unwrap_or(DEFAULT_EXTENDED_KB).max(1) << 10,
            }),
            Some(other) => Err(format!("unknown memory type {}", other).into()),
        }
    }

    pub fn cache_window(&self) -> usize {
        self.cache_window
            .unwrap_or(DEFAULT_WINDOW)
            .clamp(1, MAX_WINDOW)
    }

    /// Returns the playback delay from the configuration.
    pub fn playback_delay(&self) -> Result<Duration, Box<dyn Error>> {
        match &self.playback_delay {
            Some(playback_delay) => Ok(DurationString::from_string(playback_delay.clone())?.into()),
            None => Ok(DEFAULT_PLAYBACK_DELAY),
        }
    }

    pub fn pacing_delay(&self) -> bool {
        self.pacing_delay.unwrap_or(false)
    }

    pub fn power_save(&self) -> bool {
        self.power_save.unwrap_or(true)
    }

    /// Returns the volume, capped at 100.
    pub fn volume(&self) -> u8 {
        self.volume.unwrap_or(100).min(100)
    }

    pub fn syx_reset(&self) -> Option<PathBuf> {
        self.syx_reset.clone()
    }

    /// Resolves the SYX reset path against the directory of the configuration file.
    pub fn resolve_syx_reset(&mut self, base: &Path) {
        if let Some(path) = self.syx_reset.as_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn random(&self) -> bool {
        self.random.unwrap_or(false)
    }

    pub fn clock(&self) -> &str {
        self.clock.as_deref().unwrap_or(DEFAULT_CLOCK)
    }
}
