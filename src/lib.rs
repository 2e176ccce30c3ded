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
//! A MIDI file player that keeps a song's events in a paged arena and plays them back through
//! a small read-ahead cache on a real time schedule.

pub mod arena;
pub mod cache;
pub mod clock;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod event;
pub mod loader;
pub mod merge;
pub mod player;
pub mod playlist;
pub mod playsync;
pub mod scheduler;
pub mod thread_priority;
pub mod timing;
pub mod util;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
