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
use std::io;

use crate::arena::Handle;

/// Errors raised while loading, merging or playing a song. Every variant is fatal for the
/// current song only: the caller decides whether to move on to another song or to exit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The arena could not satisfy an allocation.
    #[error("out of memory: unable to allocate {requested} bytes ({allocated} of {capacity} in use)")]
    OutOfMemory {
        requested: usize,
        allocated: usize,
        capacity: usize,
    },

    /// A pull or push referenced storage the arena never handed out.
    #[error("memory access fault at {handle}")]
    CorruptHandle { handle: Handle },

    /// A record was read back with a tag no writer produces.
    #[error("corrupt record at {handle} (tag {tag:#04x})")]
    CorruptRecord { handle: Handle, tag: u8 },

    /// The song file could not be understood.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The output device could not be opened.
    #[error("device error: {0}")]
    Device(String),
}

impl From<midly::Error> for Error {
    fn from(err: midly::Error) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
