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
use std::{fmt, fs, path::Path};

use tracing::{info, span, Level};

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::scheduler::Timeline;

mod mus;
mod smf;
pub mod syx;

/// The most title lines kept for a song.
pub const MAX_TITLES: usize = 8;

/// The container a song was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    /// A Standard MIDI File.
    Midi,
    /// A Standard MIDI File inside a RIFF RMID wrapper.
    Rmid,
    /// A MUS score.
    Mus,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Container::Midi => "MIDI",
            Container::Rmid => "RMID",
            Container::Mus => "MUS",
        };
        write!(f, "{}", name)
    }
}

/// Everything known about a loaded song besides its events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongInfo {
    pub container: Container,
    /// Title lines gathered from track names, text and copyright notices.
    pub titles: Vec<String>,
    /// The number of tracks in the file.
    pub tracks: usize,
    /// One bit per channel that plays at least one note.
    pub channels: u16,
}

/// A song loaded into the arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Song {
    pub info: SongInfo,
    pub timeline: Timeline,
    /// The number of records in the timeline.
    pub records: usize,
}

/// Reads a song file into the arena.
pub fn load(arena: &mut Arena, path: &Path) -> Result<Song> {
    let span = span!(Level::INFO, "load");
    let _enter = span.enter();

    let bytes = fs::read(path)?;
    let song = load_bytes(arena, &bytes)?;
    let stats = arena.stats();
    info!(
        path = %path.display(),
        container = %song.info.container,
        tracks = song.info.tracks,
        records = song.records,
        duration = ?song.timeline.duration,
        arena_used = stats.allocated,
        arena_capacity = stats.capacity,
        "Loaded song."
    );
    Ok(song)
}

/// Reads a song held in memory into the arena.
pub fn load_bytes(arena: &mut Arena, bytes: &[u8]) -> Result<Song> {
    match detect(bytes) {
        Some(Container::Midi) => smf::load(arena, bytes, Container::Midi),
        Some(Container::Rmid) => smf::load(arena, &bytes[20..], Container::Rmid),
        Some(Container::Mus) => mus::load(arena, bytes),
        None => Err(Error::MalformedInput("unknown file format".into())),
    }
}

/// Guesses the container from the first bytes of a file.
pub fn detect(bytes: &[u8]) -> Option<Container> {
    if bytes.len() < 16 {
        return None;
    }
    if bytes.starts_with(b"MThd") {
        Some(Container::Midi)
    } else if bytes.starts_with(b"RIFF") && &bytes[8..12] == b"RMID" && bytes.len() > 20 {
        Some(Container::Rmid)
    } else if bytes.starts_with(b"MUS\x1a") {
        Some(Container::Mus)
    } else {
        None
    }
}
