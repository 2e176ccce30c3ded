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
    fmt, fs,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use rand::{seq::SliceRandom, Rng};
use tracing::{info, span, Level, Span};

use crate::util::display_name;

/// An ordered list of song files and a position within it.
pub struct Playlist {
    /// The songs that this playlist will play.
    songs: Vec<PathBuf>,
    /// The current position of the playlist.
    position: RwLock<usize>,
    /// The logging span.
    span: Span,
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Playlist ({} songs):", self.songs.len())?;
        for song in self.songs.iter() {
            writeln!(f, "  - {}", display_name(song))?;
        }

        Ok(())
    }
}

impl Playlist {
    /// Creates a new playlist. A playlist needs at least one song.
    pub fn new(songs: Vec<PathBuf>) -> Result<Playlist, Box<dyn Error>> {
        if songs.is_empty() {
            return Err("playlist is empty".into());
        }

        Ok(Playlist {
            songs,
            position: RwLock::new(0),
            span: span!(Level::INFO, "playlist"),
        })
    }

    /// Reads an M3U playlist. Relative entries are resolved against the playlist's directory.
    pub fn from_m3u(path: &Path) -> Result<Playlist, Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Playlist::new(parse_m3u(&contents, base))
            .map_err(|e| format!("{}: {}", path.display(), e).into())
    }

    /// Shuffles the songs and moves back to the first one.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.songs.shuffle(rng);
        *self.position.write() = 0;
    }

    /// The number of songs in the playlist.
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Always false, a playlist is never empty.
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// The current position in the playlist.
    pub fn position(&self) -> usize {
        *self.position.read()
    }

    /// Moves to the next song and returns it. Returns None at the end of the playlist, where
    /// the position stays.
    pub fn next(&self) -> Option<PathBuf> {
        let _enter = self.span.enter();

        let mut position = self.position.write();
        if *position + 1 >= self.songs.len() {
            return None;
        }
        *position += 1;

        let current = &self.songs[*position];
        info!(
            position = *position,
            song = display_name(current),
            "Moving to next playlist position."
        );
        Some(current.clone())
    }

    /// Moves to the previous song and returns it. At the start of the playlist, the position
    /// stays.
    pub fn prev(&self) -> PathBuf {
        let _enter = self.span.enter();

        let mut position = self.position.write();
        *position = position.saturating_sub(1);

        let current = &self.songs[*position];
        info!(
            position = *position,
            song = display_name(current),
            "Moving to previous playlist position."
        );
        current.clone()
    }

    /// Returns the song at the current position of the playlist.
    pub fn current(&self) -> PathBuf {
        self.songs[*self.position.read()].clone()
    }
}

/// Extracts song paths from M3U contents, skipping comments and blank lines.
fn parse_m3u(contents: &str, base: &Path) -> Vec<PathBuf> {
    contents
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let path = Path::new(line);
            if path.is_relative() {
                base.join(path)
            } else {
                path.to_path_buf()
            }
        })
        .collect()
}
