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
    thread,
    time::{Duration, SystemTime},
};

use crate::arena::{Arena, Handle};
use crate::event::{Event, EventKind, TrackWriter};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// A note on for the given note on channel 0.
pub fn note_on(note: u8) -> EventKind {
    EventKind::NoteOn {
        channel: 0,
        note,
        velocity: 100,
    }
}

/// Writes the given records into the arena as one list and returns its root.
pub fn build_list(arena: &mut Arena, records: &[(u32, EventKind)]) -> Option<Handle> {
    let mut writer = TrackWriter::open(arena);
    for (delay, kind) in records {
        writer.append(*delay, *kind).unwrap();
    }
    writer.close().unwrap().root
}

/// Follows a list through raw arena reads and returns its records.
pub fn collect(arena: &Arena, root: Option<Handle>) -> Vec<Event> {
    let mut events = Vec::new();
    let mut next = root;
    while let Some(handle) = next {
        let event = Event::load(arena, handle).unwrap();
        next = event.next;
        events.push(event);
        assert!(events.len() < 1_000_000, "list does not terminate");
    }
    events
}

/// Returns the cumulative tick position of each record.
pub fn absolute_times(events: &[Event]) -> Vec<u64> {
    events
        .iter()
        .scan(0u64, |at, event| {
            *at += u64::from(event.delay);
            Some(*at)
        })
        .collect()
}

/// Builds Standard MIDI Files in memory.
pub struct SmfBuilder {
    format: u16,
    division: u16,
    tracks: Vec<Vec<u8>>,
}

impl SmfBuilder {
    pub fn new(format: u16, division: u16) -> SmfBuilder {
        SmfBuilder {
            format,
            division,
            tracks: Vec::new(),
        }
    }

    /// Starts a new track.
    pub fn track(mut self) -> SmfBuilder {
        self.tracks.push(Vec::new());
        self
    }

    /// Adds a raw event to the current track.
    pub fn event(mut self, delta: u32, bytes: &[u8]) -> SmfBuilder {
        if self.tracks.is_empty() {
            self.tracks.push(Vec::new());
        }
        if let Some(track) = self.tracks.last_mut() {
            write_vlq(track, delta);
            track.extend_from_slice(bytes);
        }
        self
    }

    /// Builds the file. Every track is closed with an end of track event.
    pub fn build(&self) -> Vec<u8> {
        let mut smf = Vec::new();
        smf.extend_from_slice(b"MThd");
        smf.extend_from_slice(&6u32.to_be_bytes());
        smf.extend_from_slice(&self.format.to_be_bytes());
        smf.extend_from_slice(&(self.tracks.len() as u16).to_be_bytes());
        smf.extend_from_slice(&self.division.to_be_bytes());
        for track in &self.tracks {
            smf.extend_from_slice(b"MTrk");
            smf.extend_from_slice(&(track.len() as u32 + 4).to_be_bytes());
            smf.extend_from_slice(track);
            smf.extend_from_slice(&[0x00, 0xff, 0x2f, 0x00]);
        }
        smf
    }

    /// Wraps the file in a RIFF RMID container.
    pub fn build_rmid(&self) -> Vec<u8> {
        let smf = self.build();
        let mut rmid = Vec::new();
        rmid.extend_from_slice(b"RIFF");
        rmid.extend_from_slice(&((smf.len() + 12) as u32).to_le_bytes());
        rmid.extend_from_slice(b"RMIDdata");
        rmid.extend_from_slice(&(smf.len() as u32).to_le_bytes());
        rmid.extend_from_slice(&smf);
        rmid
    }
}

fn write_vlq(out: &mut Vec<u8>, mut value: u32) {
    let mut bytes = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        bytes.push(((value & 0x7f) as u8) | 0x80);
        value >>= 7;
    }
    out.extend(bytes.iter().rev());
}
