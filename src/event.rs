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
use tracing::{trace, warn};

use crate::arena::{Arena, Handle};
use crate::error::{Error, Result};

/// The serialized size of every record, whatever its kind.
pub const RECORD_SIZE: usize = 16;

/// SysEx payloads larger than this are dropped at load time.
pub const MAX_SYSEX_LEN: usize = 4096;

/// The default tempo, in microseconds per quarter note (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Stored in place of a next handle at the end of a list.
const END_OF_LIST: u32 = u32::MAX;

const TAG_NOTE_ON: u8 = 1;
const TAG_NOTE_OFF: u8 = 2;
const TAG_PROGRAM_CHANGE: u8 = 3;
const TAG_CONTROL: u8 = 4;
const TAG_PITCH: u8 = 5;
const TAG_CHANNEL_PRESSURE: u8 = 6;
const TAG_KEY_PRESSURE: u8 = 7;
const TAG_TEMPO: u8 = 8;
const TAG_SYSEX: u8 = 9;

/// What a record does when it is dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ProgramChange { channel: u8, program: u8 },
    Control { channel: u8, id: u8, value: u8 },
    /// A 14 bit pitch wheel position, 8192 being the center.
    Pitch { channel: u8, value: u16 },
    ChannelPressure { channel: u8, pressure: u8 },
    KeyPressure { channel: u8, note: u8, pressure: u8 },
    /// A new tempo in microseconds per quarter note. Never zero.
    Tempo { micros_per_quarter: u32 },
    /// A SysEx message kept out of line in the arena.
    Sysex { blob: Handle, len: u16 },
}

/// A timed record. The delay is counted in ticks from the previous record of whatever
/// list the record currently belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub delay: u32,
    pub next: Option<Handle>,
}

impl Event {
    /// Creates an unlinked event.
    pub fn new(delay: u32, kind: EventKind) -> Event {
        Event {
            kind,
            delay,
            next: None,
        }
    }

    /// Reads the event stored at the given handle.
    pub fn load(arena: &Arena, handle: Handle) -> Result<Event> {
        let mut buf = [0u8; RECORD_SIZE];
        arena.pull(handle, &mut buf)?;
        Event::decode(handle, &buf)
    }

    /// Writes the event at the given handle.
    pub fn store(&self, arena: &mut Arena, handle: Handle) -> Result<()> {
        arena.push(handle, &self.encode())
    }

    /// Serializes the event: a tag byte, seven payload bytes, then the delay and the next
    /// handle as little endian words.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        match self.kind {
            EventKind::NoteOn {
                channel,
                note,
                velocity,
            } => buf[..4].copy_from_slice(&[TAG_NOTE_ON, channel, note, velocity]),
            EventKind::NoteOff { channel, note } => {
                buf[..3].copy_from_slice(&[TAG_NOTE_OFF, channel, note])
            }
            EventKind::ProgramChange { channel, program } => {
                buf[..3].copy_from_slice(&[TAG_PROGRAM_CHANGE, channel, program])
            }
            EventKind::Control { channel, id, value } => {
                buf[..4].copy_from_slice(&[TAG_CONTROL, channel, id, value])
            }
            EventKind::Pitch { channel, value } => {
                buf[..2].copy_from_slice(&[TAG_PITCH, channel]);
                buf[2..4].copy_from_slice(&value.to_le_bytes());
            }
            EventKind::ChannelPressure { channel, pressure } => {
                buf[..3].copy_from_slice(&[TAG_CHANNEL_PRESSURE, channel, pressure])
            }
            EventKind::KeyPressure {
                channel,
                note,
                pressure,
            } => buf[..4].copy_from_slice(&[TAG_KEY_PRESSURE, channel, note, pressure]),
            EventKind::Tempo { micros_per_quarter } => {
                buf[0] = TAG_TEMPO;
                buf[1..5].copy_from_slice(&micros_per_quarter.to_le_bytes());
            }
            EventKind::Sysex { blob, len } => {
                buf[0] = TAG_SYSEX;
                buf[1..5].copy_from_slice(&blob.to_raw().to_le_bytes());
                buf[5..7].copy_from_slice(&len.to_le_bytes());
            }
        }
        buf[8..12].copy_from_slice(&self.delay.to_le_bytes());
        let next = self.next.map_or(END_OF_LIST, Handle::to_raw);
        buf[12..16].copy_from_slice(&next.to_le_bytes());
        buf
    }

    /// Deserializes an event read from the given handle.
    pub fn decode(handle: Handle, buf: &[u8; RECORD_SIZE]) -> Result<Event> {
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let half = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let channel = buf[1] & 0x0f;

        let kind = match buf[0] {
            TAG_NOTE_ON => EventKind::NoteOn {
                channel,
                note: buf[2] & 0x7f,
                velocity: buf[3] & 0x7f,
            },
            TAG_NOTE_OFF => EventKind::NoteOff {
                channel,
                note: buf[2] & 0x7f,
            },
            TAG_PROGRAM_CHANGE => EventKind::ProgramChange {
                channel,
                program: buf[2] & 0x7f,
            },
            TAG_CONTROL => EventKind::Control {
                channel,
                id: buf[2] & 0x7f,
                value: buf[3] & 0x7f,
            },
            TAG_PITCH => EventKind::Pitch {
                channel,
                value: half(2) & 0x3fff,
            },
            TAG_CHANNEL_PRESSURE => EventKind::ChannelPressure {
                channel,
                pressure: buf[2] & 0x7f,
            },
            TAG_KEY_PRESSURE => EventKind::KeyPressure {
                channel,
                note: buf[2] & 0x7f,
                pressure: buf[3] & 0x7f,
            },
            TAG_TEMPO if word(1) > 0 => EventKind::Tempo {
                micros_per_quarter: word(1),
            },
            TAG_SYSEX => EventKind::Sysex {
                blob: Handle::from_raw(word(1)),
                len: half(5),
            },
            tag => return Err(Error::CorruptRecord { handle, tag }),
        };

        let next = match word(12) {
            END_OF_LIST => None,
            raw => Some(Handle::from_raw(raw)),
        };
        Ok(Event {
            kind,
            delay: word(8),
            next,
        })
    }
}

/// Copies a SysEx payload into the arena. The stored size is rounded up to an even number
/// of bytes, the granularity secondary memory moves work in. Returns None for payloads
/// that are too large to keep.
pub fn store_sysex(arena: &mut Arena, bytes: &[u8]) -> Result<Option<EventKind>> {
    if bytes.is_empty() || bytes.len() > MAX_SYSEX_LEN {
        return Ok(None);
    }

    let stored = bytes.len() + (bytes.len() & 1);
    let blob = arena.allocate(stored)?;
    let mut padded = bytes.to_vec();
    padded.resize(stored, 0);
    arena.push(blob, &padded)?;
    Ok(Some(EventKind::Sysex {
        blob,
        len: bytes.len() as u16,
    }))
}

/// Reads a SysEx payload back into buf.
pub fn load_sysex(arena: &Arena, blob: Handle, len: u16, buf: &mut Vec<u8>) -> Result<()> {
    let len = usize::from(len);
    buf.clear();
    buf.resize(len + (len & 1), 0);
    arena.pull(blob, buf)?;
    buf.truncate(len);
    Ok(())
}

/// The result of writing one track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrittenTrack {
    /// The first record of the track, if anything was written.
    pub root: Option<Handle>,
    /// The length of the track in ticks, including skipped events.
    pub ticks: u64,
    /// The number of records written.
    pub records: usize,
}

/// Streams records into the arena as a singly linked list. The most recent record is held
/// back until its successor is known, so each record is pushed exactly once. The list is
/// terminated when the writer is closed or dropped, whichever happens first.
pub struct TrackWriter<'a> {
    arena: &'a mut Arena,
    root: Option<Handle>,
    pending: Option<(Handle, Event)>,
    skipped: u32,
    ticks: u64,
    records: usize,
    closed: bool,
}

impl<'a> TrackWriter<'a> {
    /// Opens a new, empty list in the arena.
    pub fn open(arena: &'a mut Arena) -> TrackWriter<'a> {
        TrackWriter {
            arena,
            root: None,
            pending: None,
            skipped: 0,
            ticks: 0,
            records: 0,
            closed: false,
        }
    }

    /// Accounts for an event that will not be stored. Its delay is carried over to the
    /// next record that is.
    pub fn skip(&mut self, delay: u32) {
        self.skipped = self.skipped.saturating_add(delay);
        self.ticks += u64::from(delay);
    }

    /// Appends a record.
    pub fn append(&mut self, delay: u32, kind: EventKind) -> Result<()> {
        let handle = self.arena.allocate(RECORD_SIZE)?;
        let delay_with_skipped = delay.saturating_add(self.skipped);

        match self.pending.take() {
            Some((prev_handle, mut prev)) => {
                prev.next = Some(handle);
                prev.store(self.arena, prev_handle)?;
            }
            None => self.root = Some(handle),
        }

        trace!(%handle, delay = delay_with_skipped, kind = ?kind, "Appending record.");
        self.pending = Some((handle, Event::new(delay_with_skipped, kind)));
        self.skipped = 0;
        self.ticks += u64::from(delay);
        self.records += 1;
        Ok(())
    }

    /// Stores a SysEx payload and appends a record referring to it. Oversized payloads are
    /// skipped.
    pub fn append_sysex(&mut self, delay: u32, bytes: &[u8]) -> Result<()> {
        match store_sysex(self.arena, bytes)? {
            Some(kind) => self.append(delay, kind),
            None => {
                warn!(len = bytes.len(), "Skipping oversized SysEx message.");
                self.skip(delay);
                Ok(())
            }
        }
    }

    /// Terminates the list and returns what was written.
    pub fn close(mut self) -> Result<WrittenTrack> {
        self.finish()?;
        Ok(WrittenTrack {
            root: self.root,
            ticks: self.ticks,
            records: self.records,
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.closed = true;
        match self.pending.take() {
            Some((handle, last)) => last.store(self.arena, handle),
            None => Ok(()),
        }
    }
}

impl Drop for TrackWriter<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.finish() {
            warn!(err = %e, "Unable to terminate track while dropping writer.");
        }
    }
}
