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
use super::{Container, Song, SongInfo};
use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::event::{EventKind, TrackWriter};
use crate::merge::merge_all;
use crate::scheduler::Timeline;

/// MUS scores tick 140 times a second: 70 ticks to a half second quarter note.
const TEMPO: u32 = 500_000;
const TICKS_PER_QUARTER: u16 = 70;

/// MUS controller numbers 1 to 9 mapped to MIDI controllers.
const CONTROLLERS: [u8; 10] = [0, 0, 1, 7, 10, 11, 91, 93, 64, 67];

const RELEASE_NOTE: u8 = 0;
const PLAY_NOTE: u8 = 1;
const PITCH_WHEEL: u8 = 2;
const SYSTEM: u8 = 3;
const CONTROLLER: u8 = 4;
const SCORE_END: u8 = 6;

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8> {
        let byte = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| malformed("unexpected end of score"))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a data byte, which must not have its top bit set.
    fn data(&mut self) -> Result<u8> {
        match self.byte()? {
            byte if byte & 0x80 == 0 => Ok(byte),
            byte => Err(malformed(&format!("unexpected byte {:#04x}", byte))),
        }
    }
}

fn malformed(message: &str) -> Error {
    Error::MalformedInput(format!("MUS: {}", message))
}

/// Loads a MUS score. The whole score is a single track.
pub(super) fn load(arena: &mut Arena, bytes: &[u8]) -> Result<Song> {
    let start = usize::from(u16::from_le_bytes([bytes[6], bytes[7]]));
    let mut reader = Reader { bytes, pos: start };
    let mut volumes = [0u8; 16];
    let mut channels = 0u16;
    let mut wait = 0u32;

    let mut writer = TrackWriter::open(arena);
    writer.append(
        0,
        EventKind::Tempo {
            micros_per_quarter: TEMPO,
        },
    )?;

    loop {
        let descriptor = reader.byte()?;
        // Percussion is channel 15 in MUS and channel 9 in MIDI.
        let channel = match descriptor & 0x0f {
            15 => 9,
            9 => 15,
            channel => channel,
        };

        let kind = match (descriptor >> 4) & 0x07 {
            RELEASE_NOTE => Some(EventKind::NoteOff {
                channel,
                note: reader.data()?,
            }),
            PLAY_NOTE => {
                channels |= 1 << channel;
                let note = reader.byte()?;
                if note & 0x80 != 0 {
                    volumes[usize::from(channel)] = reader.byte()? & 0x7f;
                }
                let note = note & 0x7f;
                match volumes[usize::from(channel)] {
                    0 => Some(EventKind::NoteOff { channel, note }),
                    velocity => Some(EventKind::NoteOn {
                        channel,
                        note,
                        velocity,
                    }),
                }
            }
            PITCH_WHEEL => Some(EventKind::Pitch {
                channel,
                value: u16::from(reader.byte()?) << 6,
            }),
            SYSTEM => {
                reader.data()?;
                None
            }
            CONTROLLER => {
                let id = reader.byte()?;
                let value = reader.byte()?;
                match id {
                    0 if value < 0x80 => Some(EventKind::ProgramChange {
                        channel,
                        program: value,
                    }),
                    1..=9 => Some(EventKind::Control {
                        channel,
                        id: CONTROLLERS[usize::from(id)],
                        value: value.min(0x7f),
                    }),
                    _ => return Err(malformed(&format!("invalid controller {}", id))),
                }
            }
            SCORE_END => break,
            other => return Err(malformed(&format!("unknown event type {}", other))),
        };

        // The wait before the next event follows this one.
        let delay = wait;
        wait = 0;
        if descriptor & 0x80 != 0 {
            loop {
                let byte = reader.byte()?;
                wait = (wait << 7) | u32::from(byte & 0x7f);
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }

        match kind {
            Some(kind) => writer.append(delay, kind)?,
            None => writer.skip(delay),
        }
    }

    let track = writer.close()?;
    let merged = merge_all(arena, [track.root], TICKS_PER_QUARTER)?;
    Ok(Song {
        info: SongInfo {
            container: Container::Mus,
            titles: Vec::new(),
            tracks: 1,
            channels,
        },
        timeline: Timeline {
            root: merged.root,
            duration: merged.duration,
            ticks_per_quarter: TICKS_PER_QUARTER,
        },
        records: merged.records,
    })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::arena::LocalPool;
    use crate::testutil::{absolute_times, collect};

    fn score(events: &[u8]) -> Vec<u8> {
        let mut mus = b"MUS\x1a".to_vec();
        mus.extend_from_slice(&(events.len() as u16).to_le_bytes());
        mus.extend_from_slice(&16u16.to_le_bytes());
        mus.extend_from_slice(&[0; 8]);
        mus.extend_from_slice(events);
        mus
    }

    #[test]
    fn test_load() {
        let mus = score(&[
            // Play note 60 at velocity 100 on channel 0, then wait 70 ticks.
            0x90, 0x80 | 60, 100, 70,
            // Release it.
            0x00, 60,
            // Percussion.
            0x1f, 0x80 | 36, 90,
            // Volume on channel 1.
            0x41, 3, 100,
            // Centered pitch wheel.
            0x21, 128,
            // A system event, ignored.
            0x31, 10,
            // Program change.
            0x41, 0, 20,
            0x60,
        ]);

        let mut arena = Arena::new(LocalPool::new(4096, 2).unwrap());
        let song = super::super::load_bytes(&mut arena, &mus).unwrap();
        assert_eq!(Container::Mus, song.info.container);
        assert_eq!((1 << 0) | (1 << 9), song.info.channels);
        assert_eq!(Duration::from_millis(500), song.timeline.duration);

        let events = collect(&arena, song.timeline.root);
        assert_eq!(vec![0, 0, 70, 70, 70, 70, 70], absolute_times(&events));
        assert_eq!(
            vec![
                EventKind::Tempo {
                    micros_per_quarter: TEMPO
                },
                EventKind::NoteOn {
                    channel: 0,
                    note: 60,
                    velocity: 100
                },
                EventKind::NoteOff {
                    channel: 0,
                    note: 60
                },
                EventKind::NoteOn {
                    channel: 9,
                    note: 36,
                    velocity: 90
                },
                EventKind::Control {
                    channel: 1,
                    id: 7,
                    value: 100
                },
                EventKind::Pitch {
                    channel: 1,
                    value: 0x2000
                },
                EventKind::ProgramChange {
                    channel: 1,
                    program: 20
                },
            ],
            events.iter().map(|e| e.kind).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_malformed() {
        let mut arena = Arena::new(LocalPool::new(4096, 2).unwrap());
        for events in [&[0x90, 0x80 | 60][..], &[0x00, 0x80], &[0x41, 12, 0], &[0x50]] {
            let result = super::super::load_bytes(&mut arena, &score(events));
            assert!(
                matches!(result, Err(Error::MalformedInput(_))),
                "{:?} was accepted",
                events
            );
        }
    }
}
