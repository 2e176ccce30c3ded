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
use midly::{EventIter, Format, MetaMessage, MidiMessage, Timing, TrackEventKind};
use tracing::debug;

use super::{Container, Song, SongInfo, MAX_TITLES};
use crate::arena::{Arena, Handle};
use crate::error::{Error, Result};
use crate::event::{EventKind, TrackWriter, DEFAULT_TEMPO};
use crate::merge::{merge, Merged};
use crate::scheduler::Timeline;

/// The most tracks a file may have.
pub const MAX_TRACKS: usize = 64;

/// Text pulled from the meta events of one track.
#[derive(Default)]
struct TrackText {
    name: Option<String>,
    copyright: Option<String>,
    text: Option<String>,
}

/// What loading a single track produced.
struct LoadedTrack {
    merged: Merged,
    ticks: u64,
    text: TrackText,
}

/// Loads a Standard MIDI File. Every track is streamed into the arena and merged into
/// the timeline as soon as it has been read.
pub(super) fn load(arena: &mut Arena, bytes: &[u8], container: Container) -> Result<Song> {
    let (header, tracks) = midly::parse(bytes)?;

    if header.format == Format::Sequential {
        return Err(Error::MalformedInput("unsupported MIDI format 2".into()));
    }
    let ticks_per_quarter = match header.timing {
        Timing::Metrical(tpq) if tpq.as_int() > 0 => tpq.as_int(),
        Timing::Metrical(_) => {
            return Err(Error::MalformedInput("zero ticks per quarter note".into()))
        }
        Timing::Timecode(..) => {
            return Err(Error::MalformedInput("SMPTE timing is not supported".into()))
        }
    };
    let declared = usize::from(u16::from_be_bytes([bytes[10], bytes[11]]));
    if declared > MAX_TRACKS {
        return Err(Error::MalformedInput(format!(
            "too many tracks ({}, max: {})",
            declared, MAX_TRACKS
        )));
    }

    let mut channels = 0u16;
    let mut titles: Vec<String> = Vec::new();
    let mut first_text = TrackText::default();
    let mut timeline = Merged::default();
    let mut count = 0;

    for (index, track) in tracks.enumerate() {
        if index >= MAX_TRACKS {
            return Err(Error::MalformedInput(format!(
                "too many tracks (max: {})",
                MAX_TRACKS
            )));
        }
        let mut loaded = load_track(arena, track?, timeline.root, ticks_per_quarter, &mut channels)?;
        debug!(
            track = index,
            ticks = loaded.ticks,
            records = loaded.merged.records,
            "Loaded track."
        );

        // Useful text tends to live in the names of empty tracks.
        if loaded.ticks == 0 || index == 0 {
            if let Some(name) = loaded.text.name.take() {
                if titles.len() < MAX_TITLES {
                    titles.push(name);
                }
            }
        }
        if index == 0 {
            first_text = loaded.text;
        }
        timeline = loaded.merged;
        count += 1;
    }

    if titles.is_empty() {
        if let Some(text) = first_text.text {
            titles.extend(text.lines().map(str::to_string).take(MAX_TITLES));
        }
    }
    if let Some(copyright) = first_text.copyright {
        if titles.len() < MAX_TITLES {
            titles.push(copyright);
        }
    }

    Ok(Song {
        info: SongInfo {
            container,
            titles,
            tracks: count,
            channels,
        },
        timeline: Timeline {
            root: timeline.root,
            duration: timeline.duration,
            ticks_per_quarter,
        },
        records: timeline.records,
    })
}

/// Streams one track into the arena and merges it with the timeline so far.
fn load_track(
    arena: &mut Arena,
    events: EventIter<'_>,
    timeline: Option<Handle>,
    ticks_per_quarter: u16,
    channels: &mut u16,
) -> Result<LoadedTrack> {
    let mut text = TrackText::default();
    let mut sysex = Vec::new();
    let mut writer = TrackWriter::open(arena);

    for event in events {
        let event = event?;
        let delay = event.delta.as_int();
        match event.kind {
            TrackEventKind::Midi { channel, message } => {
                let kind = channel_event(channel.as_int(), message);
                if let EventKind::NoteOn { channel, .. } = kind {
                    *channels |= 1 << channel;
                }
                writer.append(delay, kind)?;
            }
            TrackEventKind::SysEx(data) => {
                sysex.clear();
                sysex.push(0xf0);
                sysex.extend_from_slice(data);
                writer.append_sysex(delay, &sysex)?;
            }
            TrackEventKind::Escape(data) => {
                sysex.clear();
                sysex.push(0xf7);
                sysex.extend_from_slice(data);
                writer.append_sysex(delay, &sysex)?;
            }
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) if tempo.as_int() > 0 => {
                writer.append(
                    delay,
                    EventKind::Tempo {
                        micros_per_quarter: tempo.as_int(),
                    },
                )?;
            }
            TrackEventKind::Meta(MetaMessage::EndOfTrack) => {
                writer.skip(delay);
                break;
            }
            TrackEventKind::Meta(meta) => {
                match meta {
                    MetaMessage::TrackName(name) => text.name = title(name),
                    MetaMessage::Copyright(copyright) if text.copyright.is_none() => {
                        text.copyright = title(copyright)
                    }
                    MetaMessage::Text(line) | MetaMessage::Marker(line)
                        if text.text.is_none() =>
                    {
                        text.text = title(line)
                    }
                    _ => {}
                }
                writer.skip(delay);
            }
        }
    }

    let track = writer.close()?;
    let merged = merge(arena, timeline, track.root, DEFAULT_TEMPO, ticks_per_quarter)?;
    Ok(LoadedTrack {
        merged,
        ticks: track.ticks,
        text,
    })
}

/// Converts a channel message into a record. A note on with no velocity is a note off.
fn channel_event(channel: u8, message: MidiMessage) -> EventKind {
    match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => EventKind::NoteOn {
            channel,
            note: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            EventKind::NoteOff {
                channel,
                note: key.as_int(),
            }
        }
        MidiMessage::Aftertouch { key, vel } => EventKind::KeyPressure {
            channel,
            note: key.as_int(),
            pressure: vel.as_int(),
        },
        MidiMessage::Controller { controller, value } => EventKind::Control {
            channel,
            id: controller.as_int(),
            value: value.as_int(),
        },
        MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
            channel,
            program: program.as_int(),
        },
        MidiMessage::ChannelAftertouch { vel } => EventKind::ChannelPressure {
            channel,
            pressure: vel.as_int(),
        },
        MidiMessage::PitchBend { bend } => EventKind::Pitch {
            channel,
            value: bend.0.as_int(),
        },
    }
}

/// Decodes meta event text, dropping trailing whitespace. Empty text yields None.
fn title(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    (!text.is_empty()).then(|| text.to_string())
}
