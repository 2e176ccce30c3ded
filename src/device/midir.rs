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
use std::{error::Error, fmt};

use midir::{MidiOutput, MidiOutputConnection};
use midly::{
    live::LiveEvent,
    num::{u14, u4, u7},
    MidiMessage, PitchBend,
};
use tracing::{debug, info, warn};

/// A MIDI output port opened through midir.
pub struct Device {
    name: String,
    connection: MidiOutputConnection,
    buf: Vec<u8>,
    /// The number of messages that could not be delivered.
    failures: u64,
}

impl Device {
    fn send_message(&mut self, channel: u8, message: MidiMessage) {
        let event = LiveEvent::Midi {
            channel: u4::new(channel & 0x0f),
            message,
        };
        self.buf.clear();
        if let Err(e) = event.write(&mut self.buf) {
            warn!(err = ?e, "Unable to encode MIDI event.");
            return;
        }
        let buf = std::mem::take(&mut self.buf);
        self.send_raw(&buf);
        self.buf = buf;
    }

    fn send_raw(&mut self, bytes: &[u8]) {
        if let Err(e) = self.connection.send(bytes) {
            self.failures += 1;
            // Warn once, the rest go to debug.
            if self.failures == 1 {
                warn!(device = self.name, err = %e, "Error sending MIDI message.");
            } else {
                debug!(device = self.name, err = %e, "Error sending MIDI message.");
            }
        }
    }
}

impl super::DeviceSink for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send_message(
            channel,
            MidiMessage::NoteOn {
                key: u7::new(note & 0x7f),
                vel: u7::new(velocity & 0x7f),
            },
        );
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.send_message(
            channel,
            MidiMessage::NoteOff {
                key: u7::new(note & 0x7f),
                vel: u7::new(64),
            },
        );
    }

    fn set_program(&mut self, channel: u8, program: u8) {
        self.send_message(
            channel,
            MidiMessage::ProgramChange {
                program: u7::new(program & 0x7f),
            },
        );
    }

    fn pitch_wheel(&mut self, channel: u8, value: u16) {
        self.send_message(
            channel,
            MidiMessage::PitchBend {
                bend: PitchBend(u14::new(value & 0x3fff)),
            },
        );
    }

    fn controller(&mut self, channel: u8, id: u8, value: u8) {
        self.send_message(
            channel,
            MidiMessage::Controller {
                controller: u7::new(id & 0x7f),
                value: u7::new(value & 0x7f),
            },
        );
    }

    fn channel_pressure(&mut self, channel: u8, value: u8) {
        self.send_message(
            channel,
            MidiMessage::ChannelAftertouch {
                vel: u7::new(value & 0x7f),
            },
        );
    }

    fn key_pressure(&mut self, channel: u8, note: u8, value: u8) {
        self.send_message(
            channel,
            MidiMessage::Aftertouch {
                key: u7::new(note & 0x7f),
                vel: u7::new(value & 0x7f),
            },
        );
    }

    fn sysex(&mut self, _channel: u8, bytes: &[u8]) {
        // Escaped messages (F7) carry raw bytes that go out without their status.
        match bytes.split_first() {
            Some((0xf7, rest)) => self.send_raw(rest),
            Some(_) => self.send_raw(bytes),
            None => {}
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Output)", self.name)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.failures > 0 {
            warn!(
                device = self.name,
                failures = self.failures,
                "Some MIDI messages were not delivered."
            );
        }
    }
}

/// Lists midir output ports.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let output = MidiOutput::new("pagemidi output listing")?;
    let mut names = output
        .ports()
        .iter()
        .map(|port| output.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;
    names.sort();
    Ok(names)
}

/// Opens the midir output port whose name contains the given name.
pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
    let output = MidiOutput::new("pagemidi output")?;
    let mut matches = Vec::new();
    for port in output.ports() {
        let port_name = output.port_name(&port)?;
        if port_name.contains(name) {
            matches.push((port_name, port));
        }
    }

    if matches.is_empty() {
        return Err(format!("no device found with name {}", name).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many devices that match ({}), use a less ambiguous device name",
            matches
                .iter()
                .map(|(port_name, _)| port_name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        )
        .into());
    }

    // We've verified that there's only one element in the vector, so this should be safe.
    let (port_name, port) = matches.swap_remove(0);
    let connection = output
        .connect(&port, "pagemidi player")
        .map_err(|e| format!("unable to connect to {}: {}", port_name, e))?;
    info!(device = port_name, "Opened MIDI output.");

    Ok(Device {
        name: port_name,
        connection,
        buf: Vec::with_capacity(8),
        failures: 0,
    })
}
