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
use std::{error::Error as StdError, fmt};

use crate::error::{Error, Result};

mod midir;
mod mock;

pub use mock::{Call, MockSink};

/// The GM "master volume" reset message, sent after everything else has been silenced.
const MASTER_VOLUME_RESET: [u8; 8] = [0xf0, 0x7f, 0x7f, 0x04, 0x01, 0x7f, 0x7f, 0xf7];

/// Channel mode controllers used to silence a channel.
const ALL_SOUND_OFF: u8 = 120;
const RESET_ALL_CONTROLLERS: u8 = 121;
const ALL_NOTES_OFF: u8 = 123;

/// Something that can produce sound from MIDI messages. Every call is fire-and-forget:
/// a sink that fails to deliver a message logs it and carries on.
pub trait DeviceSink: fmt::Display + Send {
    /// Returns the name of the device.
    fn name(&self) -> String;

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, note: u8);

    fn set_program(&mut self, channel: u8, program: u8);

    /// Moves the pitch wheel. 8192 is the center.
    fn pitch_wheel(&mut self, channel: u8, value: u16);

    fn controller(&mut self, channel: u8, id: u8, value: u8);

    fn channel_pressure(&mut self, channel: u8, value: u8);

    fn key_pressure(&mut self, channel: u8, note: u8, value: u8);

    /// Sends a complete SysEx message, starting with its status byte.
    fn sysex(&mut self, channel: u8, bytes: &[u8]);

    /// Called once per scheduler iteration so the device can do its own housekeeping.
    fn tick(&mut self) {}

    /// Silences everything and resets the controllers of every channel.
    fn clear(&mut self) {
        for channel in 0..16 {
            self.controller(channel, ALL_NOTES_OFF, 0);
            self.controller(channel, ALL_SOUND_OFF, 0);
            self.controller(channel, RESET_ALL_CONTROLLERS, 0);
        }
        self.sysex(0x7f, &MASTER_VOLUME_RESET);
    }
}

/// Lists the names of the MIDI outputs known to midir.
pub fn list_devices() -> std::result::Result<Vec<String>, Box<dyn StdError>> {
    midir::list()
}

/// Gets a device with the given name. Names starting with "mock" produce a mock sink.
pub fn get(name: &str) -> Result<Box<dyn DeviceSink>> {
    if name.starts_with("mock") {
        return Ok(Box::new(MockSink::get(name)));
    }

    let device = midir::get(name).map_err(|e| Error::Device(e.to_string()))?;
    Ok(Box::new(device))
}
