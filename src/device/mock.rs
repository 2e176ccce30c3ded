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
use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;

/// A call made on a mock sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    SetProgram { channel: u8, program: u8 },
    PitchWheel { channel: u8, value: u16 },
    Controller { channel: u8, id: u8, value: u8 },
    ChannelPressure { channel: u8, value: u8 },
    KeyPressure { channel: u8, note: u8, value: u8 },
    Sysex { channel: u8, bytes: Vec<u8> },
}

/// A mock device. Doesn't actually play anything, but remembers every call, stamped with
/// the time it was made if it has a clock.
#[derive(Clone)]
pub struct MockSink {
    name: String,
    calls: Arc<Mutex<Vec<(u32, Call)>>>,
    clock: Option<Arc<dyn Clock>>,
    ticks: Arc<Mutex<u64>>,
}

impl MockSink {
    /// Gets the given mock device.
    pub fn get(name: &str) -> MockSink {
        MockSink {
            name: name.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            clock: None,
            ticks: Arc::new(Mutex::new(0)),
        }
    }

    /// Stamps every call with a reading of the given clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> MockSink {
        self.clock = Some(clock);
        self
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    /// Returns every call made so far with the time it was made.
    pub fn timed_calls(&self) -> Vec<(u32, Call)> {
        self.calls.lock().clone()
    }

    /// Returns the number of times tick was called.
    pub fn ticks(&self) -> u64 {
        *self.ticks.lock()
    }

    /// Forgets every call.
    pub fn reset(&self) {
        self.calls.lock().clear();
        *self.ticks.lock() = 0;
    }

    fn record(&self, call: Call) {
        let at = self.clock.as_ref().map_or(0, |clock| clock.now());
        debug!(device = self.name, at, call = ?call, "Mock call.");
        self.calls.lock().push((at, call));
    }
}

impl super::DeviceSink for MockSink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.record(Call::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.record(Call::NoteOff { channel, note });
    }

    fn set_program(&mut self, channel: u8, program: u8) {
        self.record(Call::SetProgram { channel, program });
    }

    fn pitch_wheel(&mut self, channel: u8, value: u16) {
        self.record(Call::PitchWheel { channel, value });
    }

    fn controller(&mut self, channel: u8, id: u8, value: u8) {
        self.record(Call::Controller { channel, id, value });
    }

    fn channel_pressure(&mut self, channel: u8, value: u8) {
        self.record(Call::ChannelPressure { channel, value });
    }

    fn key_pressure(&mut self, channel: u8, note: u8, value: u8) {
        self.record(Call::KeyPressure {
            channel,
            note,
            value,
        });
    }

    fn sysex(&mut self, channel: u8, bytes: &[u8]) {
        self.record(Call::Sysex {
            channel,
            bytes: bytes.to_vec(),
        });
    }

    fn tick(&mut self) {
        *self.ticks.lock() += 1;
    }
}

impl fmt::Display for MockSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
