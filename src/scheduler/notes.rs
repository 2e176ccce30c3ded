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

/// Which notes are sounding: one 16 bit channel mask per note number.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NoteStates([u16; 128]);

impl NoteStates {
    pub fn new() -> NoteStates {
        NoteStates([0; 128])
    }

    pub fn set(&mut self, channel: u8, note: u8) {
        self.0[usize::from(note & 0x7f)] |= 1 << (channel & 0x0f);
    }

    pub fn unset(&mut self, channel: u8, note: u8) {
        self.0[usize::from(note & 0x7f)] &= !(1 << (channel & 0x0f));
    }

    pub fn is_on(&self, channel: u8, note: u8) -> bool {
        self.0[usize::from(note & 0x7f)] & (1 << (channel & 0x0f)) != 0
    }

    /// Returns the channels the given note is sounding on, as a bit mask.
    pub fn channels(&self, note: u8) -> u16 {
        self.0[usize::from(note & 0x7f)]
    }

    /// Returns every sounding (channel, note) pair, ordered by note then channel.
    pub fn active(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.0.iter().enumerate().flat_map(|(note, mask)| {
            (0..16u8)
                .filter(move |channel| mask & (1 << channel) != 0)
                .map(move |channel| (channel, note as u8))
        })
    }

    pub fn clear(&mut self) {
        self.0 = [0; 128];
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|mask| *mask == 0)
    }
}

impl Default for NoteStates {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NoteStates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.active()).finish()
    }
}
