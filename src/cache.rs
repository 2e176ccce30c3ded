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
use std::time::Duration;

use tracing::trace;

use crate::arena::{Arena, Handle};
use crate::error::Result;
use crate::event::{Event, EventKind, DEFAULT_TEMPO};

/// The default number of records held ahead of playback.
pub const DEFAULT_WINDOW: usize = 64;

/// The largest number of records the cache will hold ahead of playback.
pub const MAX_WINDOW: usize = 4096;

/// The pause taken before topping up when pacing is requested.
const PACING_DELAY: Duration = Duration::from_millis(2);

/// A read-ahead ring of upcoming records. Records are pulled from the arena in batches:
/// synchronously when the ring runs dry, and opportunistically whenever the record just
/// returned has a delay, since there is idle time before it has to be played.
pub struct EventCache {
    slots: Vec<Event>,
    mask: usize,
    /// The slot most recently returned.
    cursor: usize,
    /// The number of buffered records after the cursor.
    items: usize,
    /// The record following the last buffered one.
    tail: Option<Handle>,
}

impl EventCache {
    /// Creates an empty cache. The window is limited to MAX_WINDOW and rounded up to a
    /// power of two.
    pub fn new(window: usize) -> EventCache {
        let window = window.clamp(1, MAX_WINDOW).next_power_of_two();
        let filler = Event::new(
            0,
            EventKind::Tempo {
                micros_per_quarter: DEFAULT_TEMPO,
            },
        );
        EventCache {
            slots: vec![filler; window],
            mask: window - 1,
            cursor: 0,
            items: 0,
            tail: None,
        }
    }

    /// The number of records the cache can hold.
    pub fn window(&self) -> usize {
        self.slots.len()
    }

    /// Forgets everything buffered. Must be called before reading a new timeline.
    pub fn flush(&mut self) {
        self.cursor = 0;
        self.items = 0;
        self.tail = None;
    }

    /// Returns the record at position, which must be the successor of the record returned by
    /// the previous call (or the root of a timeline after a flush). If allow_delay is set, a
    /// short pause is taken before opportunistic pulls.
    pub fn next(&mut self, arena: &Arena, position: Handle, allow_delay: bool) -> Result<&Event> {
        if self.items == 0 {
            self.fill(arena, position)?;
            return Ok(&self.slots[self.cursor]);
        }

        self.cursor = (self.cursor + 1) & self.mask;
        self.items -= 1;

        if self.slots[self.cursor].delay > 0 && self.has_room() {
            if allow_delay {
                spin_sleep::sleep(PACING_DELAY);
            }
            self.top_up(arena)?;
        }
        Ok(&self.slots[self.cursor])
    }

    fn has_room(&self) -> bool {
        self.tail.is_some() && self.items < self.slots.len() - 1
    }

    /// Pulls as many records as fit, starting at position.
    fn fill(&mut self, arena: &Arena, position: Handle) -> Result<()> {
        let event = Event::load(arena, position)?;
        self.cursor = 0;
        self.slots[0] = event;
        self.tail = event.next;
        self.top_up(arena)?;
        trace!(%position, buffered = self.items + 1, "Cache refilled.");
        Ok(())
    }

    fn top_up(&mut self, arena: &Arena) -> Result<()> {
        while self.has_room() {
            let Some(handle) = self.tail else {
                break;
            };
            let event = Event::load(arena, handle)?;
            self.items += 1;
            self.slots[(self.cursor + self.items) & self.mask] = event;
            self.tail = event.next;
        }
        Ok(())
    }
}
