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
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use parking_lot::{Condvar, Mutex};

/// Why playback of a song was cut short.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stop {
    /// Move on to the next song.
    Next,
    /// Go back to the previous song.
    Previous,
    /// Stop playing altogether.
    Exit,
}

/// What the controller has asked of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    Play,
    Pause,
    Stop(Stop),
}

/// A play control is shared between the scheduler and whatever drives it. It's the
/// scheduler's responsibility to check it at every record boundary.
#[derive(Clone)]
pub struct PlayControl {
    request: Arc<Mutex<Request>>,
    /// Wakes the scheduler while it is paused.
    condvar: Arc<Condvar>,
    /// Note velocities are scaled by this percentage.
    volume: Arc<AtomicU8>,
}

impl PlayControl {
    /// Creates a new play control.
    pub fn new() -> PlayControl {
        PlayControl {
            request: Arc::new(Mutex::new(Request::Play)),
            condvar: Arc::new(Condvar::new()),
            volume: Arc::new(AtomicU8::new(100)),
        }
    }

    /// The playback volume, from 0 to 100.
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Sets the playback volume, capped at 100.
    pub fn set_volume(&self, volume: u8) {
        self.volume.store(volume.min(100), Ordering::Relaxed);
    }

    /// Moves the volume up or down by the given step, staying within 0 and 100.
    pub fn adjust_volume(&self, step: i8) {
        let volume = (i16::from(self.volume()) + i16::from(step)).clamp(0, 100);
        self.set_volume(volume as u8);
    }

    /// Returns the pending request.
    pub fn poll(&self) -> Request {
        *self.request.lock()
    }

    /// Returns true if a pause has been requested.
    pub fn is_paused(&self) -> bool {
        self.poll() == Request::Pause
    }

    /// Returns the stop request, if any.
    pub fn stopped(&self) -> Option<Stop> {
        match self.poll() {
            Request::Stop(stop) => Some(stop),
            _ => None,
        }
    }

    /// Asks playback to pause. Ignored once a stop has been requested.
    pub fn pause(&self) {
        let mut request = self.request.lock();
        if *request == Request::Play {
            *request = Request::Pause;
        }
    }

    /// Resumes paused playback.
    pub fn resume(&self) {
        let mut request = self.request.lock();
        if *request == Request::Pause {
            *request = Request::Play;
            self.condvar.notify_all();
        }
    }

    /// Pauses if playing, resumes if paused.
    pub fn toggle_pause(&self) {
        let mut request = self.request.lock();
        match *request {
            Request::Play => *request = Request::Pause,
            Request::Pause => {
                *request = Request::Play;
                self.condvar.notify_all();
            }
            Request::Stop(_) => {}
        }
    }

    /// Asks playback to stop. An exit request is never downgraded.
    pub fn stop(&self, stop: Stop) {
        let mut request = self.request.lock();
        if *request != Request::Stop(Stop::Exit) {
            *request = Request::Stop(stop);
            self.condvar.notify_all();
        }
    }

    /// Blocks while paused. Returns the stop request if one arrived in the meantime.
    pub fn wait_while_paused(&self) -> Option<Stop> {
        let mut request = self.request.lock();
        self.condvar
            .wait_while(&mut request, |request| *request == Request::Pause);
        match *request {
            Request::Stop(stop) => Some(stop),
            _ => None,
        }
    }

    /// Clears a next or previous request once it has been acted on. Exit requests stay.
    pub fn rearm(&self) {
        let mut request = self.request.lock();
        if matches!(*request, Request::Stop(Stop::Next) | Request::Stop(Stop::Previous)) {
            *request = Request::Play;
        }
    }
}

impl Default for PlayControl {
    fn default() -> Self {
        Self::new()
    }
}
