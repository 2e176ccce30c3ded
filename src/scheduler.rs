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

use crossbeam_channel::Sender;
use tracing::{debug, info, span, trace, warn, Level};

use crate::arena::{Arena, Handle};
use crate::cache::EventCache;
use crate::clock::{is_due, Clock};
use crate::device::DeviceSink;
use crate::error::Result;
use crate::event::{load_sysex, Event, EventKind, DEFAULT_TEMPO};
use crate::playsync::{PlayControl, Request, Stop};
use crate::timing::TickConverter;

mod notes;
mod status;

pub use notes::NoteStates;
pub use status::{State, Status};

use status::Publisher;

/// The longest stretch the scheduler idles for in power saving mode.
const IDLE_SLICE: u32 = 1_000;

/// The longest single wait the wrapping clock can express.
const MAX_WAIT: u32 = u32::MAX / 2;

/// Converts a wait to clock microseconds, capping it at MAX_WAIT.
fn clamp_wait(micros: u128) -> u32 {
    match u32::try_from(micros) {
        Ok(micros) if micros <= MAX_WAIT => micros,
        _ => {
            warn!(
                micros = u64::try_from(micros).unwrap_or(u64::MAX),
                max = MAX_WAIT,
                "Wait is too long for the clock, shortening it."
            );
            MAX_WAIT
        }
    }
}

/// A merged timeline ready to be played.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeline {
    pub root: Option<Handle>,
    pub duration: Duration,
    pub ticks_per_quarter: u16,
}

/// Playback tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// Pause briefly before opportunistic cache refills.
    pub pacing_delay: bool,
    /// Idle instead of spinning while waiting for the next record.
    pub power_save: bool,
    /// How long to wait before the first record.
    pub start_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            pacing_delay: false,
            power_save: true,
            start_delay: Duration::ZERO,
        }
    }
}

/// How playback of a song ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every record was played.
    Finished,
    /// Playback was stopped early.
    Cancelled(Stop),
}

/// Plays timelines in real time.
pub struct Scheduler<'a> {
    clock: &'a dyn Clock,
    control: &'a PlayControl,
    options: Options,
    status: Option<Sender<Status>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(clock: &'a dyn Clock, control: &'a PlayControl, options: Options) -> Scheduler<'a> {
        Scheduler {
            clock,
            control,
            options,
            status: None,
        }
    }

    /// Sends status snapshots to the given channel while playing.
    pub fn with_status(mut self, sender: Sender<Status>) -> Scheduler<'a> {
        self.status = Some(sender);
        self
    }

    /// Plays the timeline through the sink, returning once it is over. Whatever the outcome,
    /// including errors, the sink is silenced and cleared before this returns.
    pub fn play(
        &self,
        arena: &Arena,
        cache: &mut EventCache,
        sink: &mut dyn DeviceSink,
        timeline: &Timeline,
    ) -> Result<Outcome> {
        let span = span!(Level::INFO, "play");
        let _enter = span.enter();

        cache.flush();
        let mut run = Run {
            clock: self.clock,
            control: self.control,
            options: self.options,
            sink,
            converter: TickConverter::new(DEFAULT_TEMPO, timeline.ticks_per_quarter),
            notes: NoteStates::new(),
            programs: [0; 16],
            state: State::Idle,
            target: 0,
            origin: 0,
            elapsed_secs: 0,
            total_secs: timeline.duration.as_secs() as u32,
            publisher: Publisher::new(self.status.clone()),
            sysex: Vec::new(),
        };

        info!(
            device = run.sink.name(),
            duration = ?timeline.duration,
            "Starting playback."
        );
        let result = run.run(arena, cache, timeline.root);
        run.teardown();
        match &result {
            Ok(outcome) => info!(outcome = ?outcome, "Playback stopped."),
            Err(e) => info!(err = %e, "Playback aborted."),
        }
        result
    }
}

/// The state of one song's playback.
struct Run<'s> {
    clock: &'s dyn Clock,
    control: &'s PlayControl,
    options: Options,
    sink: &'s mut dyn DeviceSink,
    converter: TickConverter,
    notes: NoteStates,
    programs: [u8; 16],
    state: State,
    /// When the next record is due, in clock microseconds.
    target: u32,
    /// When playback started, shifted forward by pauses.
    origin: u32,
    elapsed_secs: u32,
    total_secs: u32,
    publisher: Publisher,
    sysex: Vec<u8>,
}

impl Run<'_> {
    fn run(
        &mut self,
        arena: &Arena,
        cache: &mut EventCache,
        root: Option<Handle>,
    ) -> Result<Outcome> {
        self.clock.reset();
        self.target = clamp_wait(self.options.start_delay.as_micros());
        self.set_state(State::Waiting);
        if let Some(stop) = self.wait() {
            return Ok(Outcome::Cancelled(stop));
        }
        self.origin = self.clock.now();
        self.target = self.origin;

        let mut position = root;
        while let Some(handle) = position {
            if let Some(stop) = self.control.stopped() {
                return Ok(Outcome::Cancelled(stop));
            }

            let event = *cache.next(arena, handle, self.options.pacing_delay)?;
            self.sink.tick();

            if event.delay > 0 {
                let micros = self.converter.micros(event.delay);
                self.target = self.target.wrapping_add(clamp_wait(u128::from(micros)));
                self.set_state(State::Waiting);
                if let Some(stop) = self.wait() {
                    return Ok(Outcome::Cancelled(stop));
                }
            }

            self.state = State::Dispatching;
            self.dispatch(arena, &event)?;
            position = event.next;
        }

        Ok(Outcome::Finished)
    }

    /// Waits for the target time. Returns early if playback is stopped.
    fn wait(&mut self) -> Option<Stop> {
        loop {
            let now = self.clock.now();
            if is_due(now, self.target) {
                return None;
            }

            let elapsed_secs = now.wrapping_sub(self.origin) / 1_000_000;
            if elapsed_secs != self.elapsed_secs {
                self.elapsed_secs = elapsed_secs;
                self.publisher.touch();
            }
            self.publish();

            match self.control.poll() {
                Request::Play => {}
                Request::Pause => {
                    if let Some(stop) = self.pause() {
                        return Some(stop);
                    }
                    continue;
                }
                Request::Stop(stop) => return Some(stop),
            }

            if self.options.power_save {
                self.clock
                    .idle(self.target.wrapping_sub(now).min(IDLE_SLICE));
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Holds playback until resumed, then shifts the schedule by however long that took.
    fn pause(&mut self) -> Option<Stop> {
        let before = self.clock.now();
        let remaining = self.target.wrapping_sub(before);
        self.silence();
        self.set_state(State::Paused);
        debug!(remaining, "Paused.");

        let stop = self.control.wait_while_paused();

        let after = self.clock.now();
        self.target = after.wrapping_add(remaining);
        self.origin = self.origin.wrapping_add(after.wrapping_sub(before));
        debug!(paused_for = after.wrapping_sub(before), "Resumed.");
        self.set_state(State::Waiting);
        stop
    }

    fn dispatch(&mut self, arena: &Arena, event: &Event) -> Result<()> {
        trace!(kind = ?event.kind, delay = event.delay, "Dispatching.");
        match event.kind {
            EventKind::NoteOn {
                channel,
                note,
                velocity,
            } => {
                let volume = u16::from(self.control.volume());
                let velocity = (u16::from(velocity) * volume / 100) as u8;
                self.sink.note_on(channel, note, velocity);
                self.notes.set(channel, note);
                self.publisher.touch();
            }
            EventKind::NoteOff { channel, note } => {
                self.sink.note_off(channel, note);
                self.notes.unset(channel, note);
                self.publisher.touch();
            }
            EventKind::ProgramChange { channel, program } => {
                self.sink.set_program(channel, program);
                self.programs[usize::from(channel & 0x0f)] = program;
                self.publisher.touch();
            }
            EventKind::Control { channel, id, value } => self.sink.controller(channel, id, value),
            EventKind::Pitch { channel, value } => self.sink.pitch_wheel(channel, value),
            EventKind::ChannelPressure { channel, pressure } => {
                self.sink.channel_pressure(channel, pressure)
            }
            EventKind::KeyPressure {
                channel,
                note,
                pressure,
            } => self.sink.key_pressure(channel, note, pressure),
            EventKind::Tempo { micros_per_quarter } => {
                self.converter.set_tempo(micros_per_quarter);
                self.publisher.touch();
            }
            EventKind::Sysex { blob, len } => {
                load_sysex(arena, blob, len, &mut self.sysex)?;
                let channel = self.sysex.first().map_or(0, |status| status & 0x0f);
                self.sink.sysex(channel, &self.sysex);
            }
        }
        Ok(())
    }

    /// Turns off every sounding note.
    fn silence(&mut self) {
        for (channel, note) in self.notes.active() {
            self.sink.note_off(channel, note);
        }
        self.notes.clear();
        self.publisher.touch();
    }

    fn teardown(&mut self) {
        self.silence();
        self.sink.clear();
        self.set_state(State::Done);
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            self.state = state;
            self.publisher.touch();
            self.publish();
        }
    }

    fn publish(&mut self) {
        let Run {
            publisher,
            state,
            elapsed_secs,
            total_secs,
            converter,
            control,
            notes,
            programs,
            ..
        } = self;
        publisher.publish(|| Status {
            state: *state,
            elapsed_secs: *elapsed_secs,
            total_secs: *total_secs,
            bpm: converter.bpm(),
            volume: control.volume(),
            notes: *notes,
            programs: *programs,
        });
    }
}

/// Walks the timeline without waiting, calling f with each record and the time it would be
/// played at, in microseconds from the start.
pub fn walk<F>(arena: &Arena, cache: &mut EventCache, timeline: &Timeline, mut f: F) -> Result<()>
where
    F: FnMut(u64, &Event) -> Result<()>,
{
    cache.flush();
    let mut converter = TickConverter::new(DEFAULT_TEMPO, timeline.ticks_per_quarter);
    let mut at = 0u64;
    let mut position = timeline.root;
    while let Some(handle) = position {
        let event = *cache.next(arena, handle, false)?;
        at += converter.micros(event.delay);
        if let EventKind::Tempo { micros_per_quarter } = event.kind {
            converter.set_tempo(micros_per_quarter);
        }
        f(at, &event)?;
        position = event.next;
    }
    Ok(())
}
