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
use std::{io, thread};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info, span, Level};

use crate::playsync::{PlayControl, Stop};

pub mod keyboard;

/// How much a single volume command moves the volume, in percent.
const VOLUME_STEP: i8 = 5;

/// Controller events that will trigger behavior in the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// Pauses playback.
    Pause,
    /// Resumes paused playback.
    Resume,
    /// Pauses if playing, resumes if paused.
    TogglePause,
    /// Moves on to the next song.
    Next,
    /// Goes back to the previous song.
    Prev,
    /// Stops playback and exits.
    Stop,
    VolumeUp,
    VolumeDown,
}

pub trait Driver: Send + Sync + 'static {
    /// Watches for events until the input is exhausted, sending them to events_tx.
    fn monitor_events(&self, events_tx: Sender<Event>) -> thread::JoinHandle<Result<(), io::Error>>;
}

/// Forwards driver events to a play control.
pub struct Controller {
    handle: thread::JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(control: PlayControl, driver: &dyn Driver) -> Result<Controller, io::Error> {
        let (events_tx, events_rx) = unbounded();
        let monitor = driver.monitor_events(events_tx);
        let handle = thread::Builder::new()
            .name("controller".into())
            .spawn(move || Controller::trigger_events(control, events_rx, monitor))?;
        Ok(Controller { handle })
    }

    /// Join will block until the driver runs out of input.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }

    /// Applies events until the driver closes its end of the channel.
    fn trigger_events(
        control: PlayControl,
        events_rx: Receiver<Event>,
        monitor: thread::JoinHandle<Result<(), io::Error>>,
    ) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        info!("Controller started.");
        for event in events_rx.iter() {
            info!(event = ?event, "Received event.");
            apply(&control, event);
        }

        info!("Controller closing.");
        match monitor.join() {
            Ok(Err(e)) => error!(err = %e, "Event monitor failed."),
            Err(e) => error!("Error waiting for event monitor to stop: {:?}", e),
            Ok(Ok(())) => {}
        }
    }
}

/// Carries out a single event.
pub fn apply(control: &PlayControl, event: Event) {
    match event {
        Event::Pause => control.pause(),
        Event::Resume => control.resume(),
        Event::TogglePause => control.toggle_pause(),
        Event::Next => control.stop(Stop::Next),
        Event::Prev => control.stop(Stop::Previous),
        Event::Stop => control.stop(Stop::Exit),
        Event::VolumeUp => control.adjust_volume(VOLUME_STEP),
        Event::VolumeDown => control.adjust_volume(-VOLUME_STEP),
    }
}

#[cfg(test)]
mod test {
    use std::{
        io,
        sync::{Arc, Barrier},
        thread,
    };

    use crossbeam_channel::Sender;
    use parking_lot::Mutex;

    use super::{Controller, Driver, Event};
    use crate::playsync::{PlayControl, Request, Stop};
    use crate::testutil::eventually;

    /// Sends events one at a time, when told to.
    struct TestDriver {
        next: Arc<Mutex<Option<Event>>>,
        barrier: Arc<Barrier>,
    }

    impl TestDriver {
        fn new() -> TestDriver {
            TestDriver {
                next: Arc::new(Mutex::new(None)),
                barrier: Arc::new(Barrier::new(2)),
            }
        }

        /// Signals the next event to the monitor thread. None closes the driver.
        fn next_event(&self, event: Option<Event>) {
            *self.next.lock() = event;
            self.barrier.wait();
        }
    }

    impl Driver for TestDriver {
        fn monitor_events(
            &self,
            events_tx: Sender<Event>,
        ) -> thread::JoinHandle<Result<(), io::Error>> {
            let next = self.next.clone();
            let barrier = self.barrier.clone();
            thread::spawn(move || loop {
                barrier.wait();
                match *next.lock() {
                    Some(event) => events_tx
                        .send(event)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
                    None => return Ok(()),
                }
            })
        }
    }

    #[test]
    fn test_controller() {
        let control = PlayControl::new();
        let driver = TestDriver::new();
        let controller = Controller::new(control.clone(), &driver).unwrap();

        driver.next_event(Some(Event::TogglePause));
        eventually(|| control.is_paused(), "Control never paused");
        driver.next_event(Some(Event::Resume));
        eventually(|| control.poll() == Request::Play, "Control never resumed");

        driver.next_event(Some(Event::VolumeDown));
        eventually(|| control.volume() == 95, "Volume never went down");
        driver.next_event(Some(Event::VolumeUp));
        driver.next_event(Some(Event::VolumeUp));
        eventually(|| control.volume() == 100, "Volume never went back up");

        driver.next_event(Some(Event::Next));
        eventually(
            || control.stopped() == Some(Stop::Next),
            "Control never stopped for the next song",
        );
        control.rearm();

        driver.next_event(Some(Event::Stop));
        eventually(
            || control.stopped() == Some(Stop::Exit),
            "Control never stopped",
        );

        driver.next_event(None);
        assert!(controller.join().is_ok());
    }
}
