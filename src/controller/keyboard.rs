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

use crossbeam_channel::Sender;
use tracing::{info, span, warn, Level};

use super::Event;

const PAUSE: &str = "pause";
const RESUME: &str = "resume";
const NEXT: &str = "next";
const PREV: &str = "prev";
const STOP: &str = "stop";

/// A controller that controls playback using commands typed on standard input.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads one command. Returns false once the reader is exhausted.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {}, {}, {}, p, +, -): ",
            PAUSE, RESUME, NEXT, PREV, STOP,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let event = match input.trim().to_lowercase().as_str() {
            PAUSE => Event::Pause,
            RESUME => Event::Resume,
            NEXT => Event::Next,
            PREV => Event::Prev,
            STOP => Event::Stop,
            "p" | "" => Event::TogglePause,
            "+" => Event::VolumeUp,
            "-" => Event::VolumeDown,
            _ => {
                warn!(input = input.trim(), "Unrecognized input");
                return Ok(true);
            }
        };
        events_tx
            .send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> thread::JoinHandle<Result<(), io::Error>> {
        thread::spawn(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use crossbeam_channel::unbounded;

    use super::*;

    fn get_event(input: &str) -> Result<Option<Event>, io::Error> {
        let (sender, receiver) = unbounded::<Event>();

        let reader = BufReader::new(input.as_bytes());
        let writer = BufWriter::new(Vec::new());
        assert!(Driver::monitor_io(&sender, reader, writer)?);

        // Force the sender to close.
        drop(sender);
        Ok(receiver.recv().ok())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Some(Event::Pause), get_event("pause\n")?);
        assert_eq!(Some(Event::Resume), get_event("RESUME\n")?);
        assert_eq!(Some(Event::Next), get_event(NEXT)?);
        assert_eq!(Some(Event::Prev), get_event(PREV)?);
        assert_eq!(Some(Event::Stop), get_event(STOP)?);
        assert_eq!(Some(Event::TogglePause), get_event("p\n")?);
        assert_eq!(Some(Event::TogglePause), get_event(" \n")?);
        assert_eq!(Some(Event::VolumeUp), get_event("+\n")?);
        assert_eq!(Some(Event::VolumeDown), get_event("-\n")?);
        assert_eq!(None, get_event("unrecognized\n")?);
        Ok(())
    }

    #[test]
    fn test_end_of_input() {
        let (sender, _receiver) = unbounded::<Event>();
        let reader = BufReader::new(&b""[..]);
        assert!(!Driver::monitor_io(&sender, reader, io::sink()).unwrap());
    }
}
