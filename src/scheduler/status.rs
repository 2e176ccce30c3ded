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
use crossbeam_channel::{Sender, TrySendError};
use tracing::debug;

use super::notes::NoteStates;

/// Where the scheduler is in the life of a song.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Waiting,
    Dispatching,
    Paused,
    Done,
}

/// A snapshot of playback for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub state: State,
    pub elapsed_secs: u32,
    pub total_secs: u32,
    pub bpm: u32,
    pub volume: u8,
    pub notes: NoteStates,
    pub programs: [u8; 16],
}

impl Default for Status {
    fn default() -> Self {
        Status {
            state: State::Idle,
            elapsed_secs: 0,
            total_secs: 0,
            bpm: 120,
            volume: 100,
            notes: NoteStates::new(),
            programs: [0; 16],
        }
    }
}

/// Sends status snapshots to an optional listener. Snapshots are only sent when something
/// changed, and never block: a full channel just drops the update.
pub(super) struct Publisher {
    sender: Option<Sender<Status>>,
    pending: bool,
}

impl Publisher {
    pub(super) fn new(sender: Option<Sender<Status>>) -> Publisher {
        Publisher {
            sender,
            pending: true,
        }
    }

    /// Records that the next snapshot should be sent.
    pub(super) fn touch(&mut self) {
        self.pending = true;
    }

    /// Sends the snapshot if anything changed since the last one.
    pub(super) fn publish(&mut self, status: impl FnOnce() -> Status) {
        if !self.pending {
            return;
        }
        self.pending = false;
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        match sender.try_send(status()) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                debug!("Status listener went away.");
                self.sender = None;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_publishes_only_changes() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut publisher = Publisher::new(Some(tx));

        publisher.publish(Status::default);
        publisher.publish(Status::default);
        assert_eq!(1, rx.try_iter().count());

        publisher.touch();
        publisher.publish(|| Status {
            elapsed_secs: 1,
            ..Status::default()
        });
        assert_eq!(1, rx.try_recv().unwrap().elapsed_secs);
    }

    #[test]
    fn test_never_blocks() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut publisher = Publisher::new(Some(tx));
        for _ in 0..3 {
            publisher.touch();
            publisher.publish(Status::default);
        }
        assert_eq!(1, rx.try_iter().count());

        drop(rx);
        publisher.touch();
        publisher.publish(Status::default);
        assert!(publisher.sender.is_none());
    }
}
