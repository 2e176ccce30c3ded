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
use std::{
    error::Error,
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use tracing::{error, info, span, Level, Span};

use crate::arena::{Arena, ExtendedPool, LocalPool, DEFAULT_POOL_SIZE};
use crate::cache::EventCache;
use crate::clock::Clock;
use crate::config::{self, Memory};
use crate::device::DeviceSink;
use crate::error::Result;
use crate::loader::{self, syx};
use crate::playlist::Playlist;
use crate::playsync::{PlayControl, Stop};
use crate::scheduler::{Options, Outcome, Scheduler, Status};
use crate::thread_priority::promote_current_thread;
use crate::util::display_name;

/// When playing more than one song, the first record of each is never played sooner than this
/// after its load started, so back to back songs don't run into each other.
const PLAYLIST_START_FLOOR: Duration = Duration::from_secs(2);

/// The playlist is abandoned after this many songs in a row fail to load or play.
const MAX_FAILED_SONGS: usize = 3;

/// The percussion channel keeps its program.
const PERCUSSION_CHANNEL: u8 = 9;

/// Everything the player needs to know, resolved from the configuration file and the
/// command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub memory: Memory,
    pub cache_window: usize,
    pub playback_delay: Duration,
    pub pacing_delay: bool,
    pub power_save: bool,
    pub volume: u8,
    pub syx_reset: Option<PathBuf>,
    pub random: bool,
    pub clock: String,
}

impl Settings {
    /// Resolves settings from a parsed configuration.
    pub fn from_config(config: &config::Player) -> std::result::Result<Settings, Box<dyn Error>> {
        Ok(Settings {
            memory: config.memory()?,
            cache_window: config.cache_window(),
            playback_delay: config.playback_delay()?,
            pacing_delay: config.pacing_delay(),
            power_save: config.power_save(),
            volume: config.volume(),
            syx_reset: config.syx_reset(),
            random: config.random(),
            clock: config.clock().to_string(),
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        // The defaults of an empty configuration can't fail to resolve.
        let config = config::Player::default();
        Settings {
            memory: Memory::default(),
            cache_window: config.cache_window(),
            playback_delay: Duration::ZERO,
            pacing_delay: config.pacing_delay(),
            power_save: config.power_save(),
            volume: config.volume(),
            syx_reset: None,
            random: config.random(),
            clock: config.clock().to_string(),
        }
    }
}

/// Builds the song arena from the configured memory.
pub fn create_arena(memory: Memory) -> Result<Arena> {
    Ok(match memory {
        Memory::Extended { bytes } => Arena::new(ExtendedPool::new(bytes)?),
        Memory::Local { pools } => Arena::new(LocalPool::new(DEFAULT_POOL_SIZE, pools)?),
    })
}

/// Plays songs, one after the other, through a single device.
pub struct Player {
    arena: Arena,
    cache: EventCache,
    clock: Box<dyn Clock>,
    device: Box<dyn DeviceSink>,
    control: PlayControl,
    options: Options,
    playback_delay: Duration,
    /// Messages sent to the device before every song.
    syx_reset: Vec<Vec<u8>>,
    status: Option<Sender<Status>>,
    /// The logging span.
    span: Span,
}

impl Player {
    /// Creates a new player. The SYX reset file, if any, is read up front.
    pub fn new(
        settings: &Settings,
        device: Box<dyn DeviceSink>,
        clock: Box<dyn Clock>,
        control: PlayControl,
    ) -> Result<Player> {
        let syx_reset = match &settings.syx_reset {
            Some(path) => syx::load(path)?,
            None => Vec::new(),
        };
        control.set_volume(settings.volume);

        let arena = create_arena(settings.memory)?;
        info!(
            device = %device,
            memory = arena.pool_name(),
            capacity = arena.stats().capacity,
            cache_window = settings.cache_window,
            "Player ready."
        );

        Ok(Player {
            arena,
            cache: EventCache::new(settings.cache_window),
            clock,
            device,
            control,
            options: Options {
                pacing_delay: settings.pacing_delay,
                power_save: settings.power_save,
                start_delay: Duration::ZERO,
            },
            playback_delay: settings.playback_delay,
            syx_reset,
            status: None,
            span: span!(Level::INFO, "player"),
        })
    }

    /// Sends playback status snapshots to the given channel.
    pub fn with_status(mut self, sender: Sender<Status>) -> Player {
        self.status = Some(sender);
        self
    }

    /// The handle used to pause, stop and change the volume of playback.
    pub fn control(&self) -> &PlayControl {
        &self.control
    }

    /// Loads and plays a single song. The first record plays no sooner than floor or the
    /// configured playback delay after the load started, whichever is longer.
    pub fn play_song(&mut self, path: &Path, floor: Duration) -> Result<Outcome> {
        let span = self.span.clone();
        let _enter = span.enter();
        let started = Instant::now();

        self.arena.reset();
        let song = loader::load(&mut self.arena, path)?;
        for title in song.info.titles.iter() {
            info!(song = display_name(path), title = title.as_str(), "Title.");
        }
        self.prepare();

        let options = Options {
            start_delay: floor
                .max(self.playback_delay)
                .saturating_sub(started.elapsed()),
            ..self.options
        };
        let mut scheduler = Scheduler::new(self.clock.as_ref(), &self.control, options);
        if let Some(sender) = &self.status {
            scheduler = scheduler.with_status(sender.clone());
        }
        scheduler.play(
            &self.arena,
            &mut self.cache,
            self.device.as_mut(),
            &song.timeline,
        )
    }

    /// Puts the device in a known state before a song.
    fn prepare(&mut self) {
        if !self.syx_reset.is_empty() {
            syx::send(self.device.as_mut(), &self.syx_reset, spin_sleep::sleep);
        }
        for channel in (0..16).filter(|channel| *channel != PERCUSSION_CHANNEL) {
            self.device.set_program(channel, 0);
        }
    }

    /// Plays the playlist from its current position until it runs out or playback is stopped.
    /// Songs that fail to load or play are logged and skipped, unless too many fail in a row,
    /// in which case the last error is returned.
    pub fn run(&mut self, playlist: &Playlist) -> Result<()> {
        let floor = if playlist.len() > 1 {
            PLAYLIST_START_FLOOR
        } else {
            Duration::ZERO
        };

        let mut failures = 0;
        loop {
            let path = playlist.current();
            let outcome = match self.play_song(&path, floor) {
                Ok(outcome) => {
                    failures = 0;
                    outcome
                }
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_FAILED_SONGS {
                        error!(
                            song = display_name(&path),
                            err = %e,
                            failures,
                            "Too many failed songs, giving up."
                        );
                        return Err(e);
                    }
                    error!(song = display_name(&path), err = %e, "Skipping song.");
                    Outcome::Finished
                }
            };

            if self.control.stopped() == Some(Stop::Exit) {
                break;
            }
            self.control.rearm();
            match outcome {
                Outcome::Finished | Outcome::Cancelled(Stop::Next) => {
                    if playlist.next().is_none() {
                        break;
                    }
                }
                Outcome::Cancelled(Stop::Previous) => {
                    playlist.prev();
                }
                Outcome::Cancelled(Stop::Exit) => break,
            }
        }

        info!("Playlist finished.");
        Ok(())
    }

    /// Runs the playlist on a dedicated, high priority thread.
    pub fn spawn(mut self, playlist: Playlist) -> io::Result<thread::JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                promote_current_thread("playback");
                self.run(&playlist)
            })
    }
}

#[cfg(test)]
mod test {
    use std::{fs, sync::Arc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::device::{Call, MockSink};
    use crate::error::Error;
    use crate::testutil::SmfBuilder;

    fn song_file(dir: &Path, name: &str, note: u8) -> PathBuf {
        let path = dir.join(name);
        let smf = SmfBuilder::new(0, 96)
            .track()
            .event(0, &[0x90, note, 100])
            .event(96, &[0x80, note, 0])
            .build();
        fs::write(&path, smf).unwrap();
        path
    }

    fn player(settings: &Settings, sink: &MockSink) -> Player {
        Player::new(
            settings,
            Box::new(sink.clone()),
            Box::new(ManualClock::new(1)),
            PlayControl::new(),
        )
        .unwrap()
    }

    fn notes_played(sink: &MockSink) -> Vec<u8> {
        sink.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::NoteOn { note, .. } => Some(note),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_play_song() {
        let dir = tempfile::tempdir().unwrap();
        let path = song_file(dir.path(), "song.mid", 60);
        let sink = MockSink::get("mock");
        let settings = Settings {
            volume: 50,
            ..Settings::default()
        };
        let mut player = player(&settings, &sink);

        assert_eq!(
            Outcome::Finished,
            player.play_song(&path, Duration::ZERO).unwrap()
        );

        let calls = sink.calls();
        let programs: Vec<u8> = calls[..15]
            .iter()
            .map(|call| match call {
                Call::SetProgram { channel, program: 0 } => *channel,
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert!(!programs.contains(&PERCUSSION_CHANNEL));
        assert_eq!(
            Call::NoteOn {
                channel: 0,
                note: 60,
                velocity: 50
            },
            calls[15]
        );
        assert_eq!(Call::NoteOff { channel: 0, note: 60 }, calls[16]);
        // Everything after that is the sink being cleared.
        assert_eq!(15 + 2 + 49, calls.len());

        assert!(matches!(
            player.play_song(&dir.path().join("missing.mid"), Duration::ZERO),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_syx_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = song_file(dir.path(), "song.mid", 60);
        let syx_path = dir.path().join("reset.syx");
        fs::write(&syx_path, [0xf0, 0x43, 0x10, 0x4c, 0xf7]).unwrap();

        let sink = MockSink::get("mock");
        let settings = Settings {
            syx_reset: Some(syx_path),
            ..Settings::default()
        };
        let mut player = player(&settings, &sink);
        player.play_song(&path, Duration::ZERO).unwrap();
        assert_eq!(
            Call::Sysex {
                channel: 0,
                bytes: vec![0xf0, 0x43, 0x10, 0x4c, 0xf7]
            },
            sink.calls()[0]
        );

        let settings = Settings {
            syx_reset: Some(dir.path().join("missing.syx")),
            ..Settings::default()
        };
        assert!(Player::new(
            &settings,
            Box::new(sink.clone()),
            Box::new(ManualClock::new(1)),
            PlayControl::new(),
        )
        .is_err());
    }

    #[test]
    fn test_run_skips_bad_songs() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.mid");
        fs::write(&bad, b"MThd but not really a MIDI file").unwrap();
        let playlist = Playlist::new(vec![
            song_file(dir.path(), "one.mid", 60),
            bad,
            song_file(dir.path(), "three.mid", 64),
        ])
        .unwrap();

        let sink = MockSink::get("mock");
        let mut player = player(&Settings::default(), &sink);
        player.run(&playlist).unwrap();

        assert_eq!(vec![60, 64], notes_played(&sink));
        assert_eq!(2, playlist.position());
    }

    fn bad_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"MThd but not really a MIDI file").unwrap();
        path
    }

    #[test]
    fn test_run_gives_up_after_failed_songs() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = Playlist::new(vec![
            bad_file(dir.path(), "one.mid"),
            bad_file(dir.path(), "two.mid"),
            bad_file(dir.path(), "three.mid"),
            song_file(dir.path(), "four.mid", 60),
        ])
        .unwrap();

        let sink = MockSink::get("mock");
        let mut player = player(&Settings::default(), &sink);
        assert!(player.run(&playlist).is_err());

        assert!(notes_played(&sink).is_empty());
        assert_eq!(2, playlist.position());
    }

    #[test]
    fn test_run_failure_count_resets() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = Playlist::new(vec![
            bad_file(dir.path(), "one.mid"),
            bad_file(dir.path(), "two.mid"),
            song_file(dir.path(), "three.mid", 60),
            bad_file(dir.path(), "four.mid"),
            bad_file(dir.path(), "five.mid"),
            song_file(dir.path(), "six.mid", 62),
        ])
        .unwrap();

        let sink = MockSink::get("mock");
        let mut player = player(&Settings::default(), &sink);
        player.run(&playlist).unwrap();

        assert_eq!(vec![60, 62], notes_played(&sink));
        assert_eq!(5, playlist.position());
    }

    fn first_note_at(playback_delay: Duration, floor: Duration) -> u32 {
        let dir = tempfile::tempdir().unwrap();
        let path = song_file(dir.path(), "song.mid", 60);
        let clock = Arc::new(ManualClock::new(1));
        let sink = MockSink::get("mock").with_clock(clock.clone());
        let settings = Settings {
            playback_delay,
            power_save: true,
            ..Settings::default()
        };
        let mut player = Player::new(
            &settings,
            Box::new(sink.clone()),
            Box::new(clock),
            PlayControl::new(),
        )
        .unwrap();

        assert_eq!(Outcome::Finished, player.play_song(&path, floor).unwrap());
        sink.timed_calls()
            .into_iter()
            .find_map(|(at, call)| match call {
                Call::NoteOn { .. } => Some(at),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_start_delay_is_longest_of_floor_and_playback_delay() {
        // The floor is counted from the start of the load, so loading eats into it.
        let at = first_note_at(Duration::from_secs(1), Duration::from_secs(2));
        assert!((1_500_000..=2_000_500).contains(&at), "first note at {}", at);

        let at = first_note_at(Duration::from_secs(3), Duration::from_secs(2));
        assert!((2_500_000..=3_000_500).contains(&at), "first note at {}", at);

        let at = first_note_at(Duration::ZERO, Duration::ZERO);
        assert!(at <= 500, "first note at {}", at);
    }

    #[test]
    fn test_run_exit() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = Playlist::new(vec![
            song_file(dir.path(), "one.mid", 60),
            song_file(dir.path(), "two.mid", 62),
        ])
        .unwrap();

        let sink = MockSink::get("mock");
        let mut player = player(&Settings::default(), &sink);
        player.control().stop(Stop::Exit);
        player.run(&playlist).unwrap();

        assert!(notes_played(&sink).is_empty());
        assert_eq!(0, playlist.position());
    }

    #[test]
    fn test_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = Playlist::new(vec![song_file(dir.path(), "one.mid", 60)]).unwrap();

        let sink = MockSink::get("mock");
        let (sender, receiver) = crossbeam_channel::unbounded();
        let player = player(&Settings::default(), &sink).with_status(sender);
        let join = player.spawn(playlist).unwrap();
        join.join().unwrap().unwrap();

        assert_eq!(vec![60], notes_played(&sink));
        let states: Vec<_> = receiver.try_iter().map(|status| status.state).collect();
        assert_eq!(Some(&crate::scheduler::State::Done), states.last());
    }

    #[test]
    fn test_settings_from_config() {
        let config = config::Player::new("mock");
        assert_eq!(Settings::default(), Settings::from_config(&config).unwrap());
    }

    #[test]
    fn test_create_arena() {
        let arena = create_arena(Memory::Extended { bytes: 64 << 10 }).unwrap();
        assert_eq!(64 << 10, arena.stats().capacity);
        let arena = create_arena(Memory::Local { pools: 2 }).unwrap();
        assert_eq!("local", arena.pool_name());
    }
}
