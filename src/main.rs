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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use pagemidi::cache::EventCache;
use pagemidi::config;
use pagemidi::controller::{keyboard, Controller};
use pagemidi::event::{load_sysex, EventKind};
use pagemidi::loader;
use pagemidi::player::{create_arena, Player, Settings};
use pagemidi::playlist::Playlist;
use pagemidi::playsync::PlayControl;
use pagemidi::scheduler::{walk, Status};
use pagemidi::util::{clock_time, display_name, offset_time};
use pagemidi::{clock, device};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI file player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available MIDI output devices.
    Devices {},
    /// Plays MIDI, RMID and MUS files through a MIDI output.
    Play {
        /// The songs to play.
        paths: Vec<PathBuf>,
        /// An M3U playlist to play instead of the given songs.
        #[arg[short, long]]
        playlist: Option<PathBuf>,
        /// The path to the player config.
        #[arg[short, long]]
        config: Option<PathBuf>,
        /// The MIDI device name to play through.
        #[arg[short, long]]
        device: Option<String>,
        /// How long to wait before the first note of a song, e.g. 500ms.
        #[arg[long]]
        delay: Option<String>,
        /// Note velocity scaling in percent.
        #[arg[short, long]]
        volume: Option<u8>,
        /// Shuffle the songs.
        #[arg[short, long]]
        random: bool,
        /// A SYX file sent to the device before every song.
        #[arg[long]]
        syx_reset: Option<PathBuf>,
        /// The playback clock, monotonic or ticker.
        #[arg[long]]
        clock: Option<String>,
        /// Spin between records instead of idling.
        #[arg[long]]
        no_power_save: bool,
    },
    /// Loads a song and prints what is known about it.
    Info {
        /// The song to load.
        path: PathBuf,
        /// The path to the player config.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
    /// Prints every record of a song with the time it would be played at.
    Timeline {
        /// The song to load.
        path: PathBuf,
        /// The path to the player config.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
}

/// Reads the player config, if there is one. Relative paths in it are resolved against its
/// directory.
fn load_config(path: Option<&Path>) -> Result<config::Player, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(config::Player::default());
    };

    let mut config = config::load(path)?;
    if let Some(dir) = path.parent() {
        config.resolve_syx_reset(dir);
    }
    Ok(config)
}

fn log_status(status: Status) {
    debug!(
        state = ?status.state,
        elapsed = clock_time(Duration::from_secs(u64::from(status.elapsed_secs))),
        total = clock_time(Duration::from_secs(u64::from(status.total_secs))),
        bpm = status.bpm,
        volume = status.volume,
        notes = status.notes.active().count(),
        "Status."
    );
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = device::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            paths,
            playlist,
            config,
            device,
            delay,
            volume,
            random,
            syx_reset,
            clock,
            no_power_save,
        } => {
            let config = load_config(config.as_deref())?;
            let mut settings = Settings::from_config(&config)?;
            if let Some(delay) = delay {
                settings.playback_delay = DurationString::from_string(delay)?.into();
            }
            if let Some(volume) = volume {
                settings.volume = volume.min(100);
            }
            if syx_reset.is_some() {
                settings.syx_reset = syx_reset;
            }
            if let Some(clock) = clock {
                settings.clock = clock;
            }
            settings.random |= random;
            settings.power_save &= !no_power_save;

            let device_name = device
                .or_else(|| config.device().map(str::to_string))
                .ok_or("no MIDI device given")?;
            let device = device::get(&device_name)?;
            let clock = clock::get(&settings.clock)?;

            let mut playlist = match playlist {
                Some(playlist) => Playlist::from_m3u(&playlist)?,
                None => Playlist::new(paths)?,
            };
            if settings.random {
                playlist.shuffle(&mut rand::thread_rng());
            }
            println!("{}", playlist);

            let control = PlayControl::new();
            let (status_tx, status_rx) = crossbeam_channel::bounded::<Status>(16);
            let player =
                Player::new(&settings, device, clock, control.clone())?.with_status(status_tx);

            // The controller lives as long as standard input does; it is not waited on.
            let _controller = Controller::new(control, &keyboard::Driver::new())?;
            let status = thread::spawn(move || status_rx.iter().for_each(log_status));

            player
                .spawn(playlist)?
                .join()
                .map_err(|_| "playback thread panicked")??;
            if status.join().is_err() {
                warn!("Status thread panicked.");
            }
        }
        Commands::Info { path, config } => {
            let settings = Settings::from_config(&load_config(config.as_deref())?)?;
            let mut arena = create_arena(settings.memory)?;
            let song = loader::load(&mut arena, &path)?;
            let stats = arena.stats();

            println!("{} ({})", display_name(&path), song.info.container);
            for title in song.info.titles.iter() {
                println!("  {}", title);
            }
            println!("Duration: {}", clock_time(song.timeline.duration));
            println!("Tracks: {}", song.info.tracks);
            println!(
                "Channels: {}",
                (0..16)
                    .filter(|channel| song.info.channels & (1 << channel) != 0)
                    .map(|channel| (channel + 1).to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            );
            println!("Records: {}", song.records);
            println!(
                "Memory: {} of {} bytes ({})",
                stats.allocated,
                stats.capacity,
                arena.pool_name()
            );
        }
        Commands::Timeline { path, config } => {
            let settings = Settings::from_config(&load_config(config.as_deref())?)?;
            let mut arena = create_arena(settings.memory)?;
            let song = loader::load(&mut arena, &path)?;
            let mut cache = EventCache::new(settings.cache_window);
            let mut sysex = Vec::new();

            walk(&arena, &mut cache, &song.timeline, |at, event| {
                match event.kind {
                    EventKind::Sysex { blob, len } => {
                        load_sysex(&arena, blob, len, &mut sysex)?;
                        println!("{} Sysex {:02x?}", offset_time(at), sysex);
                    }
                    kind => println!("{} {:?}", offset_time(at), kind),
                }
                Ok(())
            })?;
        }
    }

    Ok(())
}
