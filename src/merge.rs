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

use tracing::{debug, span, Level};

use crate::arena::{Arena, Handle};
use crate::error::Result;
use crate::event::{Event, EventKind, DEFAULT_TEMPO};
use crate::timing::TickConverter;

/// A time ordered list produced by merging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Merged {
    /// The first record of the timeline.
    pub root: Option<Handle>,
    /// How long the timeline plays for.
    pub duration: Duration,
    /// The number of records in the timeline.
    pub records: usize,
}

/// The record a list is currently positioned on. Its delay is counted from the last
/// record emitted from the same list.
type Cursor = Option<(Handle, Event)>;

fn open(arena: &Arena, handle: Option<Handle>) -> Result<Cursor> {
    handle
        .map(|handle| Event::load(arena, handle).map(|event| (handle, event)))
        .transpose()
}

/// Merges two lists into one, in place. Records are relinked and their delays rewritten so
/// that the result plays both lists simultaneously; nothing is allocated. On equal delays
/// the left list goes first. Once merged, the inputs are no longer separate lists.
pub fn merge(
    arena: &mut Arena,
    left: Option<Handle>,
    right: Option<Handle>,
    tempo: u32,
    ticks_per_quarter: u16,
) -> Result<Merged> {
    let mut cursors: [Cursor; 2] = [open(arena, left)?, open(arena, right)?];
    let mut converter = TickConverter::new(tempo, ticks_per_quarter);
    let mut merged = Merged::default();
    let mut last: Cursor = None;

    loop {
        let side = match &cursors {
            [None, None] => break,
            [Some(_), None] => 0,
            [None, Some(_)] => 1,
            [Some((_, l)), Some((_, r))] => usize::from(r.delay < l.delay),
        };
        let Some((handle, event)) = cursors[side].take() else {
            break;
        };

        match last {
            Some((last_handle, mut last_event)) => {
                if last_event.next != Some(handle) {
                    last_event.next = Some(handle);
                    last_event.store(arena, last_handle)?;
                }
            }
            None => merged.root = Some(handle),
        }

        if event.delay > 0 {
            if let Some((other_handle, other)) = cursors[1 - side].as_mut() {
                other.delay -= event.delay;
                other.store(arena, *other_handle)?;
            }
        }

        merged.duration += Duration::from_micros(converter.micros(event.delay));
        if let EventKind::Tempo { micros_per_quarter } = event.kind {
            converter.set_tempo(micros_per_quarter);
        }
        merged.records += 1;

        cursors[side] = open(arena, event.next)?;
        last = Some((handle, event));
    }

    Ok(merged)
}

/// Folds any number of lists into one, left to right.
pub fn merge_all<I>(arena: &mut Arena, roots: I, ticks_per_quarter: u16) -> Result<Merged>
where
    I: IntoIterator<Item = Option<Handle>>,
{
    let span = span!(Level::DEBUG, "merge");
    let _enter = span.enter();

    let mut merged = Merged::default();
    for (track, root) in roots.into_iter().enumerate() {
        merged = merge(arena, merged.root, root, DEFAULT_TEMPO, ticks_per_quarter)?;
        debug!(
            track,
            records = merged.records,
            duration = ?merged.duration,
            "Merged track."
        );
    }
    Ok(merged)
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::arena::LocalPool;
    use crate::testutil::{absolute_times, build_list, collect, note_on};

    fn arena() -> Arena {
        Arena::new(LocalPool::new(8192, 16).unwrap())
    }

    #[test]
    fn test_two_note_scenario() {
        let mut arena = arena();
        let a = build_list(&mut arena, &[(0, note_on(60))]);
        let b = build_list(&mut arena, &[(5, note_on(64))]);

        let merged = merge(&mut arena, a, b, DEFAULT_TEMPO, 480).unwrap();
        assert_eq!(a, merged.root);
        assert_eq!(2, merged.records);
        assert_eq!(Duration::from_micros(5 * 500_000 / 480), merged.duration);

        let events = collect(&arena, merged.root);
        assert_eq!(
            vec![(0, note_on(60)), (5, note_on(64))],
            events.iter().map(|e| (e.delay, e.kind)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_ties_favor_left() {
        let mut arena = arena();
        let a = build_list(&mut arena, &[(0, note_on(1)), (10, note_on(2))]);
        let b = build_list(&mut arena, &[(0, note_on(3)), (10, note_on(4))]);

        let merged = merge(&mut arena, a, b, DEFAULT_TEMPO, 96).unwrap();
        let events = collect(&arena, merged.root);
        assert_eq!(
            vec![
                (0, note_on(1)),
                (0, note_on(3)),
                (10, note_on(2)),
                (0, note_on(4))
            ],
            events.iter().map(|e| (e.delay, e.kind)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_inputs() {
        let mut arena = arena();
        assert_eq!(
            Merged::default(),
            merge(&mut arena, None, None, DEFAULT_TEMPO, 96).unwrap()
        );

        let a = build_list(&mut arena, &[(3, note_on(1)), (4, note_on(2))]);
        let merged = merge(&mut arena, None, a, DEFAULT_TEMPO, 96).unwrap();
        assert_eq!(a, merged.root);
        assert_eq!(2, merged.records);
        assert_eq!(vec![3, 7], absolute_times(&collect(&arena, merged.root)));
    }

    #[test]
    fn test_ordering_and_conservation() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let mut arena = arena();
            let tracks: Vec<Vec<(u32, EventKind)>> = (0..rng.gen_range(1..6))
                .map(|track| {
                    (0..rng.gen_range(0..40))
                        .map(|_| (rng.gen_range(0..50u32), note_on(track)))
                        .collect()
                })
                .collect();

            let mut expected: Vec<(u64, EventKind)> = Vec::new();
            for track in &tracks {
                let mut at = 0u64;
                for (delay, kind) in track {
                    at += u64::from(*delay);
                    expected.push((at, *kind));
                }
            }
            // A stable sort by time reproduces the left-first tie ordering.
            expected.sort_by_key(|(at, _)| *at);

            let roots: Vec<_> = tracks
                .iter()
                .map(|track| build_list(&mut arena, track))
                .collect();
            let allocated = arena.stats().allocated;
            let merged = merge_all(&mut arena, roots, 96).unwrap();
            assert_eq!(allocated, arena.stats().allocated);

            let events = collect(&arena, merged.root);
            let actual: Vec<(u64, EventKind)> = absolute_times(&events)
                .into_iter()
                .zip(events.iter().map(|e| e.kind))
                .collect();
            assert_eq!(expected, actual);
            assert_eq!(expected.len(), merged.records);
        }
    }

    #[test]
    fn test_duration_follows_tempo() {
        let mut arena = arena();
        let tempo = build_list(
            &mut arena,
            &[
                (96, EventKind::Tempo {
                    micros_per_quarter: 250_000,
                }),
                (96, note_on(0)),
            ],
        );
        let notes = build_list(&mut arena, &[(192, note_on(1))]);

        let merged = merge_all(&mut arena, [tempo, notes], 96).unwrap();
        // One quarter at 120 BPM followed by one at 240 BPM.
        assert_eq!(Duration::from_micros(750_000), merged.duration);
        assert_eq!(3, merged.records);
    }
}
