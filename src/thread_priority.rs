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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, info, warn};

/// Priority for timing critical threads when PAGEMIDI_THREAD_PRIORITY is unset.
const DEFAULT_THREAD_PRIORITY: u8 = 70;

/// Parses a priority from 0 to 99.
fn parse_priority(value: &str) -> Option<ThreadPriorityValue> {
    let n = value.trim().parse::<u8>().ok()?;
    (n < 100).then(|| ThreadPriorityValue::try_from(n).ok())?
}

/// Reads PAGEMIDI_THREAD_PRIORITY (0-99), falling back to the default.
pub fn playback_thread_priority() -> Option<ThreadPriorityValue> {
    std::env::var("PAGEMIDI_THREAD_PRIORITY")
        .ok()
        .and_then(|v| parse_priority(&v))
        .or_else(|| ThreadPriorityValue::try_from(DEFAULT_THREAD_PRIORITY).ok())
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether real time (SCHED_FIFO) scheduling should be attempted. Enabled unless
/// PAGEMIDI_DISABLE_RT=1.
pub fn rt_enabled() -> bool {
    !env_flag("PAGEMIDI_DISABLE_RT")
}

/// Raises the priority of the calling thread. Failures are logged and otherwise ignored:
/// playback still works, only with more jitter.
pub fn promote_current_thread(name: &str) {
    let Some(priority) = playback_thread_priority() else {
        return;
    };
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        debug!(thread = name, err = ?e, "Unable to raise thread priority");
    }

    #[cfg(unix)]
    if rt_enabled() {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!(thread = name, "Enabled RT SCHED_FIFO"),
            Err(e) => warn!(thread = name, error = %e, "Failed to set RT SCHED_FIFO"),
        }
    }
}
