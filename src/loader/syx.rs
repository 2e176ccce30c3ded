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
use std::{fs, path::Path, time::Duration};

use tracing::{debug, info};

use crate::device::DeviceSink;
use crate::error::{Error, Result};

/// The largest message accepted from a SYX file.
const MAX_MESSAGE_LEN: usize = 8192;

/// Pause after every message.
const MESSAGE_GAP: Duration = Duration::from_millis(40);

/// Additional pause after an "all parameters reset" message.
const RESET_GAP: Duration = Duration::from_millis(250);

fn malformed(message: &str) -> Error {
    Error::MalformedInput(format!("SYX: {}", message))
}

/// Splits the contents of a SYX file into its SysEx messages. Each message starts with
/// F0 and ends with F7; nothing but data bytes may appear between them.
pub fn parse(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut messages = Vec::new();
    let mut rest = bytes;

    while let Some((&first, tail)) = rest.split_first() {
        if first != 0xf0 {
            return Err(malformed(&format!("invalid header byte {:#04x}", first)));
        }

        let end = tail
            .iter()
            .position(|&byte| byte & 0x80 != 0)
            .ok_or_else(|| malformed("unexpected end of file"))?;
        if end + 2 > MAX_MESSAGE_LEN {
            return Err(malformed("message overrun"));
        }
        if tail[end] != 0xf7 {
            return Err(malformed(&format!("invalid byte {:#04x}", tail[end])));
        }

        messages.push(rest[..end + 2].to_vec());
        rest = &tail[end + 1..];
    }

    Ok(messages)
}

/// Reads and parses a SYX file.
pub fn load(path: &Path) -> Result<Vec<Vec<u8>>> {
    parse(&fs::read(path)?)
}

/// How long to wait after sending the given message.
fn gap(message: &[u8]) -> Duration {
    if message.get(1) == Some(&0x7f) {
        MESSAGE_GAP + RESET_GAP
    } else {
        MESSAGE_GAP
    }
}

/// Sends every message to the device, pausing after each one so the device can take it in.
pub fn send<F>(device: &mut dyn DeviceSink, messages: &[Vec<u8>], mut pause: F)
where
    F: FnMut(Duration),
{
    for message in messages {
        debug!(len = message.len(), "Sending SYX message.");
        device.sysex(0, message);
        pause(gap(message));
    }
    info!(messages = messages.len(), device = %device, "Sent SYX reset.");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::{Call, MockSink};

    #[test]
    fn test_parse() {
        let bytes = [
            0xf0, 0x41, 0x10, 0x42, 0xf7, //
            0xf0, 0x7f, 0x7f, 0x09, 0x01, 0xf7,
        ];
        let messages = parse(&bytes).unwrap();
        assert_eq!(
            vec![
                vec![0xf0, 0x41, 0x10, 0x42, 0xf7],
                vec![0xf0, 0x7f, 0x7f, 0x09, 0x01, 0xf7]
            ],
            messages
        );
        assert!(parse(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        let overrun = [vec![0xf0], vec![0x01; MAX_MESSAGE_LEN], vec![0xf7]].concat();
        for bytes in [
            &[0x41, 0x10, 0xf7][..],
            &[0xf0, 0x41, 0x10],
            &[0xf0, 0x41, 0x90, 0xf7],
            &[0xf0, 0xf7, 0x00],
            overrun.as_slice(),
        ] {
            assert!(
                matches!(parse(bytes), Err(Error::MalformedInput(_))),
                "{:?} was accepted",
                &bytes[..bytes.len().min(8)]
            );
        }
    }

    #[test]
    fn test_load_and_send() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            &[0xf0, 0x43, 0x10, 0xf7, 0xf0, 0x7f, 0x7f, 0x09, 0x01, 0xf7],
        )
        .unwrap();
        let messages = load(file.path()).unwrap();

        let mut sink = MockSink::get("mock");
        let mut pauses = Vec::new();
        send(&mut sink, &messages, |gap| pauses.push(gap));

        assert_eq!(
            vec![
                Call::Sysex {
                    channel: 0,
                    bytes: vec![0xf0, 0x43, 0x10, 0xf7]
                },
                Call::Sysex {
                    channel: 0,
                    bytes: vec![0xf0, 0x7f, 0x7f, 0x09, 0x01, 0xf7]
                },
            ],
            sink.calls()
        );
        assert_eq!(
            vec![Duration::from_millis(40), Duration::from_millis(290)],
            pauses
        );
    }
}
