//! Serial command terminal
//!
//! Bytes received on the serial port are queued in a [`Deque`]; once a full line is available it
//! is handled by [`handle_line`].

use core::fmt::{self, Write};

use heapless::{Deque, Vec};

use crate::{controller::Controller, ds18b20::Resolution, relay::Relay};

pub const BUFFER_SIZE: usize = 32;

pub type Buffer = Deque<u8, BUFFER_SIZE>;
pub type Line = Vec<u8, BUFFER_SIZE>;

const ACCEPTED_STR: &str = "0\r\n";
const REJECTED_STR: &str = "-1\r\n";

const HELP_STR: &str = "Commands:\r
    help\r
    status\r
    resolution <9|10|11|12>?\r
    on | idle\r
    off\r
    <target>\r
";

/// Handles one line of terminal input
///
/// Commands:
/// - `help` - Print help
/// - `status` - Print the status screen
/// - `resolution <9|10|11|12>?` - Get or set the sensor resolution. A new resolution is written
///   to the sensor on the next tick.
/// - anything else is forwarded to [`Controller::control`], which answers `0` if the command was
///   accepted and `-1` if it was not
#[cfg_attr(feature = "sizing", inline(never))]
pub fn handle_line<H: Relay, C: Relay, W: Write>(
    line: &[u8],
    controller: &mut Controller<H, C>,
    resolution: &mut Resolution,
    tx: &mut W,
) -> fmt::Result {
    // Split line into arguments
    let mut args = line
        .split(|b| is_whitespace(*b))
        .filter(|arg| !arg.is_empty());

    match args.next() {
        None => trace!("Empty command"),
        Some(b"help") => tx.write_str(HELP_STR)?,
        Some(b"status") => write!(tx, "{}", controller.status())?,
        Some(b"resolution") => {
            let new = match (args.next(), args.next()) {
                (None, _) => {
                    return write!(tx, "{}\r\n", resolution_bits(*resolution));
                }
                (Some(b"9"), None) => Some(Resolution::Bits9),
                (Some(b"10"), None) => Some(Resolution::Bits10),
                (Some(b"11"), None) => Some(Resolution::Bits11),
                (Some(b"12"), None) => Some(Resolution::Bits12),
                _ => None,
            };

            if let Some(new) = new {
                *resolution = new;
                tx.write_str(ACCEPTED_STR)?;
            } else {
                tx.write_str(REJECTED_STR)?;
            }
        }
        Some(token) => {
            let accepted = match core::str::from_utf8(token) {
                Ok(token) if args.next().is_none() => controller.control(token).is_ok(),
                _ => false,
            };
            tx.write_str(if accepted { ACCEPTED_STR } else { REJECTED_STR })?;
        }
    }

    Ok(())
}

const fn resolution_bits(resolution: Resolution) -> u8 {
    match resolution {
        Resolution::Bits9 => 9,
        Resolution::Bits10 => 10,
        Resolution::Bits11 => 11,
        Resolution::Bits12 => 12,
    }
}

/// Pops the first complete line, newline included, off the buffer
pub fn get_line(buffer: &mut Buffer) -> Option<Line> {
    // Find newline
    let idx = buffer.iter().position(|b| is_newline(*b))?;

    let mut line = Line::new();
    for _ in 0..=idx {
        let Some(b) = buffer.pop_front() else {
            break;
        };
        // Line has the same capacity as the buffer
        let _ = line.push(b);
    }

    Some(line)
}

#[inline]
pub const fn is_newline(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

#[inline]
pub const fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\n' || b == b'\r' || b == b'\t'
}
