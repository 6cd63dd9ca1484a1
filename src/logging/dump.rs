//! Formatting of raw buffers for debug output.

use std::fmt::Write;

/// Lines longer than this are wrapped by the hex dump.
const HEX_LINE_WIDTH: usize = 72;

const CONTROL_NAMES: [&str; 32] = [
    "NUL", "SOH", "STX", "ETX", "EOT", "ENQ", "ACK", "BEL", "BS", "TAB", "LF", "VT", "FF", "CR",
    "SO", "SI", "DLE", "DC1", "DC2", "DC3", "DC4", "NAK", "SYN", "ETB", "CAN", "EM", "SUB", "ESC",
    "FS", "GS", "RS", "US",
];

/// Formats the buffer as hexadecimal bytes.
///
/// The first line starts with the `msg` and the size of the buffer. Lines are wrapped once they
/// grow past 72 characters, so a big buffer produces multiple lines.
///
/// ```rust
/// let lines = vigil::logging::hex_dump("reply", &[0x01, 0xab, 0xff]);
/// assert_eq!(vec!["reply: (3 bytes) => 01 ab ff".to_owned()], lines);
/// ```
pub fn hex_dump(msg: &str, buf: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = format!("{}: ({} bytes) =>", msg, buf.len());
    for byte in buf {
        if line.len() > HEX_LINE_WIDTH {
            lines.push(line);
            line = String::new();
        }
        if line.is_empty() {
            let _ = write!(line, "{:02x}", byte);
        } else {
            let _ = write!(line, " {:02x}", byte);
        }
    }
    lines.push(line);
    lines
}

/// Formats the buffer as characters.
///
/// Printable ASCII is quoted, control characters are replaced by their names and bytes outside of
/// ASCII are written in hexadecimal with the `h` suffix.
///
/// ```rust
/// let line = vigil::logging::ascii_dump("reply", b"OK\r\n\xff");
/// assert_eq!("reply 'O' 'K' CR LF FFh", line);
/// ```
pub fn ascii_dump(msg: &str, buf: &[u8]) -> String {
    let mut line = String::with_capacity(msg.len() + buf.len() * 4);
    line.push_str(msg);
    for &byte in buf {
        line.push(' ');
        match byte {
            0x00..=0x1f => line.push_str(CONTROL_NAMES[usize::from(byte)]),
            0x7f => line.push_str("DEL"),
            0x80..=0xff => {
                let _ = write!(line, "{:02X}h", byte);
            }
            _ => {
                let _ = write!(line, "'{}'", char::from(byte));
            }
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_empty() {
        assert_eq!(vec!["nothing: (0 bytes) =>".to_owned()], hex_dump("nothing", &[]));
    }

    /// Long buffers are split into multiple lines, none of them much longer than the limit, and no
    /// byte gets lost on the way.
    #[test]
    fn hex_wraps() {
        let buf: Vec<u8> = (0..=255).collect();
        let lines = hex_dump("all", &buf);
        assert!(lines.len() > 10);
        assert!(lines[0].starts_with("all: (256 bytes) => 00 01"));
        for line in &lines {
            assert!(line.len() <= HEX_LINE_WIDTH + 3, "Too long: {}", line);
        }
        let bytes = lines
            .iter()
            .flat_map(|l| l.split(' '))
            .filter(|w| w.len() == 2 && u8::from_str_radix(w, 16).is_ok())
            .count();
        assert_eq!(256, bytes);
        assert!(lines.last().unwrap().ends_with("ff"));
        // Continuation lines don't start with a space
        assert!(lines[1].starts_with(|c: char| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ascii_all_classes() {
        assert_eq!("m NUL US ' ' '~' DEL 80h", ascii_dump("m", b"\x00\x1f ~\x7f\x80"));
        assert_eq!("empty", ascii_dump("empty", b""));
    }
}
