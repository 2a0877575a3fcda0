/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    common::util.rs

    Formatting helpers.
*/

use std::time::Duration;

/// Format the provided Duration using the most appropriate unit given the magnitude of the Duration.
pub fn format_duration(duration: Duration) -> String {
    format_nanos(duration.as_nanos().min(u64::MAX as u128) as u64)
}

/// Format a nanosecond count using the most appropriate unit.
pub fn format_nanos(nanos: u64) -> String {
    let nanos = nanos as f64;
    let micros = nanos / 1_000.0;
    let millis = micros / 1_000.0;
    let secs = millis / 1_000.0;

    if nanos < 1_000.0 {
        format!("{:.0}ns", nanos)
    }
    else if micros < 1_000.0 {
        format!("{:.3}µs", micros)
    }
    else if millis < 1_000.0 {
        format!("{:.3}ms", millis)
    }
    else {
        format!("{:.3}s", secs)
    }
}

/// Render a byte slice as a classic 16-byte-per-row hex dump.
pub fn hex_dump(data: &[u8], base: usize) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for (row, chunk) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:06X}: ", base + row * 16));
        for b in chunk {
            out.push_str(&format!("{:02X} ", b));
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push(' ');
        for &b in chunk {
            out.push(if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_nanos_units() {
        assert_eq!(format_nanos(500), "500ns");
        assert_eq!(format_nanos(2_500), "2.500µs");
        assert_eq!(format_nanos(15_000_000), "15.000ms");
        assert_eq!(format_nanos(1_200_000_000), "1.200s");
    }

    #[test]
    fn test_hex_dump_row() {
        let dump = hex_dump(b"AB", 0x200);
        assert!(dump.starts_with("000200: 41 42 "));
        assert!(dump.trim_end().ends_with("AB"));
    }
}
