//! Hex dump formatting for frame logging

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// Format bytes as an offset-prefixed hex dump with an ASCII column
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();

    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:04x}:", line * BYTES_PER_LINE);
        for byte in chunk {
            let _ = write!(out, " {:02x}", byte);
        }
        for _ in chunk.len()..BYTES_PER_LINE {
            out.push_str("   ");
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
    }

    out
}
