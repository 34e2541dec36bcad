//! Escaping for strings embedded into JavaScript source.
//!
//! Both escapers work on UTF-16 code units, so characters outside the BMP
//! come out as a surrogate pair of `\uXXXX` escapes.

use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt::Write;

fn push_unit_escape(out: &mut String, unit: u16) {
    let _ = write!(out, "\\u{unit:04x}");
}

/// Escapes `input` as the body of a JSON string literal.
pub fn json_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for unit in input.encode_utf16() {
        match unit {
            0x00 => out.push_str("\\u0000"),
            0x0A => out.push_str("\\n"),
            0x09 => out.push_str("\\t"),
            0x0D => out.push_str("\\r"),
            0x5C => out.push_str("\\\\"),
            0x22 => out.push_str("\\\""),
            0x08 => out.push_str("\\b"),
            0x0C => out.push_str("\\f"),
            // Remaining C0 controls are not valid raw inside a JSON string.
            0x01..=0x1F | 0x80.. => push_unit_escape(&mut out, unit),
            ascii => out.push(char::from(ascii as u8)),
        }
    }
    out
}

/// Escapes only NUL and non-ASCII code units, leaving quotes and backslashes
/// alone. For payloads that are already JSON.
pub fn force_safe_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for unit in input.encode_utf16() {
        match unit {
            0x00 => out.push_str("\\u0000"),
            0x80.. => push_unit_escape(&mut out, unit),
            ascii => out.push(char::from(ascii as u8)),
        }
    }
    out
}

/// Renders an error, its `Caused by:` chain and a backtrace of the current
/// thread as one block of text.
pub fn error_stack(err: &(dyn Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(out, "\nCaused by: {cause}");
        source = cause.source();
    }
    let _ = write!(out, "\n{}", Backtrace::force_capture());
    out.replace('\r', "").trim_end().to_string()
}
