/*
Copyright 2025 The J80 Project Contributors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The two supported image layouts: raw binary and Logisim's `v2.0 raw`
//! text format.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Raw,
    Logisim,
}

impl Format {
    pub fn parse(name: &str) -> Option<Format> {
        match name {
            "raw" => Some(Format::Raw),
            "logisim" => Some(Format::Logisim),
            _ => None,
        }
    }
}

/// Code bytes then data bytes, no header.
pub fn write_raw(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}

/// `v2.0 raw\n` followed by one lowercase hex byte per line.
pub fn write_logisim(bytes: &[u8]) -> String {
    let mut out = String::from("v2.0 raw\n");
    for byte in bytes {
        let _ = writeln!(out, "{byte:02x}");
    }
    out
}

pub fn render(format: Format, bytes: &[u8]) -> Vec<u8> {
    match format {
        Format::Raw => write_raw(bytes),
        Format::Logisim => write_logisim(bytes).into_bytes(),
    }
}

/// Parse a previously written Logisim `v2.0 raw` text image back to bytes,
/// for `j80 run` loading an already-assembled file.
pub fn parse_logisim(text: &str) -> Result<Vec<u8>, String> {
    let mut lines = text.lines();
    match lines.next() {
        Some("v2.0 raw") => {}
        Some(other) => return Err(format!("unrecognized Logisim header: '{other}'")),
        None => return Err("empty Logisim file".to_string()),
    }
    lines
        .filter(|l| !l.trim().is_empty())
        .map(|l| u8::from_str_radix(l.trim(), 16).map_err(|_| format!("invalid hex byte: '{l}'")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_format_is_the_bytes_unchanged() {
        assert_eq!(write_raw(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn logisim_format_has_header_and_one_byte_per_line() {
        let text = write_logisim(&[0x00, 0xFF, 0x42]);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("v2.0 raw"));
        assert_eq!(lines.next(), Some("00"));
        assert_eq!(lines.next(), Some("ff"));
        assert_eq!(lines.next(), Some("42"));
    }

    #[test]
    fn format_parse_rejects_unknown_names() {
        assert_eq!(Format::parse("raw"), Some(Format::Raw));
        assert_eq!(Format::parse("logisim"), Some(Format::Logisim));
        assert_eq!(Format::parse("elf"), None);
    }

    #[test]
    fn logisim_round_trips_through_parse() {
        let bytes = vec![0x00, 0xFF, 0x42];
        let text = write_logisim(&bytes);
        assert_eq!(parse_logisim(&text).unwrap(), bytes);
    }

    #[test]
    fn parse_logisim_rejects_missing_header() {
        assert!(parse_logisim("00\nff\n").is_err());
    }
}
