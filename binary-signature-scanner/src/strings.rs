// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Printable string extraction, similar to `strings(1)`. */

use serde::Serialize;

/// Default minimum length of an extracted string, in characters.
pub const DEFAULT_MIN_STRING_LENGTH: usize = 4;

/// A run of printable text found in an artifact.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ExtractedString {
    /// Offset of the first byte of the run within the artifact.
    pub offset: u64,
    pub value: String,
}

/// Length of the printable character starting at `data[0]`, if any.
fn printable_len(data: &[u8]) -> Option<usize> {
    let first = *data.first()?;

    match first {
        b'\t' | 0x20..=0x7e => Some(1),
        0xc2..=0xf4 => {
            let width = match first {
                0xc2..=0xdf => 2,
                0xe0..=0xef => 3,
                _ => 4,
            };

            let s = std::str::from_utf8(data.get(..width)?).ok()?;

            if s.chars().all(|c| !c.is_control()) {
                Some(width)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Find maximal runs of printable characters in `data`.
///
/// Runs shorter than `min_length` characters are discarded. `base_offset` is
/// added to every reported offset so callers can report file offsets when
/// scanning a sub-slice.
pub fn extract_strings(data: &[u8], min_length: usize, base_offset: u64) -> Vec<ExtractedString> {
    let mut res = vec![];

    let mut start = 0;
    let mut chars = 0;
    let mut pos = 0;

    let mut flush = |start: usize, end: usize, chars: usize| {
        if chars >= min_length.max(1) {
            res.push(ExtractedString {
                offset: base_offset + start as u64,
                // Every byte in the run was validated as printable UTF-8.
                value: String::from_utf8_lossy(&data[start..end]).into_owned(),
            });
        }
    };

    while pos < data.len() {
        match printable_len(&data[pos..]) {
            Some(width) => {
                if chars == 0 {
                    start = pos;
                }
                chars += 1;
                pos += width;
            }
            None => {
                flush(start, pos, chars);
                chars = 0;
                pos += 1;
            }
        }
    }

    flush(start, pos, chars);

    res
}
