//! `header` / `header2` / `xheader` section codec (§3, §4.3).
//!
//! Textual acquisition metadata (case number, examiner, notes, …), DEFLATE
//! compressed and encoded as ASCII (`header`), UTF-16LE (`header2`), or
//! UTF-8 (`xheader`). Decoding is adapted directly from the teacher crate's
//! `EwfHeaderSection`; encoding is new, built to round-trip it.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::codec;
use crate::error::{Error, Result};
use crate::format::CompressionLevel;

/// Canonical single-character field identifiers, in the order EnCase/FTK
/// tools display them. Kept here (not just in the CLI) so the writer emits a
/// stable, predictable field order.
pub const FIELD_ORDER: &[&str] = &[
    "c", "n", "a", "e", "t", "av", "ov", "m", "u", "p",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEncoding {
    Ascii,
    Utf16Le,
    Utf8,
}

/// Parsed key/value metadata store backing `header`/`header2`/`xheader`.
#[derive(Debug, Clone, Default)]
pub struct HeaderValues {
    pub fields: HashMap<String, String>,
}

impl HeaderValues {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Renders the tab-separated two-line table plus the `1`/`main` preamble
    /// libewf-compatible tools expect, then the requested text encoding.
    fn render_text(&self) -> String {
        let present: Vec<&str> = FIELD_ORDER
            .iter()
            .copied()
            .filter(|k| self.fields.contains_key(*k))
            .collect();
        let mut extra: Vec<&str> = self
            .fields
            .keys()
            .map(|s| s.as_str())
            .filter(|k| !FIELD_ORDER.contains(k))
            .collect();
        extra.sort_unstable();

        let keys: Vec<&str> = present.into_iter().chain(extra).collect();
        let values: Vec<&str> = keys
            .iter()
            .map(|k| self.fields.get(*k).map(|s| s.as_str()).unwrap_or(""))
            .collect();

        format!("1\nmain\n{}\n{}\n\n", keys.join("\t"), values.join("\t"))
    }

    fn encode_text(text: &str, encoding: HeaderEncoding) -> Vec<u8> {
        match encoding {
            HeaderEncoding::Ascii | HeaderEncoding::Utf8 => text.as_bytes().to_vec(),
            HeaderEncoding::Utf16Le => text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
        }
    }

    /// Compresses and serializes this metadata as one `header`/`header2`/`xheader` payload.
    pub fn encode(&self, encoding: HeaderEncoding, level: CompressionLevel) -> Result<Vec<u8>> {
        let text = self.render_text();
        let raw = Self::encode_text(&text, encoding);
        codec::compress(&raw, level)
    }

    /// Decodes a `header`/`header2`/`xheader` payload (adapted from the teacher's
    /// `EwfHeaderSection::decode`/`parse_metadata`/`table_to_map`).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let raw = codec::decompress(payload)?;
        let text = decode_text(&raw);
        Ok(Self {
            fields: parse_metadata(&text),
        })
    }

    /// Merges `other`'s fields into `self`, with `other` winning on key
    /// collisions — mirrors the teacher's "header2 values overwrite
    /// duplicates from header (UTF-16 beats ASCII)" rule, generalized to any
    /// later, more specific section in the `header` < `header2` < `xheader`
    /// preference order (§4.3).
    pub fn merge_from(&mut self, other: HeaderValues) {
        self.fields.extend(other.fields);
    }
}

fn decode_text(raw: &[u8]) -> String {
    if let Ok(txt) = String::from_utf8(raw.to_vec()) {
        return txt;
    }
    if raw.len() % 2 == 0 {
        let utf16: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        if let Ok(txt) = String::from_utf16(&utf16) {
            return txt;
        }
    }
    String::new()
}

fn table_to_map(keys: &str, vals: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (k, v) in keys.split('\t').zip(vals.split('\t')) {
        map.insert(
            k.trim_matches('\0').to_string(),
            v.trim_matches('\0').to_string(),
        );
    }
    map
}

/// Robust parser that copes with an optional BOM, an optional blank line
/// before the table, and the classic one-entry-per-line fallback used in old
/// images.
fn parse_metadata(txt: &str) -> HashMap<String, String> {
    let mut lines: Vec<&str> = txt
        .split(['\n', '\r'])
        .filter(|l| !l.trim().is_empty())
        .collect();

    if let Some(first) = lines.first_mut() {
        *first = first.trim_start_matches('\u{FEFF}');
    }

    for i in 0..lines.len().saturating_sub(1) {
        if lines[i].contains('\t') && lines[i + 1].contains('\t') {
            return table_to_map(lines[i], lines[i + 1]);
        }
    }

    let mut map = HashMap::new();
    for l in lines {
        if let Some((k, v)) = l.split_once('\t') {
            map.insert(
                k.trim_matches('\0').to_string(),
                v.trim_matches('\0').to_string(),
            );
        }
    }
    map
}

pub fn read_from<R: Read>(r: &mut R, payload_size: u64) -> Result<HeaderValues> {
    let mut payload = vec![0u8; payload_size as usize];
    r.read_exact(&mut payload)
        .map_err(|e| Error::io("reading header payload", e))?;
    HeaderValues::decode(&payload)
}

pub fn write_to<W: Write>(
    w: &mut W,
    values: &HeaderValues,
    encoding: HeaderEncoding,
    level: CompressionLevel,
) -> Result<u64> {
    let bytes = values.encode(encoding, level)?;
    w.write_all(&bytes)
        .map_err(|e| Error::io("writing header payload", e))?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HeaderValues {
        let mut h = HeaderValues::default();
        h.set("c", "CASE-001");
        h.set("e", "J. Examiner");
        h.set("t", "notes here");
        h
    }

    #[test]
    fn roundtrip_ascii() {
        let h = sample();
        let bytes = h.encode(HeaderEncoding::Ascii, CompressionLevel::Fast).unwrap();
        let back = HeaderValues::decode(&bytes).unwrap();
        assert_eq!(back.get("c"), Some("CASE-001"));
        assert_eq!(back.get("e"), Some("J. Examiner"));
    }

    #[test]
    fn roundtrip_utf16le() {
        let h = sample();
        let bytes = h.encode(HeaderEncoding::Utf16Le, CompressionLevel::Best).unwrap();
        let back = HeaderValues::decode(&bytes).unwrap();
        assert_eq!(back.get("t"), Some("notes here"));
    }

    #[test]
    fn merge_prefers_later() {
        let mut base = sample();
        let mut patch = HeaderValues::default();
        patch.set("c", "CASE-002");
        base.merge_from(patch);
        assert_eq!(base.get("c"), Some("CASE-002"));
        assert_eq!(base.get("e"), Some("J. Examiner"));
    }
}
