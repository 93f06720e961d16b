//! Deterministic segment-file extension generation (§6), a pure function of
//! `(basename, segment_number, format)`. Ported directly from libewf's
//! `libewf_filename_set_extension`.

use crate::error::{Error, Result};
use crate::format::Format;

/// Highest segment number the three-character scheme can address for the
/// widest family (EnCase/EWF, first letter `'E'`/`'e'`): `'E'` through `'Z'`
/// is 22 first-letters times 26*26 second/third combinations, plus the 99
/// purely-numeric segment numbers below it. Narrower families (SMART's `'s'`,
/// LVF's `'L'`) hit their own, smaller ceiling first — enforced in
/// `extension_with_chars` — regardless of this constant.
pub const MAX_SEGMENT_NUMBER: u32 = 14_971;

/// Builds the three-character extension for `segment_number` under `format`.
///
/// `segment_number` is 1-based. Returns `LimitExceeded` for `0` or anything
/// past [`MAX_SEGMENT_NUMBER`].
pub fn extension(segment_number: u32, format: Format) -> Result<String> {
    let (first_ch, add_ch) = format.extension_chars();
    extension_with_chars(segment_number, first_ch, add_ch)
}

/// Builds the three-character extension for a `.Dxx` delta file, which always
/// uses the lowercase `'d'`/`'a'` pair regardless of the base image's format.
pub fn delta_extension(segment_number: u32) -> Result<String> {
    extension_with_chars(segment_number, b'd', b'a')
}

fn extension_with_chars(segment_number: u32, first_ch: u8, add_ch: u8) -> Result<String> {
    if segment_number == 0 || segment_number > MAX_SEGMENT_NUMBER {
        return Err(Error::LimitExceeded(format!(
            "segment number {segment_number} outside [1, {MAX_SEGMENT_NUMBER}]"
        )));
    }

    let mut ext = [0u8; 3];

    if segment_number <= 99 {
        ext[0] = first_ch;
        ext[1] = b'0' + (segment_number / 10) as u8;
        ext[2] = b'0' + (segment_number % 10) as u8;
    } else {
        let mut n = segment_number - 100;
        ext[2] = add_ch + (n % 26) as u8;
        n /= 26;
        ext[1] = add_ch + (n % 26) as u8;
        n /= 26;
        let last_letter = if add_ch == b'a' { b'z' } else { b'Z' };
        if first_ch as u32 + n > last_letter as u32 {
            return Err(Error::LimitExceeded(format!(
                "segment number {segment_number} overflows the three-character extension scheme"
            )));
        }
        ext[0] = first_ch + n as u8;
    }

    Ok(String::from_utf8(ext.to_vec()).expect("extension bytes are always ASCII"))
}

/// Builds the full path `"{basename}.{ext}"` for a segment file.
pub fn segment_path(basename: &str, segment_number: u32, format: Format) -> Result<String> {
    Ok(format!("{basename}.{}", extension(segment_number, format)?))
}

/// Glob pattern matching every segment file that could belong to the image
/// identified by `path` (mirrors the teacher's `find_files` helper, which
/// replaces the two-character numeric suffix with a wildcard).
pub fn sibling_glob(basename: &str) -> String {
    format!("{basename}.???")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totality_for_encase() {
        assert_eq!(extension(1, Format::Encase6).unwrap(), "E01");
        assert_eq!(extension(99, Format::Encase6).unwrap(), "E99");
        assert_eq!(extension(100, Format::Encase6).unwrap(), "EAA");
        assert_eq!(extension(MAX_SEGMENT_NUMBER, Format::Encase6).unwrap(), "ZZZ");
    }

    #[test]
    fn refuses_out_of_range() {
        assert!(extension(0, Format::Encase6).is_err());
        assert!(extension(MAX_SEGMENT_NUMBER + 1, Format::Encase6).is_err());
    }

    #[test]
    fn family_prefixes() {
        assert_eq!(extension(1, Format::Ewf).unwrap(), "e01");
        assert_eq!(extension(1, Format::Smart).unwrap(), "s01");
        assert_eq!(extension(1, Format::Lvf).unwrap(), "L01");
        assert_eq!(extension(100, Format::Ewf).unwrap(), "eaa");
    }

    #[test]
    fn monotonic_over_full_range() {
        let mut seen = std::collections::HashSet::new();
        for n in 1..=MAX_SEGMENT_NUMBER {
            let e = extension(n, Format::Encase6).unwrap();
            assert_eq!(e.len(), 3);
            assert!(seen.insert(e), "extension collided at segment {n}");
        }
    }
}
