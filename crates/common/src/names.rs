//! Identity keys and filesystem-safe track filenames.

use std::sync::LazyLock;

use caseless::default_case_fold_str;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::IdentityKey;

pub const TRACK_EXTENSION: &str = ".mp3";

/// Characters replaced by `_` in filenames, in addition to C0 controls.
const FORBIDDEN_CHARS: &[char] = &['/', '#', ':', '|', '<', '>', '"', ',', '?', '!'];

/// Device names that cannot be used as a base name on Windows volumes.
const RESERVED_NAMES: &[&str] = &[
    "AUX", "CON", "NUL", "PRN", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// `Base.mp3` or `Base_<n>.mp3`, extension matched in any case.
static NUMBERED_TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(?P<base>.+?)(?:_(?P<n>\d+))?\.mp3$").unwrap());

/// NFC composition followed by full Unicode case folding.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfc().collect();
    default_case_fold_str(&composed).nfc().collect()
}

pub fn identity_key(artist: &str, title: &str) -> IdentityKey {
    IdentityKey {
        artist: normalize(artist.trim()),
        title: normalize(title.trim()),
    }
}

/// Replaces every character that is unsafe in a filename with `_`.
///
/// A reserved device name standing alone before the first `.` is replaced
/// as a whole. Applying the function twice gives the same result as once.
pub fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|ch| if is_forbidden(ch) { '_' } else { ch })
        .collect();
    let head_end = replaced.find('.').unwrap_or(replaced.len());
    let head = &replaced[..head_end];
    if RESERVED_NAMES
        .iter()
        .any(|name| head.eq_ignore_ascii_case(name))
    {
        format!("_{}", &replaced[head_end..])
    } else {
        replaced
    }
}

fn is_forbidden(ch: char) -> bool {
    ch <= '\u{1f}' || FORBIDDEN_CHARS.contains(&ch)
}

pub fn canonical_stem(artist: &str, title: &str) -> String {
    sanitize(&format!("{artist} - {title}"))
}

pub fn canonical_filename(artist: &str, title: &str) -> String {
    format!("{}{}", canonical_stem(artist, title), TRACK_EXTENSION)
}

pub fn is_track_file(name: &str) -> bool {
    name.len() > TRACK_EXTENSION.len()
        && name
            .get(name.len() - TRACK_EXTENSION.len()..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(TRACK_EXTENSION))
}

/// Splits a track filename into its base stem and numbered suffix:
/// `Song_2.mp3` gives `("Song", Some(2))`, `Song.mp3` gives `("Song", None)`.
pub fn split_numbered(name: &str) -> Option<(&str, Option<u32>)> {
    let caps = NUMBERED_TRACK.captures(name)?;
    let base = caps.name("base")?;
    match caps.name("n").map(|n| n.as_str().parse::<u32>()) {
        Some(Ok(n)) => Some((base.as_str(), Some(n))),
        Some(Err(_)) => Some((&name[..name.len() - TRACK_EXTENSION.len()], None)),
        None => Some((base.as_str(), None)),
    }
}
