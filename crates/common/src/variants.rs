use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;

use crate::names::sanitize;

/// Substitutions applied in order, each one to every spelling collected so far.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    (" ", "_"),
    (" ", "-"),
    ("_", "."),
    (":", "_"),
    ("_", "?"),
    ("_", "."),
    ("_", "!"),
    ("_.", ".."),
];

/// Every spelling under which a downloader may have written `filename`.
///
/// The result always contains `filename` itself and its sanitized form, plus
/// ASCII-folded, lowercased, trimmed and punctuation-substituted stems with
/// the original extension reattached.
pub fn possible_filenames(filename: &str) -> BTreeSet<String> {
    let (stem, ext) = split_extension(filename);

    let mut stems = BTreeSet::new();
    stems.insert(stem.to_string());
    stems.insert(sanitize(stem));

    let folded = fold_to_ascii(stem);
    stems.insert(keep_plain_chars(&folded));
    stems.insert(folded);

    expand(&mut stems, |s| s.to_lowercase());
    expand(&mut stems, |s| s.trim().to_string());
    for (from, to) in SUBSTITUTIONS {
        expand(&mut stems, |s| s.replace(from, to));
    }

    let mut names: BTreeSet<String> = stems.into_iter().map(|s| format!("{s}{ext}")).collect();
    names.insert(filename.to_string());
    names.insert(sanitize(filename));
    names
}

fn expand(stems: &mut BTreeSet<String>, f: impl Fn(&str) -> String) {
    let derived: Vec<String> = stems.iter().map(|s| f(s.as_str())).collect();
    stems.extend(derived);
}

/// Compatibility decomposition with every non-ASCII code point dropped.
fn fold_to_ascii(text: &str) -> String {
    text.nfkd().filter(char::is_ascii).collect()
}

fn keep_plain_chars(text: &str) -> String {
    text.chars()
        .filter(|ch| {
            ch.is_ascii_alphanumeric() || ch.is_ascii_whitespace() || matches!(ch, '-' | '_' | '.')
        })
        .collect()
}

/// Splits at the last `.`, leaving dotfiles and extensionless names whole.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}
