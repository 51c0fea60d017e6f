//! Maps content keys onto file names inside the cache directory.
//!
//! Keys are opaque and may contain path separators, `..`, whitespace or
//! characters illegal on some platforms. The file name is the key with every
//! unsafe character replaced by `_`, runs of `_` collapsed and length
//! capped. Whenever that rewrite changed anything, a hash of the raw key is
//! appended so that `a/b` and `a_b` never share a file.
//!
//! In-progress files carry a `~` in their suffix. `~` is never kept in a
//! cached file name, so a partial file can never be mistaken for the cached
//! file of another key.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Suffix of a download that has not finished yet.
pub const PARTIAL_SUFFIX: &str = "~part";

/// Longest stem kept before the hash suffix.
const MAX_STEM_BYTES: usize = 120;

/// Final location of `key` inside `cache_dir`.
pub fn cached_file(cache_dir: &Path, key: &str) -> PathBuf {
    cache_dir.join(file_name_for_key(key))
}

/// In-progress location of one transfer of `key` inside `cache_dir`.
///
/// Each transfer gets its own file, so a transfer that is still winding down
/// never touches the file of a newer one.
pub fn partial_file(cache_dir: &Path, key: &str, transfer_id: Uuid) -> PathBuf {
    cache_dir.join(format!(
        "{}.{}{}",
        file_name_for_key(key),
        transfer_id.simple(),
        PARTIAL_SUFFIX
    ))
}

/// Characters that are always safe in a filename on macOS / Linux / Windows.
fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn file_name_for_key(key: &str) -> String {
    let replaced: String = key
        .chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect();
    let stem = collapse_runs(&replaced);
    let stem = stem.trim_matches(|c| c == '_' || c == '.');
    let stem = truncate_to_bytes(stem, MAX_STEM_BYTES);

    if stem.is_empty() {
        format!("key_{:016x}", fnv1a(key))
    } else if stem == key {
        stem.to_string()
    } else {
        format!("{}_{:016x}", stem, fnv1a(key))
    }
}

/// Collapse consecutive `_` characters to a single `_`.
fn collapse_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last: Option<char> = None;
    for c in s.chars() {
        if c == '_' && last == Some('_') {
            continue;
        }
        out.push(c);
        last = Some(c);
    }
    out
}

/// Truncate `s` to at most `max_bytes` bytes, respecting char boundaries.
fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// 64-bit FNV-1a; stable across builds, unlike `DefaultHasher`.
fn fnv1a(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    s.bytes()
        .fold(OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(PRIME))
}
