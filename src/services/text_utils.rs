//! Name normalization shared by title and chapter identity.
//!
//! Titles and chapters are keyed by slugs computed from their folder or file
//! names. Both go through the same pipeline so that a title folder and a
//! single-file title with the same name land on the same key.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Bracketed release noise: `[Group]`, `(2019)`, `{Digital}`.
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("valid bracket pattern"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Strip bracketed groups and surrounding whitespace from a name.
///
/// The input is a bare name (no extension). Separators are left alone so the
/// result stays recognizable in logs.
pub fn strip_patterns(name: &str) -> String {
    let stripped = BRACKETED.replace_all(name, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Human-readable name: pattern-stripped with `_`, `-` and `.` shown as spaces.
pub fn display_name(name: &str) -> String {
    let stripped = strip_patterns(name).replace(['_', '-', '.'], " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Lower-cased, hyphenated identifier.
///
/// Runs of anything that is not alphanumeric collapse into a single `-`, and
/// leading/trailing hyphens are dropped. Returns an empty string when the name
/// has no alphanumeric content left after pattern stripping.
pub fn slugify(name: &str) -> String {
    let stripped = strip_patterns(name);
    let mut slug = String::with_capacity(stripped.len());
    let mut pending_dash = false;

    for c in stripped.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Whether a pattern-stripped name contains at least one digit.
///
/// Used to tell chapter entries apart from folder clutter such as a
/// description file or cover image without a number in its name.
pub fn has_digit(name: &str) -> bool {
    strip_patterns(name).chars().any(|c| c.is_ascii_digit())
}

/// Name used for identity: the file stem for files, the full name for folders.
pub fn entry_base_name(path: &Path, is_dir: bool) -> Option<String> {
    let name = if is_dir {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
}
