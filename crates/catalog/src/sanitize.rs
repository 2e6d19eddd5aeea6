//! Path segment sanitization for cross-platform compatibility.
//!
//! Rendered names end up as directory and file names on Windows, Linux and
//! macOS, so anything one of them rejects is replaced while valid Unicode
//! (accents, CJK text) is preserved.

/// Characters that are invalid in Windows filenames.
pub const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive).
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const FALLBACK_NAME: &str = "unnamed";

/// Whether `replacement` can stand in for whitespace without itself needing sanitization.
pub fn is_valid_whitespace_replacement(replacement: &str) -> bool {
    !replacement.is_empty()
        && !replacement
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || ILLEGAL_CHARS.contains(&c))
}

/// Sanitize a string for use as a single path segment.
///
/// 1. Control and Windows-invalid characters become `_`, runs collapse into one
/// 2. Whitespace runs collapse into a single space
/// 3. Leading/trailing spaces and dots are trimmed
/// 4. An empty result becomes `"unnamed"`
/// 5. Remaining spaces are replaced by `whitespace` when it is a valid replacement
/// 6. Windows reserved names get a `_` prefix
///
/// The result is a fixed point: sanitizing it again with the same
/// `whitespace` returns it unchanged.
pub fn sanitize_segment(input: &str, whitespace: Option<&str>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;
    let mut last_was_space = false;

    for c in input.chars() {
        if c.is_control() || ILLEGAL_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
            }
            last_was_replacement = true;
            last_was_space = false;
        } else if c.is_whitespace() {
            if !last_was_space {
                result.push(' ');
            }
            last_was_space = true;
            last_was_replacement = false;
        } else {
            result.push(c);
            last_was_replacement = false;
            last_was_space = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    let named = match whitespace {
        Some(ws) if is_valid_whitespace_replacement(ws) => trimmed.replace(' ', ws),
        _ => trimmed.to_string(),
    };

    let upper = named.to_uppercase();
    let reserved = WINDOWS_RESERVED_NAMES
        .iter()
        .any(|r| upper == *r || upper.starts_with(&format!("{r}.")));
    if reserved {
        format!("_{named}")
    } else {
        named
    }
}

/// Sanitize a string for use as a filename, keeping spaces.
pub fn sanitize_filename(input: &str) -> String {
    sanitize_segment(input, None)
}
