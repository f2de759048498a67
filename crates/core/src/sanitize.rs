use std::path::PathBuf;

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const MAX_EXTENSION_LEN: usize = 10;

/// Sanitizes a rendered template path segment by segment.
///
/// A leading `/` is kept so absolute templates stay absolute. Empty segments
/// produced by `//` are dropped. The last segment is treated as a file name.
pub fn sanitize_rendered_path(rendered: &str) -> PathBuf {
    let mut out = PathBuf::new();
    if rendered.starts_with('/') {
        out.push("/");
    }

    let mut segments: Vec<&str> = rendered.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        segments.push("");
    }
    let last = segments.len().saturating_sub(1);
    for (index, segment) in segments.iter().enumerate() {
        if index == last {
            out.push(sanitize_file_name(segment));
        } else {
            out.push(sanitize_segment(segment));
        }
    }
    out
}

/// Sanitizes the name portion of a file name and reattaches its extension verbatim.
pub fn sanitize_file_name(value: &str) -> String {
    match split_extension(value) {
        Some((stem, ext)) => format!("{}.{}", sanitize_segment(stem), ext),
        None => sanitize_segment(value),
    }
}

pub fn sanitize_segment(value: &str) -> String {
    let mut replaced = String::with_capacity(value.len());
    for ch in value.chars() {
        if is_disallowed_char(ch) {
            replaced.push('_');
        } else {
            replaced.push(ch);
        }
    }

    let collapsed = collapse_underscores(&replaced);
    let mut out = collapsed
        .trim_matches(|c: char| c == '_' || c == '.' || c.is_whitespace())
        .to_string();

    if out.is_empty() {
        out = "untitled".to_string();
    }

    if is_windows_reserved(&out) {
        out.push_str("_file");
    }

    out
}

fn split_extension(value: &str) -> Option<(&str, &str)> {
    let dot = value.rfind('.')?;
    let (stem, ext) = (&value[..dot], &value[dot + 1..]);
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some((stem, ext))
}

fn collapse_underscores(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_underscore = false;
    for ch in value.chars() {
        if ch == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        out.push(ch);
    }
    out
}

fn is_disallowed_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*') || ch.is_control()
}

fn is_windows_reserved(value: &str) -> bool {
    let stem = value
        .split('.')
        .next()
        .unwrap_or(value)
        .trim()
        .to_ascii_uppercase();
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| reserved == &stem)
}
