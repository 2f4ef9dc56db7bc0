//! Safe output file names derived from deck or collection names

use std::num::NonZeroUsize;

/// Characters rejected by at least one common filesystem
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Base names Windows reserves regardless of extension
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const FALLBACK_NAME: &str = "anki-export";
const RESERVED_SUFFIX: &str = "_file";

const DEFAULT_MAX_BASE_LENGTH: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(length) => length,
    None => panic!("default length is non-zero"),
};

#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    pub replacement_char: char,
    pub add_extension: bool,
    pub extension: String,
    /// Maximum base name length in characters
    pub max_base_length: NonZeroUsize,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            replacement_char: '_',
            add_extension: true,
            extension: ".json".to_string(),
            max_base_length: DEFAULT_MAX_BASE_LENGTH,
        }
    }
}

impl SanitizeOptions {
    /// Options that return the bare base name
    pub fn without_extension() -> Self {
        Self {
            add_extension: false,
            ..Self::default()
        }
    }
}

fn is_invalid(c: char) -> bool {
    c.is_control() || INVALID_CHARS.contains(&c)
}

/// Turn `name` into a file name that is safe on every common platform.
///
/// Deck separators become `" - "`, forbidden and control characters are
/// replaced, and the result is never empty, never a reserved device name
/// and never longer than `max_base_length` characters before the extension.
/// With `add_extension = false` the function is idempotent.
pub fn sanitize(name: &str, options: &SanitizeOptions) -> String {
    let replacement = if is_invalid(options.replacement_char) {
        '_'
    } else {
        options.replacement_char
    };
    let max_length = options.max_base_length.get();

    let mut base = String::with_capacity(name.len());
    for c in name.replace("::", " - ").chars() {
        let c = if is_invalid(c) { replacement } else { c };
        if c == replacement && base.ends_with(replacement) {
            continue;
        }
        base.push(c);
    }

    let mut base = trim_name(&base).to_string();
    if base.is_empty() {
        base = FALLBACK_NAME.to_string();
    }
    if is_reserved(&base) {
        // CON.txt -> CON_file.txt
        base.insert_str(stem_len(&base), RESERVED_SUFFIX);
    }

    if base.chars().count() > max_length {
        base = base.chars().take(max_length).collect();
        base = trim_name(&base).to_string();
        if base.is_empty() {
            base = FALLBACK_NAME.chars().take(max_length).collect();
        }
        if is_reserved(&base) {
            // No room for the suffix: break the device name in place
            let end = stem_len(&base);
            let last = base[..end]
                .char_indices()
                .last()
                .map_or(0, |(index, _)| index);
            base.replace_range(last..end, "_");
        }
    }

    if options.add_extension && !options.extension.is_empty() {
        if !options.extension.starts_with('.') {
            base.push('.');
        }
        base.push_str(&options.extension);
    }
    base
}

fn stem_len(base: &str) -> usize {
    base.find('.').unwrap_or(base.len())
}

fn trim_name(name: &str) -> &str {
    name.trim().trim_end_matches('.').trim_end()
}

fn is_reserved(base: &str) -> bool {
    let stem = &base[..stem_len(base)];
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}
