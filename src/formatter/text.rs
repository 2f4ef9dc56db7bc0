//! Markup stripping for card fields
//!
//! Field content is an HTML fragment that may carry media references,
//! inline emphasis and entities. `extract` turns it into plain text with
//! light emphasis markers. Only ASCII markup is matched, so any non-ASCII
//! text passes through unchanged.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid script/style pattern")
});

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern"));

static MEDIA_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<audio\b[^>]*>.*?</audio\s*>|<video\b[^>]*>.*?</video\s*>|<object\b[^>]*>.*?</object\s*>",
    )
    .expect("valid media block pattern")
});

static MEDIA_VOID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:img|source|embed)\b[^>]*>").expect("valid media tag pattern")
});

static SOUND_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[sound:[^\]]*\]").expect("valid sound pattern"));

static BOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:b|strong)\b[^>]*>(.*?)</(?:b|strong)\s*>").expect("valid bold pattern")
});

static ITALIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:i|em)\b[^>]*>(.*?)</(?:i|em)\s*>").expect("valid italic pattern")
});

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:div|p|li|tr|h[1-6]|blockquote|pre|ul|ol|table)\s*>")
        .expect("valid line break pattern")
});

// A tag must start with a letter so stray `<` in prose survives
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("valid tag pattern"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z]{2,8}));")
        .expect("valid entity pattern")
});

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid space pattern"));

static SPACE_AROUND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n *").expect("valid newline pattern"));

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline run pattern"));

/// Passes before `extract` gives up on reaching a fixed point
const MAX_PASSES: usize = 16;

/// First characters of every markup pattern
const MARKUP_STARTS: &[char] = &['<', '&', '['];

/// Strip markup and media references from a field, leaving readable text.
///
/// The transformation is repeated until the text stops changing, so
/// `extract(&extract(x)) == extract(x)` for every input. Each pass is linear
/// and at most `MAX_PASSES` run; markup nested deeper than that is flattened
/// by dropping the characters that could still start markup.
pub fn extract(raw: &str) -> String {
    let mut current = single_pass(raw);
    for _ in 1..MAX_PASSES {
        let next = single_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
    tracing::debug!(
        "markup still changing after {} passes, flattening {} bytes",
        MAX_PASSES,
        current.len()
    );
    flatten(&current)
}

/// No pattern can match once its first character is gone
fn flatten(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !MARKUP_STARTS.contains(c)).collect();
    normalize_whitespace(&stripped)
}

/// Extract every field of a note
pub fn extract_fields(fields: &[String]) -> Vec<String> {
    fields.iter().map(|field| extract(field)).collect()
}

fn single_pass(input: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(input, "");
    let text = replace_cow(text, &COMMENT, "");
    let text = replace_cow(text, &MEDIA_BLOCK, "");
    let text = replace_cow(text, &MEDIA_VOID, "");
    let text = replace_cow(text, &SOUND_REF, "");
    let text = emphasize(text, &BOLD, '*');
    let text = emphasize(text, &ITALIC, '_');
    let text = replace_cow(text, &LINE_BREAK, "\n");
    let text = replace_cow(text, &ANY_TAG, "");
    let text = decode_entities(text);
    normalize_whitespace(&text)
}

/// `Some` only when a replacement actually happened
fn changed(result: Cow<'_, str>) -> Option<String> {
    match result {
        Cow::Borrowed(_) => None,
        Cow::Owned(owned) => Some(owned),
    }
}

fn keep_or(text: Cow<'_, str>, replaced: Option<String>) -> Cow<'_, str> {
    match replaced {
        Some(owned) => Cow::Owned(owned),
        None => text,
    }
}

fn replace_cow<'a>(text: Cow<'a, str>, pattern: &Regex, replacement: &str) -> Cow<'a, str> {
    let replaced = changed(pattern.replace_all(&text, replacement));
    keep_or(text, replaced)
}

/// Wrap non-blank emphasized content in `marker`; blank emphasis just disappears
fn emphasize<'a>(text: Cow<'a, str>, pattern: &Regex, marker: char) -> Cow<'a, str> {
    let replaced = changed(pattern.replace_all(&text, |caps: &Captures| {
        let inner = &caps[1];
        if inner.trim().is_empty() {
            inner.to_string()
        } else {
            format!("{marker}{inner}{marker}")
        }
    }));
    keep_or(text, replaced)
}

fn decode_entities(text: Cow<'_, str>) -> Cow<'_, str> {
    if !text.contains('&') {
        return text;
    }
    let replaced = changed(ENTITY.replace_all(&text, |caps: &Captures| {
        let decoded = if let Some(dec) = caps.get(1) {
            dec.as_str().parse::<u32>().ok().and_then(decode_code_point)
        } else if let Some(hex) = caps.get(2) {
            u32::from_str_radix(hex.as_str(), 16)
                .ok()
                .and_then(decode_code_point)
        } else {
            caps.get(3).and_then(|name| named_entity(name.as_str()))
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    }));
    keep_or(text, replaced)
}

fn decode_code_point(code: u32) -> Option<char> {
    if code == 0 {
        return None;
    }
    char::from_u32(code)
}

fn named_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

fn normalize_whitespace(text: &str) -> String {
    let text = if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    };
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = SPACE_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim_matches(|c: char| c.is_ascii_whitespace())
        .to_string()
}
