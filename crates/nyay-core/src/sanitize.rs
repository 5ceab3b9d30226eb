//! Input validation and web-content cleanup.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::Error;
use crate::text::truncate_chars;

/// Longest query accepted; longer input is cut, not rejected.
pub const MAX_QUERY_CHARS: usize = 2000;
pub const MIN_QUERY_CHARS: usize = 3;

const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?(previous|above|prior)\s+(instructions?|prompts?)",
    r"disregard\s+(all\s+)?(previous|above|prior)",
    r"forget\s+(everything|all)",
    r"you\s+are\s+now\s+a",
    r"act\s+as\s+(if\s+you\s+are|a)",
    r"pretend\s+(to\s+be|you\s+are)",
    r"new\s+instructions?:",
    r"system\s*prompt:",
    r"<\s*script",
    r"javascript:",
    r"data:\s*text/html",
];

fn injection_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        INJECTION_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
            .collect()
    })
}

/// Whether `text` looks like an attempt to override the system prompt.
pub fn detect_prompt_injection(text: &str) -> bool {
    let hit = injection_patterns().iter().any(|re| re.is_match(text));
    if hit {
        warn!(preview = %truncate_chars(text, 50), "Potential prompt injection detected");
    }
    hit
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean a user question, or explain why it cannot be used.
pub fn validate_query(query: &str) -> Result<String, Error> {
    if query.trim().is_empty() {
        return Err(Error::invalid_request("Query cannot be empty"));
    }

    let cut = truncate_chars(query, MAX_QUERY_CHARS).replace('\0', "");
    let cleaned = collapse_whitespace(&cut);

    if cleaned.chars().count() < MIN_QUERY_CHARS {
        return Err(Error::invalid_request(format!(
            "Query too short (minimum {} characters)",
            MIN_QUERY_CHARS
        )));
    }

    if detect_prompt_injection(&cleaned) {
        return Err(Error::invalid_request("Query contains potentially harmful content"));
    }

    Ok(cleaned)
}

/// Plain text from untrusted HTML: scripts, styles and tags removed,
/// entities decoded, control characters dropped, whitespace collapsed,
/// cut to `max_chars`.
pub fn sanitize_web_content(html: &str, max_chars: usize) -> String {
    static SCRIPT: OnceLock<Option<Regex>> = OnceLock::new();
    static STYLE: OnceLock<Option<Regex>> = OnceLock::new();
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();

    if html.is_empty() {
        return String::new();
    }

    let script_re = SCRIPT.get_or_init(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").ok());
    let style_re = STYLE.get_or_init(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").ok());
    let tag_re = TAG.get_or_init(|| Regex::new(r"<[^>]+>").ok());

    let mut out: Cow<'_, str> = Cow::Borrowed(html);
    if let Some(re) = script_re.as_ref() {
        out = Cow::Owned(re.replace_all(&out, "").into_owned());
    }
    if let Some(re) = style_re.as_ref() {
        out = Cow::Owned(re.replace_all(&out, "").into_owned());
    }
    if let Some(re) = tag_re.as_ref() {
        out = Cow::Owned(re.replace_all(&out, " ").into_owned());
    }

    clean_extracted_text(&decode_entities(&out), max_chars)
}

/// Tidy text that a DOM parser has already extracted and decoded: control
/// characters dropped, whitespace collapsed, cut to `max_chars`. Markup-like
/// spans such as `term < 3 years` are kept as written.
pub fn clean_extracted_text(text: &str, max_chars: usize) -> String {
    static CONTROL: OnceLock<Option<Regex>> = OnceLock::new();

    let control_re = CONTROL.get_or_init(|| Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f]").ok());
    let text = match control_re.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => Cow::Borrowed(text),
    };

    let text = collapse_whitespace(&text);
    truncate_chars(&text, max_chars).trim().to_string()
}

/// Decode named and numeric HTML character references.
pub fn decode_entities(text: &str) -> String {
    static ENTITY: OnceLock<Option<Regex>> = OnceLock::new();

    let Some(re) = ENTITY
        .get_or_init(|| Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").ok())
        .as_ref()
    else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &regex::Captures<'_>| {
        let entity = &caps[1];
        let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = entity.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(entity)
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "rsquo" => '’',
        "lsquo" => '‘',
        "rdquo" => '”',
        "ldquo" => '“',
        "sect" => '§',
        "copy" => '©',
        "reg" => '®',
        _ => return None,
    })
}
