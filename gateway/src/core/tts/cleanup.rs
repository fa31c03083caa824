//! Strips stage directions from model replies before synthesis.

use once_cell::sync::Lazy;
use regex::Regex;

/// Spoken when nothing usable survives cleanup.
pub const NEUTRAL_UTTERANCE: &str = "I understand.";

const MIN_SPOKEN_CHARS: usize = 3;

static NAME_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z\s]+:\s*").unwrap());
static WHOLLY_WRAPPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*([^*]+)\*$").unwrap());
static ACTION_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*[^*]*\*").unwrap());
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static EMOTICON: Lazy<Regex> = Lazy::new(|| Regex::new(r":\)|:\(|:D|;D|<3|XD|:P").unwrap());
static CUT_OFF_ACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*\*\w*$").unwrap());
static TRAILING_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static PUNCTUATION_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[.!?]+$").unwrap());
static MARKUP_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*()\[\]]").unwrap());

/// Returns the part of `text` meant to be spoken aloud. Never empty.
pub fn clean_for_speech(text: &str) -> String {
    let mut cleaned = NAME_PREFIX.replace(text.trim(), "").into_owned();

    cleaned = match WHOLLY_WRAPPED.captures(&cleaned) {
        Some(inner) => inner[1].to_string(),
        None => ACTION_SPAN
            .split(&cleaned)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    };

    cleaned = PARENTHETICAL.replace_all(&cleaned, "").into_owned();
    cleaned = BRACKETED.replace_all(&cleaned, "").into_owned();
    cleaned = EMOTICON.replace_all(&cleaned, "").into_owned();
    cleaned = CUT_OFF_ACTION.replace(&cleaned, "").into_owned();
    cleaned = TRAILING_DASH.replace(&cleaned, "").into_owned();
    cleaned = cleaned.replace('*', "");
    cleaned = collapse_whitespace(&cleaned);

    if PUNCTUATION_ONLY.is_match(&cleaned) {
        cleaned.clear();
    }

    if cleaned.chars().count() >= MIN_SPOKEN_CHARS {
        return cleaned;
    }

    let stripped = collapse_whitespace(&MARKUP_CHARS.replace_all(text, " "));
    if stripped.chars().count() > MIN_SPOKEN_CHARS {
        stripped
    } else {
        NEUTRAL_UTTERANCE.to_string()
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
