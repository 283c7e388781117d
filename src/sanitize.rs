//! Cleans raw model output into one or two speakable sentences.
//!
//! Each stage is a plain function so callers and tests can run them alone;
//! [`Sanitizer::clean`] chains them in order.

use regex::Regex;
use std::sync::LazyLock;

static RE_FENCED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)---.*?---").unwrap());
static RE_ACTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*[^*\n]*\*").unwrap());
static RE_BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)\n]*\)|\[[^\]\n]*\]").unwrap());
static RE_BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\bas an ai\b( language model)?[^.!?]*[.!?]?|\bi'?m (just )?an ai\b[^.!?]*[.!?]?|sure[,!]? here('s| is)[^:\n]*:|here('s| is) (my|a|the) (reply|response|line)[^:\n]*:)",
    )
    .unwrap()
});
static RE_INSTRUCTION_ECHO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(note|response|reply|answer|output|instruction|context)\s*:|\b(keep it (under|within|short)|in (under )?\d+ (characters|words)|respond in character)[^.!?\n]*[.!?]?",
    )
    .unwrap()
});
static RE_SPEAKER_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\*\*)?[A-Z][A-Za-z'-]*(?: [A-Z][A-Za-z'-]*){0,2}(\*\*)?\s*[:：]\s*").unwrap());
static RE_SENTENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^.!?…]+(?:[.!?…]+|$)").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Fragments that only show up when a model leaks its prompt or transcript format
const LEAK_MARKERS: &[&str] = &["human=", "assistant:", "user:", "system:", "<|", "|>"];

/// Removes stage directions, assistant boilerplate and echoed instructions.
pub fn strip_meta(text: &str) -> String {
    let text = RE_FENCED.replace_all(text, " ");
    let text = RE_ACTION.replace_all(&text, " ");
    let text = RE_BRACKETED.replace_all(&text, " ");
    let text = RE_BOILERPLATE.replace_all(&text, " ");
    let text = RE_INSTRUCTION_ECHO.replace_all(&text, " ");
    collapse_whitespace(&text)
}

/// Removes a leading `Name:` label (known names or any capitalized label)
/// and quotes wrapped around the whole line.
pub fn strip_name_prefix(text: &str, names: &[String]) -> String {
    let mut text = text.trim().to_string();

    loop {
        let before = text.len();
        for name in names {
            for separator in [":", "：", " says:", " said:"] {
                let label = format!("{}{}", name, separator);
                if text.len() >= label.len() && text.is_char_boundary(label.len()) && text[..label.len()].eq_ignore_ascii_case(&label) {
                    text = text[label.len()..].trim_start().to_string();
                }
            }
        }
        text = RE_SPEAKER_LABEL.replace(&text, "").into_owned();
        text = trim_quotes(&text);
        if text.len() == before {
            break;
        }
    }
    text
}

fn trim_quotes(text: &str) -> String {
    let trimmed = text.trim();
    let quotes = ['"', '\'', '“', '”', '‘', '’', '「', '」'];
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if quotes.contains(&first) && quotes.contains(&last) => {
            chars.as_str().trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Drops letters from non-Latin scripts along with full-width punctuation.
pub fn strip_foreign_script(text: &str) -> String {
    let kept: String = text
        .chars()
        .map(|c| if is_foreign(c) { ' ' } else { c })
        .collect();
    collapse_whitespace(&kept)
}

fn is_foreign(c: char) -> bool {
    let code = c as u32;
    if matches!(code, 0x3000..=0x303F | 0xFF00..=0xFFEF) {
        return true;
    }
    if !c.is_alphabetic() || c.is_ascii() {
        return false;
    }
    // Latin-1 supplement, Latin extended A/B, Latin extended additional
    !matches!(code, 0x00C0..=0x024F | 0x1E00..=0x1EFF)
}

/// Splits text into sentences, keeping terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    RE_SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

/// Removes repeated sentences, comparing only letters and digits.
pub fn dedupe(sentences: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    sentences
        .into_iter()
        .filter(|sentence| {
            let key: String = sentence
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        })
        .collect()
}

/// Keeps at most `max_sentences` sentences and cuts to `max_chars` at a word
/// boundary.
pub fn truncate(sentences: &[String], max_sentences: usize, max_chars: usize) -> String {
    let mut out = String::new();
    for sentence in sentences.iter().take(max_sentences.max(1)) {
        let candidate = if out.is_empty() {
            sentence.clone()
        } else {
            format!("{} {}", out, sentence)
        };
        if candidate.chars().count() > max_chars && !out.is_empty() {
            break;
        }
        out = candidate;
    }

    if out.chars().count() <= max_chars {
        return out;
    }

    let cut: String = out.chars().take(max_chars).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(index) if index > 0 => cut[..index].to_string(),
        _ => cut,
    };
    let cut = cut.trim_end_matches(|c: char| c == ',' || c == ';' || c == ':' || c.is_whitespace());
    format!("{}...", cut)
}

/// True when cleaned text is unusable as a line of dialogue.
pub fn is_degenerate(text: &str, names: &[String], min_len: usize) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < min_len {
        return true;
    }
    if !trimmed.chars().any(char::is_alphabetic) {
        return true;
    }

    let bare = trimmed.trim_matches(|c: char| !c.is_alphanumeric());
    if names.iter().any(|name| name.eq_ignore_ascii_case(bare)) {
        return true;
    }

    let lower = trimmed.to_lowercase();
    LEAK_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Output cleaning pipeline for a town with known agent names
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    names: Vec<String>,
}

impl Sanitizer {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Runs every stage: meta, name prefix, foreign script, sentences,
    /// dedupe, truncate to two sentences within `max_chars`.
    pub fn clean(&self, raw: &str, max_chars: usize) -> String {
        let text = strip_meta(raw);
        let text = strip_name_prefix(&text, &self.names);
        let text = strip_foreign_script(&text);
        let sentences = dedupe(split_sentences(&text));
        truncate(&sentences, 2, max_chars)
    }

    pub fn is_degenerate(&self, text: &str, min_len: usize) -> bool {
        is_degenerate(text, &self.names, min_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["Alex".to_string(), "Emma".to_string()]
    }

    #[test]
    fn meta_is_removed() {
        let cleaned = strip_meta("*smiles warmly* (pauses) Sure, here's my reply: Good morning!");
        assert_eq!(cleaned, "Good morning!");
    }

    #[test]
    fn assistant_boilerplate_is_removed() {
        let cleaned = strip_meta("As an AI language model, I cannot have opinions. The bread is fresh today.");
        assert_eq!(cleaned, "The bread is fresh today.");
    }

    #[test]
    fn name_prefix_and_quotes_are_removed() {
        assert_eq!(strip_name_prefix("Alex: \"Nice weather!\"", &names()), "Nice weather!");
        assert_eq!(strip_name_prefix("**Emma**: Hi there.", &names()), "Hi there.");
        assert_eq!(strip_name_prefix("emma says: Hi there.", &names()), "Hi there.");
    }

    #[test]
    fn foreign_script_is_dropped_latin_kept() {
        assert_eq!(strip_foreign_script("Café time 你好！ really"), "Café time really");
        assert_eq!(strip_foreign_script("Привет friend"), "friend");
    }

    #[test]
    fn sentences_split_and_dedupe() {
        let sentences = split_sentences("Hello there! Hello there! How are you? Fine");
        assert_eq!(sentences.len(), 4);
        let unique = dedupe(sentences);
        assert_eq!(unique, vec!["Hello there!", "How are you?", "Fine"]);
    }

    #[test]
    fn truncate_keeps_two_sentences_within_limit() {
        let sentences = vec!["One.".to_string(), "Two.".to_string(), "Three.".to_string()];
        assert_eq!(truncate(&sentences, 2, 100), "One. Two.");

        let long = vec!["This sentence is definitely much longer than the limit allows".to_string()];
        let cut = truncate(&long, 2, 20);
        assert!(cut.chars().count() <= 23);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn clean_runs_full_pipeline() {
        let sanitizer = Sanitizer::new(names());
        let cleaned = sanitizer.clean("Alex: *waves* Morning, Emma! Morning, Emma! Coffee? Or tea? Or juice?", 100);
        assert_eq!(cleaned, "Morning, Emma! Coffee?");
    }

    #[test]
    fn degenerate_detection() {
        let names = names();
        assert!(is_degenerate("", &names, 5));
        assert!(is_degenerate("...!!", &names, 2));
        assert!(is_degenerate("Emma.", &names, 2));
        assert!(is_degenerate("Sure. Human= hi", &names, 2));
        assert!(!is_degenerate("Good to see you.", &names, 5));
    }
}
