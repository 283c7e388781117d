//! Marker-word sentiment used to check that generated lines fit the
//! interaction they were asked for.

const POSITIVE: &[&str] = &[
    "thank", "glad", "great", "love", "agree", "wonderful", "happy", "nice", "appreciate", "enjoy",
    "awesome", "fantastic", "brilliant", "delight", "pleasure", "exactly", "haha",
];

const NEGATIVE: &[&str] = &[
    "disagree", "wrong", "annoy", "hate", "ridiculous", "nonsense", "frustrat", "upset", "disappoint",
    "unfair", "stupid", "rude", "angry", "furious", "absurd", "irritat", "tired of", "sick of", "not true",
    "no way", "don't like", "can't believe", "makes no sense", "not okay", "whatever",
];

/// (positive, negative) marker counts in `text`
pub fn count_markers(text: &str) -> (usize, usize) {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();

    let count = |markers: &[&str]| -> usize {
        markers
            .iter()
            .map(|marker| {
                if marker.contains(' ') {
                    lower.matches(marker).count()
                } else {
                    words.iter().filter(|word| word.starts_with(marker)).count()
                }
            })
            .sum()
    };

    (count(POSITIVE), count(NEGATIVE))
}

pub fn has_negative_markers(text: &str) -> bool {
    count_markers(text).1 > 0
}

/// Net marker balance clamped to [-2, 2]
pub fn sentiment_bias(text: &str) -> i32 {
    let (positive, negative) = count_markers(text);
    (positive as i32 - negative as i32).clamp(-2, 2)
}
