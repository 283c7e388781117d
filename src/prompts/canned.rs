//! Fallback lines used when generation fails, times out, or produces
//! something unusable.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::relationship::Tier;
use crate::types::InteractionType;

const COLD_OPENERS: &[&str] = &["Hello.", "Oh, it's you.", "Morning.", "Hi there."];
const NEUTRAL_OPENERS: &[&str] = &[
    "Hey, how's your day going?",
    "Good to see you. Busy day?",
    "Hi! Anything new with you?",
];
const WARM_OPENERS: &[&str] = &[
    "There you are! I was hoping to run into you.",
    "Hey friend, how have you been?",
    "So good to see you! Got a minute to chat?",
];

const FRIENDLY_REPLIES: &[&str] = &[
    "Great to see you too, I'm glad we ran into each other.",
    "Thanks for asking, it's been a nice day so far.",
];
const CASUAL_REPLIES: &[&str] = &["Not bad, same as usual.", "Oh, hi. Just passing through."];
const MISUNDERSTANDING_REPLIES: &[&str] = &[
    "Wait, that's wrong, it's not what I meant at all.",
    "I think you've got it wrong, that's not what I said.",
];
const ARGUMENT_REPLIES: &[&str] = &[
    "I disagree, and honestly that's a bit unfair.",
    "No way, that's just wrong.",
    "I'm tired of hearing that, it makes no sense.",
];

const COLD_ACKNOWLEDGMENTS: &[&str] = &["Right.", "If you say so.", "Hm."];
const NEUTRAL_ACKNOWLEDGMENTS: &[&str] = &["Mm, I see.", "Fair enough.", "Okay."];
const WARM_ACKNOWLEDGMENTS: &[&str] = &["Ha, true!", "Good point, as always.", "Mm, I know what you mean."];

const THOUGHTS: &[&str] = &[
    "I should make some time for the people I care about.",
    "Today feels like it could go either way.",
    "I wonder what everyone else is up to.",
];

const CHAT_REPLIES: &[&str] = &["Hmm, let me think about that.", "Interesting, tell me more.", "I see what you mean."];

fn pick<R: Rng + ?Sized>(lines: &[&str], rng: &mut R) -> String {
    lines.choose(rng).copied().unwrap_or("Hello.").to_string()
}

pub fn opener<R: Rng + ?Sized>(tier: Tier, rng: &mut R) -> String {
    match tier {
        Tier::Cold => pick(COLD_OPENERS, rng),
        Tier::Neutral => pick(NEUTRAL_OPENERS, rng),
        Tier::Warm => pick(WARM_OPENERS, rng),
    }
}

/// A reply that carries the tone the interaction type calls for
pub fn reply<R: Rng + ?Sized>(kind: InteractionType, rng: &mut R) -> String {
    match kind {
        InteractionType::FriendlyChat | InteractionType::GroupDiscussion => pick(FRIENDLY_REPLIES, rng),
        InteractionType::CasualMeeting => pick(CASUAL_REPLIES, rng),
        InteractionType::Misunderstanding => pick(MISUNDERSTANDING_REPLIES, rng),
        InteractionType::Argument | InteractionType::Conflict => pick(ARGUMENT_REPLIES, rng),
    }
}

pub fn acknowledgment<R: Rng + ?Sized>(tier: Tier, rng: &mut R) -> String {
    match tier {
        Tier::Cold => pick(COLD_ACKNOWLEDGMENTS, rng),
        Tier::Neutral => pick(NEUTRAL_ACKNOWLEDGMENTS, rng),
        Tier::Warm => pick(WARM_ACKNOWLEDGMENTS, rng),
    }
}

pub fn thought<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(THOUGHTS, rng)
}

pub fn chat_reply<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(CHAT_REPLIES, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::has_negative_markers;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn negative_replies_read_negative() {
        let mut rng = StdRng::seed_from_u64(1);
        for line in MISUNDERSTANDING_REPLIES.iter().chain(ARGUMENT_REPLIES) {
            assert!(has_negative_markers(line), "{}", line);
        }
        for _ in 0..10 {
            assert!(has_negative_markers(&reply(InteractionType::Argument, &mut rng)));
        }
    }

    #[test]
    fn openers_fit_their_band() {
        for (tier, lines) in [(Tier::Cold, COLD_OPENERS), (Tier::Neutral, NEUTRAL_OPENERS), (Tier::Warm, WARM_OPENERS)] {
            let (_, max) = tier.length_band();
            assert!(lines.iter().all(|line| line.chars().count() <= max));
        }
    }
}
