//! Static interaction effects: how much each kind of encounter moves a
//! relationship, plus situational modifiers.

pub const SAME_LOCATION: &str = "same_location";
pub const SAME_PROFESSION: &str = "same_profession";
pub const FIRST_INTERACTION: &str = "first_interaction";
pub const STRONG_BOND: &str = "strong_bond";
pub const PUBLIC_LOCATION: &str = "public_location";
pub const PRIVATE_LOCATION: &str = "private_location";
pub const BAD_FIRST_IMPRESSION: &str = "bad_first_impression";
pub const VALUE_CLASH: &str = "value_clash";
pub const WORK_PRESSURE: &str = "work_pressure";

/// Base relationship delta for one interaction type and its condition modifiers
#[derive(Debug, Clone, Copy)]
pub struct InteractionEffect {
    pub name: &'static str,
    pub base_delta: i32,
    pub description: &'static str,
    pub conditions: &'static [(&'static str, i32)],
}

impl InteractionEffect {
    pub fn condition(&self, name: &str) -> Option<i32> {
        self.conditions
            .iter()
            .find(|(condition, _)| *condition == name)
            .map(|(_, delta)| *delta)
    }
}

const EFFECTS: &[InteractionEffect] = &[
    InteractionEffect {
        name: "friendly_chat",
        base_delta: 3,
        description: "friendly chat",
        conditions: &[(SAME_LOCATION, 2), (SAME_PROFESSION, 2), (FIRST_INTERACTION, 5)],
    },
    InteractionEffect {
        name: "disagreement",
        base_delta: -6,
        description: "disagreement",
        conditions: &[("differing_views", -3), (VALUE_CLASH, -2), ("hard_line", -2)],
    },
    InteractionEffect {
        name: "argument",
        base_delta: -12,
        description: "argument",
        conditions: &[(VALUE_CLASH, -6), (WORK_PRESSURE, -5), (PUBLIC_LOCATION, -5)],
    },
    InteractionEffect {
        name: "misunderstanding",
        base_delta: -10,
        description: "misunderstanding",
        conditions: &[("poor_communication", -5), (BAD_FIRST_IMPRESSION, -6)],
    },
    InteractionEffect {
        name: "conflict",
        base_delta: -10,
        description: "serious conflict",
        conditions: &[("principle_dispute", -5), (PUBLIC_LOCATION, -4)],
    },
    InteractionEffect {
        name: "disappointment",
        base_delta: -8,
        description: "disappointment",
        conditions: &[("let_down", -5), ("overlooked", -5)],
    },
    InteractionEffect {
        name: "deep_conversation",
        base_delta: 3,
        description: "deep conversation",
        conditions: &[(STRONG_BOND, 1), (PRIVATE_LOCATION, 1)],
    },
    InteractionEffect {
        name: "collaboration",
        base_delta: 4,
        description: "collaboration",
        conditions: &[("successful_collaboration", 2), (SAME_PROFESSION, 1)],
    },
    InteractionEffect {
        name: "help_assistance",
        base_delta: 3,
        description: "help",
        conditions: &[("urgent_help", 2), ("professional_help", 1)],
    },
    InteractionEffect {
        name: "reconciliation",
        base_delta: 2,
        description: "reconciliation",
        conditions: &[("apology", 1), ("mediated", 1)],
    },
    InteractionEffect {
        name: "casual_meeting",
        base_delta: 1,
        description: "casual meeting",
        conditions: &[("pleasant_surprise", 1)],
    },
    InteractionEffect {
        name: "group_activity",
        base_delta: 1,
        description: "group activity",
        conditions: &[("led_activity", 1), ("active_participation", 0)],
    },
    InteractionEffect {
        name: "group_discussion",
        base_delta: 1,
        description: "group discussion",
        conditions: &[(SAME_PROFESSION, 1)],
    },
    InteractionEffect {
        name: "ignore",
        base_delta: -3,
        description: "cold shoulder",
        conditions: &[("long_neglect", -4), ("deliberate_snub", -3)],
    },
    InteractionEffect {
        name: "public_humiliation",
        base_delta: -12,
        description: "public humiliation",
        conditions: &[("malicious_slander", -6), ("onlookers", -4)],
    },
    InteractionEffect {
        name: "betrayal",
        base_delta: -15,
        description: "betrayal",
        conditions: &[("broken_promise", -5), ("secret_revealed", -8)],
    },
];

/// Lookup over the fixed effect table
pub struct InteractionEffectCatalog;

impl InteractionEffectCatalog {
    pub fn get(interaction_type: &str) -> Option<&'static InteractionEffect> {
        EFFECTS.iter().find(|effect| effect.name == interaction_type)
    }

    /// Sums the base delta and every modifier whose condition is active.
    ///
    /// Returns the total and a human-readable breakdown. Unknown types give a
    /// flat +1.
    pub fn compute_effect(interaction_type: &str, active_conditions: &[&str]) -> (i32, String) {
        let Some(effect) = Self::get(interaction_type) else {
            return (1, format!("unknown interaction type: {}", interaction_type));
        };

        let mut total = effect.base_delta;
        let mut details = vec![format!("{} {:+}", effect.description, effect.base_delta)];

        for (condition, delta) in effect.conditions {
            if active_conditions.contains(condition) {
                total += delta;
                details.push(format!("{} {:+}", condition, delta));
            }
        }

        (total, details.join(" | "))
    }
}

/// Largest share of a penalty that good professional affinity can take off
pub const PROFESSION_MAX_RELIEF: f64 = 0.1;
/// Largest share of a penalty that a fitting place can take off
pub const LOCATION_MAX_RELIEF: f64 = 0.2;

/// How well two professions get along; unlisted pairs are neutral (1.0)
const PROFESSION_COMPATIBILITY: &[(&str, &[(&str, f64)])] = &[
    (
        "programmer",
        &[
            ("programmer", 1.3),
            ("artist", 0.9),
            ("teacher", 1.1),
            ("doctor", 1.0),
            ("student", 1.2),
            ("businessman", 0.8),
            ("chef", 1.0),
            ("mechanic", 1.2),
            ("retired", 0.9),
        ],
    ),
    (
        "artist",
        &[
            ("programmer", 0.9),
            ("artist", 1.4),
            ("teacher", 1.2),
            ("doctor", 1.0),
            ("student", 1.3),
            ("businessman", 0.7),
            ("chef", 1.3),
            ("mechanic", 0.8),
            ("retired", 1.1),
        ],
    ),
];

/// Interaction kinds each place favours, and by how much
const LOCATION_EFFECTS: &[(&str, &[(&str, f64)])] = &[
    ("Cafe", &[("friendly_chat", 1.2), ("casual_meeting", 1.2)]),
    ("Library", &[("friendly_chat", 1.3), ("group_discussion", 1.3)]),
    ("Park", &[("casual_meeting", 1.1)]),
    ("Office", &[("group_discussion", 1.2)]),
    ("Home", &[("friendly_chat", 1.4)]),
    ("Restaurant", &[("friendly_chat", 1.2), ("group_discussion", 1.2)]),
    ("Repair Shop", &[("casual_meeting", 1.1)]),
];

fn lookup(table: &[(&str, &[(&str, f64)])], row: &str, column: &str) -> Option<f64> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(row))
        .and_then(|(_, entries)| entries.iter().find(|(name, _)| name.eq_ignore_ascii_case(column)))
        .map(|(_, multiplier)| *multiplier)
}

/// Affinity multiplier for two professions, looked up in either order
pub fn profession_compatibility(a: &str, b: &str) -> f64 {
    lookup(PROFESSION_COMPATIBILITY, a, b)
        .or_else(|| lookup(PROFESSION_COMPATIBILITY, b, a))
        .unwrap_or(1.0)
}

/// Multiplier a place applies to one interaction type
pub fn location_effect(location: &str, interaction_type: &str) -> f64 {
    lookup(LOCATION_EFFECTS, location, interaction_type).unwrap_or(1.0)
}

/// Scales a relationship delta by an affinity multiplier, rounding to the
/// nearest point.
///
/// On a negative delta the multiplier is mirrored around 1.0: good affinity
/// softens the penalty, by no more than `max_relief`, and poor affinity
/// sharpens it.
pub fn scale_delta(delta: i32, multiplier: f64, max_relief: f64) -> i32 {
    let factor = if delta < 0 {
        (2.0 - multiplier).max(1.0 - max_relief)
    } else {
        multiplier
    };
    (delta as f64 * factor).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_effects_outweigh_positive() {
        let positive: i32 = EFFECTS.iter().filter(|e| e.base_delta > 0).map(|e| e.base_delta).sum();
        let negative: i32 = EFFECTS.iter().filter(|e| e.base_delta < 0).map(|e| -e.base_delta).sum();
        assert!(negative > positive, "negative {} vs positive {}", negative, positive);
    }

    #[test]
    fn names_are_unique() {
        for (i, effect) in EFFECTS.iter().enumerate() {
            assert!(EFFECTS[i + 1..].iter().all(|other| other.name != effect.name), "{}", effect.name);
        }
    }

    #[test]
    fn friendly_chat_sums_matching_conditions() {
        let (delta, explanation) =
            InteractionEffectCatalog::compute_effect("friendly_chat", &[SAME_LOCATION, FIRST_INTERACTION]);
        assert_eq!(delta, 10);
        assert!(explanation.contains("first_interaction +5"));
    }

    #[test]
    fn conditions_outside_the_type_are_ignored() {
        let (delta, _) = InteractionEffectCatalog::compute_effect("argument", &[SAME_LOCATION, PUBLIC_LOCATION]);
        assert_eq!(delta, -17);
    }

    #[test]
    fn unknown_type_is_small_positive() {
        let (delta, explanation) = InteractionEffectCatalog::compute_effect("juggling", &[]);
        assert_eq!(delta, 1);
        assert!(explanation.contains("juggling"));
    }

    #[test]
    fn compatibility_is_symmetric_and_neutral_when_unlisted() {
        assert!((profession_compatibility("Artist", "programmer") - 0.9).abs() < 1e-9);
        assert!((profession_compatibility("chef", "artist") - 1.3).abs() < 1e-9);
        assert!((profession_compatibility("chef", "mechanic") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn places_only_touch_the_kinds_they_favour() {
        assert!((location_effect("home", "friendly_chat") - 1.4).abs() < 1e-9);
        assert!((location_effect("Home", "argument") - 1.0).abs() < 1e-9);
        assert!((location_effect("Mars", "friendly_chat") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn good_affinity_softens_penalties_within_limit() {
        // 1.4 would take 40% off; the cap allows 10%
        assert_eq!(scale_delta(-20, 1.4, PROFESSION_MAX_RELIEF), -18);
        assert_eq!(scale_delta(-20, 1.1, LOCATION_MAX_RELIEF), -18);
        assert_eq!(scale_delta(-20, 1.4, LOCATION_MAX_RELIEF), -16);
    }

    #[test]
    fn poor_affinity_sharpens_penalties_and_trims_gains() {
        assert_eq!(scale_delta(-10, 0.7, PROFESSION_MAX_RELIEF), -13);
        assert_eq!(scale_delta(10, 0.7, PROFESSION_MAX_RELIEF), 7);
        assert_eq!(scale_delta(10, 1.3, PROFESSION_MAX_RELIEF), 13);
        assert_eq!(scale_delta(0, 0.5, PROFESSION_MAX_RELIEF), 0);
    }

    #[test]
    fn every_interaction_type_has_an_entry() {
        use crate::types::InteractionType;
        for kind in [
            InteractionType::FriendlyChat,
            InteractionType::CasualMeeting,
            InteractionType::Misunderstanding,
            InteractionType::Argument,
            InteractionType::Conflict,
            InteractionType::GroupDiscussion,
        ] {
            assert!(InteractionEffectCatalog::get(kind.as_str()).is_some(), "{}", kind);
        }
    }
}
