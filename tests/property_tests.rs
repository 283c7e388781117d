use proptest::prelude::*;

use social_town::relationship::{Tier, MAX_STRENGTH, MIN_STRENGTH};
use social_town::sentiment::sentiment_bias;
use social_town::{classify, RelationshipLevel, RelationshipStore, RelationshipTable};

fn name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Alex".to_string()),
        Just("Emma".to_string()),
        Just("Sarah".to_string()),
        Just("Tom".to_string()),
    ]
}

proptest! {
    #[test]
    fn deltas_stay_clamped_and_symmetric(
        a in name(),
        b in name(),
        start in -50i32..150,
        deltas in prop::collection::vec(-60i32..60, 1..20),
    ) {
        prop_assume!(a != b);
        let table = RelationshipTable::default();
        table.set(&a, &b, start);

        for delta in deltas {
            let (old, new) = table.apply_delta(&a, &b, delta);
            prop_assert!((MIN_STRENGTH..=MAX_STRENGTH).contains(&new));
            prop_assert_eq!(new, (old + delta).clamp(MIN_STRENGTH, MAX_STRENGTH));
            prop_assert_eq!(table.get(&a, &b), table.get(&b, &a));
        }
    }

    #[test]
    fn snapshot_is_mirrored(a in name(), b in name(), value in 0i32..=100) {
        prop_assume!(a != b);
        let table = RelationshipTable::default();
        table.set(&a, &b, value);

        let snapshot = table.snapshot();
        prop_assert_eq!(snapshot[&a][&b], value);
        prop_assert_eq!(snapshot[&b][&a], value);
    }

    #[test]
    fn levels_partition_the_range(strength in 0i32..=100) {
        let level = classify(strength);
        prop_assert_ne!(level, RelationshipLevel::Hostile);
        let expected = match strength {
            0..=20 => RelationshipLevel::Stranger,
            21..=40 => RelationshipLevel::Acquaintance,
            41..=60 => RelationshipLevel::Familiar,
            61..=80 => RelationshipLevel::CloseFriend,
            _ => RelationshipLevel::Intimate,
        };
        prop_assert_eq!(level, expected);
    }

    #[test]
    fn levels_are_monotonic(a in -20i32..120, b in -20i32..120) {
        prop_assume!(a <= b);
        prop_assert!(classify(a) <= classify(b));
    }

    #[test]
    fn warmer_tiers_allow_longer_lines(a in 0i32..=100, b in 0i32..=100) {
        prop_assume!(a <= b);
        let (_, max_a) = Tier::from_strength(a).length_band();
        let (_, max_b) = Tier::from_strength(b).length_band();
        prop_assert!(max_a <= max_b);
    }

    #[test]
    fn sentiment_bias_is_bounded(text in "[a-z ,.!']{0,200}") {
        let bias = sentiment_bias(&text);
        prop_assert!((-2..=2).contains(&bias));
    }
}
