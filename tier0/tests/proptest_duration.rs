//! Property-based tests: duration parsing.

use proptest::prelude::*;
use tier0::{parse_duration, DurationMs, DurationSpec};

proptest! {
    /// A numeric spec is already milliseconds and must come back
    /// unchanged.
    #[test]
    fn numeric_spec_is_identity(ms in 0u64..=10_000_000_000) {
        let spec = DurationSpec::Millis(ms);
        prop_assert_eq!(spec.resolve().unwrap().as_millis(), ms);
    }

    /// Every unit form parses to the magnitude times its multiplier,
    /// with and without a separating space.
    #[test]
    fn unit_forms_scale(value in 0u64..100_000, spaced in proptest::bool::ANY) {
        let units = [
            ("ms", 1u64),
            ("s", 1_000),
            ("seconds", 1_000),
            ("m", 60_000),
            ("minutes", 60_000),
            ("h", 3_600_000),
            ("hours", 3_600_000),
            ("d", 86_400_000),
            ("days", 86_400_000),
        ];
        for (unit, mult) in units {
            let text = if spaced {
                format!("{value} {unit}")
            } else {
                format!("{value}{unit}")
            };
            let parsed = parse_duration(&text).unwrap();
            prop_assert_eq!(parsed.as_millis(), value * mult);
        }
    }

    /// Parsed durations are never negative by construction, and the
    /// wire form round-trips as a plain integer.
    #[test]
    fn wire_round_trip(ms in 0u64..=u64::MAX / 2) {
        let d = DurationMs::from_millis(ms);
        let json = serde_json::to_string(&d).unwrap();
        prop_assert_eq!(json, ms.to_string());
        let back: DurationMs = serde_json::from_str(&ms.to_string()).unwrap();
        prop_assert_eq!(back, d);
    }

    /// Junk never parses.
    #[test]
    fn junk_is_rejected(s in "[a-zA-Z!@#]{1,12}") {
        prop_assert!(parse_duration(&s).is_err());
    }

    /// A leading minus sign is rejected: durations are strictly
    /// non-negative integers.
    #[test]
    fn negative_is_rejected(value in 1u64..100_000) {
        prop_assert!(
            parse_duration(&format!("-{}s", value)).is_err(),
            "negative duration with unit should be rejected"
        );
        prop_assert!(
            parse_duration(&format!("-{}", value)).is_err(),
            "negative bare duration should be rejected"
        );
    }
}
