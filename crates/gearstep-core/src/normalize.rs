//! # Unit Normalization
//!
//! Collapses lexical variants of a number followed by a unit into one
//! canonical token before a keyword search, so "500 Amps", "500 Ampère(s)"
//! and "500A" all index and query as "500 A".
//!
//! Rules are case-insensitive and run in a fixed order. Percentages are
//! never touched: "60%" has no unit suffix any rule recognizes.

use crate::GearstepError;
use regex::Regex;

/// Optional decimal part accepts either separator.
const NUMBER: &str = r"(\d+(?:[.,]\d+)?)";

struct UnitRule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Compiled, ordered set of unit rules.
pub struct UnitNormalizer {
    rules: Vec<UnitRule>,
    whitespace: Regex,
}

impl std::fmt::Debug for UnitNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitNormalizer")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl UnitNormalizer {
    /// Compile the rule set.
    pub fn new() -> Result<Self, GearstepError> {
        let specs: [(&'static str, String, &'static str); 9] = [
            (
                "amperes",
                format!(r"(?i)\b{NUMBER}\s*(?:amp(?:[eè]re)?s?\(s\)|(?:amp(?:[eè]re)?s?|a)\b)"),
                "$1 A",
            ),
            (
                "millimetres",
                format!(r"(?i)\b{NUMBER}\s*(?:millimet(?:er|re)s?|mm)\b"),
                "$1 mm",
            ),
            (
                "flow",
                format!(
                    r"(?i)\b{NUMBER}\s*(?:lpm|l\s*/\s*min(?:ute)?s?|lit(?:er|re)s?\s*(?:/|per)\s*min(?:ute)?s?)\b"
                ),
                "$1 l/minute",
            ),
            ("phase", r"(?i)\b(\d)\s*-?\s*(?:ph|phases?)\b".to_string(), "$1 phase"),
            ("volts", format!(r"(?i)\b{NUMBER}\s*(?:volts?|v)\b"), "$1 V"),
            ("kilowatts", format!(r"(?i)\b{NUMBER}\s*(?:kilowatts?|kw)\b"), "$1 kW"),
            // After millimetres, so "mm" is already canonical.
            ("metres", format!(r"(?i)\b{NUMBER}\s*(?:met(?:er|re)s?|m)\b"), "$1 m"),
            ("kilograms", format!(r"(?i)\b{NUMBER}\s*(?:kilo(?:gram)?s?|kgs?)\b"), "$1 kg"),
            ("hertz", format!(r"(?i)\b{NUMBER}\s*(?:hertz|hz)\b"), "$1 Hz"),
        ];

        let mut rules = Vec::with_capacity(specs.len());
        for (name, pattern, replacement) in specs {
            rules.push(UnitRule {
                name,
                pattern: Regex::new(&pattern)?,
                replacement,
            });
        }

        Ok(Self {
            rules,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Rewrite every number+unit occurrence into canonical form and collapse
    /// runs of whitespace.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let mut current = text.to_string();
        for rule in &self.rules {
            let replaced = rule.pattern.replace_all(&current, rule.replacement);
            if let std::borrow::Cow::Owned(next) = replaced {
                current = next;
            }
        }
        self.whitespace.replace_all(current.trim(), " ").into_owned()
    }

    /// Rule names in application order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn normalizer() -> UnitNormalizer {
        UnitNormalizer::new().expect("normalizer rules compile")
    }

    #[test]
    fn rules_compile() {
        assert!(UnitNormalizer::new().is_ok());
    }

    #[test]
    fn ampere_variants_collapse() {
        let n = normalizer();
        for variant in ["500 Amps", "500 Ampere", "500 Ampères", "500 ampère(s)", "500A", "500 AMPS"] {
            assert_eq!(n.normalize(variant), "500 A", "variant {variant}");
        }
    }

    #[test]
    fn percentages_survive() {
        let n = normalizer();
        assert_eq!(n.normalize("500A at 60%"), "500 A at 60%");
    }

    #[test]
    fn length_and_flow_variants() {
        let n = normalizer();
        assert_eq!(n.normalize("30 millimeters"), "30 mm");
        assert_eq!(n.normalize("30 Millimetres"), "30 mm");
        assert_eq!(n.normalize("30mm"), "30 mm");
        assert_eq!(n.normalize("7 lpm"), "7 l/minute");
        assert_eq!(n.normalize("7 liters/minute"), "7 l/minute");
        assert_eq!(n.normalize("7 litres per minute"), "7 l/minute");
        assert_eq!(n.normalize("7 l/min"), "7 l/minute");
    }

    #[test]
    fn phase_variants() {
        let n = normalizer();
        assert_eq!(n.normalize("3ph"), "3 phase");
        assert_eq!(n.normalize("1-phase"), "1 phase");
        assert_eq!(n.normalize("3 Phases supply"), "3 phase supply");
    }

    #[test]
    fn electrical_and_mass_units() {
        let n = normalizer();
        assert_eq!(n.normalize("400 volts 3ph"), "400 V 3 phase");
        assert_eq!(n.normalize("12 kilowatts"), "12 kW");
        assert_eq!(n.normalize("5 meters cable"), "5 m cable");
        assert_eq!(n.normalize("25 kilograms"), "25 kg");
        assert_eq!(n.normalize("50 hertz"), "50 Hz");
    }

    #[test]
    fn canonical_text_is_stable() {
        let n = normalizer();
        let once = n.normalize("MIG  500 amps,  8 m hose, 4 lpm  ");
        assert_eq!(once, "MIG 500 A, 8 m hose, 4 l/minute");
        assert_eq!(n.normalize(&once), once);
    }

    #[test]
    fn words_containing_unit_letters_are_untouched() {
        let n = normalizer();
        assert_eq!(n.normalize("2 arms and 3 minutes"), "2 arms and 3 minutes");
    }
}
