// Injury designation adjustments.
//
// Two independent multipliers: the chance a player suits up at all, and how
// diminished they are if they do. IR/Out zero the projection through the
// play probability alone.

use std::collections::HashMap;

/// Lookup tables mapping an injury designation to its two factors.
///
/// Designations are matched case-insensitively. Anything missing from a table
/// is treated as healthy (factor 1.0).
#[derive(Debug, Clone)]
pub struct InjuryModel {
    play_probability: HashMap<String, f64>,
    performance_impact: HashMap<String, f64>,
}

impl Default for InjuryModel {
    fn default() -> Self {
        Self::new(
            [
                ("IR", 0.0),
                ("Out", 0.0),
                ("Doubtful", 0.15),
                ("Questionable", 0.65),
                ("Probable", 0.9),
            ],
            [("Doubtful", 0.6), ("Questionable", 0.85), ("Probable", 0.95)],
        )
    }
}

impl InjuryModel {
    /// Build a model from explicit calibration tables.
    pub fn new<P, I>(play_probability: P, performance_impact: I) -> Self
    where
        P: IntoIterator<Item = (&'static str, f64)>,
        I: IntoIterator<Item = (&'static str, f64)>,
    {
        let lower = |(k, v): (&str, f64)| (k.to_ascii_lowercase(), v);
        Self {
            play_probability: play_probability.into_iter().map(lower).collect(),
            performance_impact: performance_impact.into_iter().map(lower).collect(),
        }
    }

    fn lookup(table: &HashMap<String, f64>, status: Option<&str>) -> f64 {
        status
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .and_then(|s| table.get(&s).copied())
            .unwrap_or(1.0)
    }

    /// Probability the player takes the field this week.
    pub fn play_probability(&self, status: Option<&str>) -> f64 {
        Self::lookup(&self.play_probability, status)
    }

    /// Output multiplier given that the player does play.
    pub fn performance_impact(&self, status: Option<&str>) -> f64 {
        Self::lookup(&self.performance_impact, status)
    }

    /// Scale a projection by both factors.
    pub fn apply(&self, projection: f64, status: Option<&str>) -> f64 {
        projection * self.play_probability(status) * self.performance_impact(status)
    }
}

/// Whether a designation string carries an actual injury tag.
pub fn has_designation(status: Option<&str>) -> bool {
    status.is_some_and(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_probability_table() {
        let m = InjuryModel::default();
        assert_eq!(m.play_probability(Some("IR")), 0.0);
        assert_eq!(m.play_probability(Some("Out")), 0.0);
        assert_eq!(m.play_probability(Some("Doubtful")), 0.15);
        assert_eq!(m.play_probability(Some("Questionable")), 0.65);
        assert_eq!(m.play_probability(Some("Probable")), 0.9);
        assert_eq!(m.play_probability(Some("Suspended")), 1.0);
        assert_eq!(m.play_probability(None), 1.0);
    }

    #[test]
    fn performance_impact_table() {
        let m = InjuryModel::default();
        assert_eq!(m.performance_impact(Some("Doubtful")), 0.6);
        assert_eq!(m.performance_impact(Some("Questionable")), 0.85);
        assert_eq!(m.performance_impact(Some("Probable")), 0.95);
        assert_eq!(m.performance_impact(Some("IR")), 1.0);
        assert_eq!(m.performance_impact(Some("Out")), 1.0);
        assert_eq!(m.performance_impact(None), 1.0);
    }

    #[test]
    fn out_always_zeroes() {
        let m = InjuryModel::default();
        for p in [0.0, 1.0, 17.3, 250.0] {
            assert_eq!(m.apply(p, Some("Out")), 0.0);
            assert_eq!(m.apply(p, Some("IR")), 0.0);
        }
    }

    #[test]
    fn questionable_composes_both_factors() {
        let m = InjuryModel::default();
        let adjusted = m.apply(20.0, Some("Questionable"));
        assert!((adjusted - 20.0 * 0.65 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let m = InjuryModel::default();
        assert_eq!(m.play_probability(Some("questionable")), 0.65);
        assert_eq!(m.play_probability(Some("OUT")), 0.0);
        assert_eq!(m.play_probability(Some("  ")), 1.0);
    }

    #[test]
    fn custom_tables_replace_defaults() {
        let m = InjuryModel::new([("Questionable", 0.5)], std::iter::empty());
        assert_eq!(m.play_probability(Some("Questionable")), 0.5);
        assert_eq!(m.play_probability(Some("Out")), 1.0);
        assert_eq!(m.performance_impact(Some("Questionable")), 1.0);
    }

    #[test]
    fn designation_detection() {
        assert!(has_designation(Some("Questionable")));
        assert!(!has_designation(Some("")));
        assert!(!has_designation(None));
    }
}
