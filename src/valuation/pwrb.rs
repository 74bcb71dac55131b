// RB composite score (PWRB).
//
// Four sub-scores from one week of usage: workload opportunity (WOR), creation
// efficiency (CEI), receiving work (RWO) and role stability. Blended with
// configurable weights, then adjusted for age and injury.

use serde::{Deserialize, Serialize};

use crate::valuation::injury::InjuryModel;
use crate::valuation::{round_to, TierScale};

/// Age at which the age penalty starts.
pub const AGE_PENALTY_START: f64 = 25.0;
/// Lowest age multiplier.
pub const AGE_MULTIPLIER_FLOOR: f64 = 0.7;
/// Yards created per carry that maps to 1.0 on the CEI scale.
pub const YARDS_CREATED_SCALE: f64 = 5.0;

/// Scoring weights. Every field can be overridden from `model.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwrbWeights {
    pub wor: f64,
    pub cei: f64,
    pub rwo: f64,
    pub stability: f64,
    pub rush_share_weight: f64,
    pub target_share_weight: f64,
    pub cei_yards_created: f64,
    pub cei_missed_tackles_per_touch: f64,
    pub cei_breakaway_rate: f64,
    pub cei_success_rate: f64,
    pub rwo_per_target: f64,
    pub age_penalty_per_year_over_25: f64,
}

impl Default for PwrbWeights {
    fn default() -> Self {
        Self {
            wor: 0.4,
            cei: 0.25,
            rwo: 0.2,
            stability: 0.3,
            rush_share_weight: 0.7,
            target_share_weight: 0.3,
            cei_yards_created: 0.4,
            cei_missed_tackles_per_touch: 0.2,
            cei_breakaway_rate: 0.2,
            cei_success_rate: 0.2,
            rwo_per_target: 0.1,
            age_penalty_per_year_over_25: 0.03,
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Lead,
    Committee,
    Backup,
}

impl Role {
    /// Classify by share of team offensive snaps.
    pub fn from_snap_share(snaps: f64, team_snaps: f64) -> Role {
        let share = ratio(snaps, team_snaps);
        if share >= 0.6 {
            Role::Lead
        } else if share >= 0.35 {
            Role::Committee
        } else {
            Role::Backup
        }
    }

    pub fn stability(&self) -> f64 {
        match self {
            Role::Lead => 2.0,
            Role::Committee => 1.0,
            Role::Backup => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Lead => "lead",
            Role::Committee => "committee",
            Role::Backup => "backup",
        }
    }
}

fn ratio(part: f64, total: f64) -> f64 {
    if total > 0.0 && part.is_finite() {
        (part / total).max(0.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Raw usage for one running back over the scored window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RbInputs {
    pub player_id: String,
    pub name: String,
    pub team: String,
    pub age: Option<f64>,
    pub injury_status: Option<String>,
    pub games: f64,
    pub rush_attempts: f64,
    pub team_rush_attempts: f64,
    pub targets: f64,
    pub team_targets: f64,
    pub receptions: f64,
    pub yards_created: f64,
    pub missed_tackles: f64,
    pub breakaway_runs: f64,
    pub successful_runs: f64,
    pub snaps: f64,
    pub team_snaps: f64,
}

impl RbInputs {
    pub fn touches(&self) -> f64 {
        self.rush_attempts + self.receptions
    }

    pub fn role(&self) -> Role {
        Role::from_snap_share(self.snaps, self.team_snaps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub wor: f64,
    pub cei: f64,
    pub rwo: f64,
    pub stability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PwrbOutput {
    pub player_id: String,
    pub name: String,
    pub team: String,
    pub role: Role,
    pub scores: SubScores,
    pub age_multiplier: f64,
    pub pwrb: f64,
    pub floor: f64,
    pub ceiling: f64,
    pub tier: String,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Multiplier applied for age: 1.0 through 25, then linear decay floored at 0.7.
pub fn age_multiplier(age: Option<f64>, per_year: f64) -> f64 {
    match age {
        Some(a) if a > AGE_PENALTY_START => {
            (1.0 - per_year * (a - AGE_PENALTY_START)).max(AGE_MULTIPLIER_FLOOR)
        }
        _ => 1.0,
    }
}

/// Compute the four sub-scores.
pub fn sub_scores(input: &RbInputs, w: &PwrbWeights) -> SubScores {
    let rush_share = ratio(input.rush_attempts, input.team_rush_attempts).min(1.0);
    let target_share = ratio(input.targets, input.team_targets).min(1.0);
    let wor = w.rush_share_weight * rush_share + w.target_share_weight * target_share;

    let yards_created = ratio(input.yards_created, input.rush_attempts) / YARDS_CREATED_SCALE;
    let missed_per_touch = ratio(input.missed_tackles, input.touches());
    let breakaway_rate = ratio(input.breakaway_runs, input.rush_attempts);
    let success_rate = ratio(input.successful_runs, input.rush_attempts);
    let cei = w.cei_yards_created * yards_created
        + w.cei_missed_tackles_per_touch * missed_per_touch
        + w.cei_breakaway_rate * breakaway_rate
        + w.cei_success_rate * success_rate;

    let games = if input.games > 0.0 { input.games } else { 1.0 };
    let rwo = w.rwo_per_target * input.targets.max(0.0) / games;

    SubScores {
        wor,
        cei,
        rwo,
        stability: input.role().stability(),
    }
}

/// Calibrated RB scorer.
#[derive(Debug, Clone)]
pub struct PwrbScorer {
    pub weights: PwrbWeights,
    pub injury: InjuryModel,
    pub tiers: TierScale,
    /// Half-width of the floor/ceiling band as a fraction of the composite.
    pub band: f64,
}

impl Default for PwrbScorer {
    fn default() -> Self {
        Self::with_weights(PwrbWeights::default())
    }
}

impl PwrbScorer {
    pub fn with_weights(weights: PwrbWeights) -> Self {
        Self {
            weights,
            injury: InjuryModel::default(),
            tiers: TierScale::new(
                [
                    (1.5, "Elite"),
                    (0.8, "RB1"),
                    (0.5, "RB2"),
                    (0.35, "RB3/Flex"),
                    (0.2, "DeepFlex"),
                ],
                "Bench",
            ),
            band: 0.25,
        }
    }

    pub fn score_one(&self, input: &RbInputs) -> PwrbOutput {
        let w = &self.weights;
        let scores = sub_scores(input, w);
        let blended = w.wor * scores.wor
            + w.cei * scores.cei
            + w.rwo * scores.rwo
            + w.stability * scores.stability;
        let age_mult = age_multiplier(input.age, w.age_penalty_per_year_over_25);
        let composite = self
            .injury
            .apply(blended * age_mult, input.injury_status.as_deref());

        PwrbOutput {
            player_id: input.player_id.clone(),
            name: input.name.clone(),
            team: input.team.clone(),
            role: input.role(),
            scores: SubScores {
                wor: round_to(scores.wor, 3),
                cei: round_to(scores.cei, 3),
                rwo: round_to(scores.rwo, 3),
                stability: scores.stability,
            },
            age_multiplier: round_to(age_mult, 3),
            pwrb: round_to(composite, 3),
            floor: round_to(composite * (1.0 - self.band), 3),
            ceiling: round_to(composite * (1.0 + self.band), 3),
            tier: self.tiers.label(composite).to_string(),
        }
    }

    /// Score all backs and rank descending; ties keep name order.
    pub fn score(&self, inputs: &[RbInputs]) -> Vec<PwrbOutput> {
        let mut out: Vec<PwrbOutput> = inputs.iter().map(|i| self.score_one(i)).collect();
        out.sort_by(|a, b| {
            b.pwrb
                .partial_cmp(&a.pwrb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn lead_back() -> RbInputs {
        RbInputs {
            player_id: "4034".into(),
            name: "Lead Back".into(),
            team: "ATL".into(),
            age: Some(23.0),
            injury_status: None,
            games: 1.0,
            rush_attempts: 20.0,
            team_rush_attempts: 28.0,
            targets: 4.0,
            team_targets: 32.0,
            receptions: 3.0,
            yards_created: 50.0,
            missed_tackles: 5.0,
            breakaway_runs: 1.0,
            successful_runs: 9.0,
            snaps: 48.0,
            team_snaps: 64.0,
        }
    }

    #[test]
    fn role_thresholds() {
        assert_eq!(Role::from_snap_share(60.0, 100.0), Role::Lead);
        assert_eq!(Role::from_snap_share(35.0, 100.0), Role::Committee);
        assert_eq!(Role::from_snap_share(34.9, 100.0), Role::Backup);
        assert_eq!(Role::from_snap_share(10.0, 0.0), Role::Backup);
        assert_eq!(Role::Lead.stability(), 2.0);
        assert_eq!(Role::Committee.stability(), 1.0);
        assert_eq!(Role::Backup.stability(), 0.0);
    }

    #[test]
    fn age_penalty_curve() {
        assert_eq!(age_multiplier(Some(22.0), 0.03), 1.0);
        assert_eq!(age_multiplier(Some(25.0), 0.03), 1.0);
        assert!(approx(age_multiplier(Some(28.0), 0.03), 0.91));
        assert_eq!(age_multiplier(Some(40.0), 0.03), 0.7);
        assert_eq!(age_multiplier(None, 0.03), 1.0);
    }

    #[test]
    fn sub_scores_for_lead_back() {
        let s = sub_scores(&lead_back(), &PwrbWeights::default());
        let rush_share = 20.0 / 28.0;
        let target_share = 4.0 / 32.0;
        assert!(approx(s.wor, 0.7 * rush_share + 0.3 * target_share));
        let cei = 0.4 * (50.0 / 20.0 / 5.0) + 0.2 * (5.0 / 23.0) + 0.2 * (1.0 / 20.0) + 0.2 * (9.0 / 20.0);
        assert!(approx(s.cei, cei));
        assert!(approx(s.rwo, 0.4));
        assert_eq!(s.stability, 2.0);
    }

    #[test]
    fn composite_band_and_tier() {
        let out = PwrbScorer::default().score_one(&lead_back());
        assert_eq!(out.role, Role::Lead);
        assert!(out.pwrb > 0.8 && out.pwrb < 1.5, "pwrb = {}", out.pwrb);
        assert_eq!(out.tier, "RB1");
        assert!((out.floor - out.pwrb * 0.75).abs() < 0.002);
        assert!((out.ceiling - out.pwrb * 1.25).abs() < 0.002);
    }

    #[test]
    fn zero_usage_does_not_divide_by_zero() {
        let out = PwrbScorer::default().score_one(&RbInputs {
            name: "Nobody".into(),
            ..Default::default()
        });
        assert_eq!(out.pwrb, 0.0);
        assert_eq!(out.tier, "Bench");
        assert_eq!(out.role, Role::Backup);
    }

    #[test]
    fn injury_and_age_reduce_score() {
        let scorer = PwrbScorer::default();
        let healthy = scorer.score_one(&lead_back()).pwrb;

        let mut old = lead_back();
        old.age = Some(30.0);
        assert!(scorer.score_one(&old).pwrb < healthy);

        let mut out = lead_back();
        out.injury_status = Some("IR".into());
        assert_eq!(scorer.score_one(&out).pwrb, 0.0);
    }

    #[test]
    fn custom_weights_are_honored() {
        let weights = PwrbWeights {
            wor: 0.0,
            cei: 0.0,
            rwo: 0.0,
            stability: 1.0,
            ..Default::default()
        };
        let out = PwrbScorer::with_weights(weights).score_one(&lead_back());
        assert_eq!(out.pwrb, 2.0);
        assert_eq!(out.tier, "Elite");
    }

    #[test]
    fn ranking_is_descending() {
        let mut backup = lead_back();
        backup.name = "Backup".into();
        backup.snaps = 10.0;
        backup.rush_attempts = 4.0;
        let ranked = PwrbScorer::default().score(&[backup, lead_back()]);
        assert_eq!(ranked[0].name, "Lead Back");
        assert!(ranked[0].pwrb >= ranked[1].pwrb);
    }
}
