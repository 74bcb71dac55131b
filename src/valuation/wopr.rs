// WR/TE composite score (PWOPR).
//
// Weighted opportunity rating from one week's box score, mapped onto a
// points-per-game scale and blended with whatever external signals exist for
// the player.

use std::collections::HashMap;

use serde::Serialize;

use crate::valuation::injury::InjuryModel;
use crate::valuation::linear::{PwoprLinearModel, Signal, UpcomingRow};
use crate::valuation::position::Position;
use crate::valuation::stats::EmpiricalCdf;
use crate::valuation::{round_to, TierScale};

/// Target share weight in the WOPR formula.
pub const TARGET_SHARE_WEIGHT: f64 = 1.5;
/// Air-yard share weight in the WOPR formula.
pub const AIR_YARD_SHARE_WEIGHT: f64 = 0.7;

/// Positions whose targets count toward team totals.
const TEAM_TOTAL_POSITIONS: [Position; 3] = [Position::WR, Position::TE, Position::RB];

/// Positions that receive a PWOPR row.
const SCORED_POSITIONS: [Position; 2] = [Position::WR, Position::TE];

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// One player's receiving usage for a single week.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivingLine {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub team: Option<String>,
    pub active: bool,
    pub targets: f64,
    pub air_yards: f64,
}

/// Usage shares and WOPR for one pass catcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WoprRow {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub team: String,
    pub targets: f64,
    pub air_yards: f64,
    pub team_targets: f64,
    pub team_air_yards: f64,
    pub target_share: f64,
    pub air_yard_share: f64,
    pub wopr: f64,
}

/// `1.5 * target_share + 0.7 * air_yard_share`.
pub fn wopr(target_share: f64, air_yard_share: f64) -> f64 {
    TARGET_SHARE_WEIGHT * target_share + AIR_YARD_SHARE_WEIGHT * air_yard_share
}

fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        (part / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Compute shares and WOPR for every active WR/TE with a team.
///
/// Team totals only count active WR, TE and RB lines on the same team.
/// Negative air yards are kept in the totals as reported.
pub fn compute_wopr_rows(lines: &[ReceivingLine]) -> Vec<WoprRow> {
    let mut team_totals: HashMap<&str, (f64, f64)> = HashMap::new();
    for line in lines {
        let Some(team) = line.team.as_deref() else {
            continue;
        };
        if !line.active || !TEAM_TOTAL_POSITIONS.contains(&line.position) {
            continue;
        }
        let entry = team_totals.entry(team).or_insert((0.0, 0.0));
        entry.0 += line.targets;
        entry.1 += line.air_yards;
    }

    lines
        .iter()
        .filter(|l| l.active && SCORED_POSITIONS.contains(&l.position))
        .filter_map(|l| {
            let team = l.team.as_deref()?;
            let (team_targets, team_air_yards) = team_totals.get(team).copied().unwrap_or((0.0, 0.0));
            let target_share = share(l.targets, team_targets);
            let air_yard_share = share(l.air_yards, team_air_yards);
            Some(WoprRow {
                player_id: l.player_id.clone(),
                name: l.name.clone(),
                position: l.position,
                team: team.to_string(),
                targets: l.targets,
                air_yards: l.air_yards,
                team_targets,
                team_air_yards,
                target_share,
                air_yard_share,
                wopr: wopr(target_share, air_yard_share),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// WOPR -> PPG curve
// ---------------------------------------------------------------------------

/// Breakpoints of the WOPR-to-PPG curve: 2 PPG per 0.1 WOPR up to 1.0.
const PPG_CURVE: [(f64, f64); 11] = [
    (0.0, 0.0),
    (0.1, 2.0),
    (0.2, 4.0),
    (0.3, 6.0),
    (0.4, 8.0),
    (0.5, 10.0),
    (0.6, 12.0),
    (0.7, 14.0),
    (0.8, 16.0),
    (0.9, 18.0),
    (1.0, 20.0),
];

/// PPG per unit of WOPR beyond the last breakpoint (half the curve's rate).
const TAIL_RATE: f64 = 10.0;
const TAIL_CAP: f64 = 30.0;

/// Map a WOPR value onto its points-per-game equivalent.
pub fn wopr_to_ppg(w: f64) -> f64 {
    if !(w > 0.0) {
        return 0.0;
    }
    let (last_x, last_y) = PPG_CURVE[PPG_CURVE.len() - 1];
    if w >= last_x {
        return (last_y + (w - last_x) * TAIL_RATE).min(TAIL_CAP);
    }
    for pair in PPG_CURVE.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if w <= x1 {
            return y0 + (w - x0) * (y1 - y0) / (x1 - x0);
        }
    }
    last_y
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// Optional per-player signals blended with the WOPR estimate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalSignals {
    /// Provider fantasy projection for the week.
    pub external_projection: Option<f64>,
    /// Receiver tracking metrics "overall" score on a 0-100 scale.
    pub rtm_overall: Option<f64>,
    pub prior_ppg: Option<f64>,
    pub injury_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwoprWeights {
    pub external: f64,
    pub wopr: f64,
    pub rtm: f64,
    pub prior: f64,
}

impl Default for PwoprWeights {
    fn default() -> Self {
        Self {
            external: 0.4,
            wopr: 0.3,
            rtm: 0.2,
            prior: 0.1,
        }
    }
}

fn present(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

/// RTM overall score rescaled onto a PPG range.
pub fn rtm_to_ppg(overall: f64) -> f64 {
    overall / 100.0 * 20.0
}

/// Weighted blend of the present components, renormalized over their weights.
///
/// A component is present when it is a positive number. With no external
/// signal at all the WOPR estimate is returned unchanged.
pub fn blend(wopr_ppg: f64, signals: &ExternalSignals, weights: &PwoprWeights) -> f64 {
    let external = [
        (present(signals.external_projection), weights.external),
        (present(signals.rtm_overall).map(rtm_to_ppg), weights.rtm),
        (present(signals.prior_ppg), weights.prior),
    ];
    if external.iter().all(|(v, _)| v.is_none()) {
        return wopr_ppg;
    }

    let mut sum = 0.0;
    let mut total_weight = 0.0;
    let components = external
        .into_iter()
        .chain(std::iter::once((present(Some(wopr_ppg)), weights.wopr)));
    for (value, weight) in components {
        if let Some(v) = value {
            sum += v * weight;
            total_weight += weight;
        }
    }
    if total_weight > 0.0 {
        sum / total_weight
    } else {
        wopr_ppg
    }
}

/// A scored WR/TE ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PwoprRow {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub team: String,
    pub wopr: f64,
    pub wopr_ppg: f64,
    pub pwopr: f64,
    pub floor: f64,
    pub ceiling: f64,
    pub tier: String,
    /// Rank of `pwopr` among this week's rows, in `[0, 1]`.
    pub percentile: f64,
    pub external_projection: Option<f64>,
    pub predicted: Option<f64>,
    pub signal: Option<Signal>,
}

/// Calibrated WR/TE scorer.
#[derive(Debug, Clone)]
pub struct PwoprScorer {
    pub weights: PwoprWeights,
    pub injury: InjuryModel,
    pub tiers: TierScale,
    /// Half-width of the floor/ceiling band as a fraction of the composite.
    pub band: f64,
}

impl Default for PwoprScorer {
    fn default() -> Self {
        Self {
            weights: PwoprWeights::default(),
            injury: InjuryModel::default(),
            tiers: TierScale::new(
                [
                    (20.0, "Elite"),
                    (15.0, "WR1"),
                    (12.0, "WR2/TE1"),
                    (9.0, "WR3/Flex"),
                    (6.0, "DeepFlex"),
                ],
                "Bench",
            ),
            band: 0.2,
        }
    }
}

impl PwoprScorer {
    /// Composite for a single player before rounding.
    pub fn composite(&self, wopr_value: f64, signals: &ExternalSignals) -> f64 {
        let blended = blend(wopr_to_ppg(wopr_value), signals, &self.weights);
        self.injury.apply(blended, signals.injury_status.as_deref())
    }

    /// Score every row, drop non-positive composites and rank descending.
    /// `signals` is keyed by player id; missing entries mean no signals.
    pub fn score(&self, rows: &[WoprRow], signals: &HashMap<String, ExternalSignals>) -> Vec<PwoprRow> {
        let none = ExternalSignals::default();
        let mut scored: Vec<PwoprRow> = rows
            .iter()
            .filter_map(|row| {
                let sig = signals.get(&row.player_id).unwrap_or(&none);
                let composite = self.composite(row.wopr, sig);
                if !(composite > 0.0) {
                    return None;
                }
                Some(PwoprRow {
                    player_id: row.player_id.clone(),
                    name: row.name.clone(),
                    position: row.position,
                    team: row.team.clone(),
                    wopr: round_to(row.wopr, 2),
                    wopr_ppg: round_to(wopr_to_ppg(row.wopr), 2),
                    pwopr: round_to(composite, 2),
                    floor: round_to(composite * (1.0 - self.band), 2),
                    ceiling: round_to(composite * (1.0 + self.band), 2),
                    tier: self.tiers.label(composite).to_string(),
                    percentile: 0.0,
                    external_projection: present(sig.external_projection),
                    predicted: None,
                    signal: None,
                })
            })
            .collect();

        let cdf = EmpiricalCdf::new(&scored.iter().map(|r| r.pwopr).collect::<Vec<_>>());
        for row in &mut scored {
            row.percentile = round_to(cdf.rank(row.pwopr), 2);
        }

        scored.sort_by(|a, b| {
            b.pwopr
                .partial_cmp(&a.pwopr)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        scored
    }
}

/// Attach linear-model predictions and signals to scored rows.
pub fn attach_signals(rows: &mut [PwoprRow], model: &PwoprLinearModel) {
    for row in rows {
        let upcoming = UpcomingRow {
            position: Some(row.position),
            pwopr: row.pwopr,
            external_projection: row.external_projection.unwrap_or(0.0),
        };
        if let Some(score) = model.score(&upcoming) {
            row.predicted = Some(round_to(score.predicted, 2));
            row.signal = Some(score.signal);
        }
    }
}
