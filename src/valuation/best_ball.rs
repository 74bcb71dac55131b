// Best Ball season totals, future-week projections and rookie draft order.
//
// Completed weeks are scored with actual points through the lineup
// optimizer. Future weeks use a per-player projection that blends history,
// the external weekly projection and a trend term.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::valuation::injury::{has_designation, InjuryModel};
use crate::valuation::position::{optimize_lineup, Candidate, Position, PositionTable};
use crate::valuation::stats::{
    ewma, regression_to_mean, sample_size_confidence, stddev, trend, DEFAULT_EWMA_ALPHA,
    DEFAULT_REGRESSION_FACTOR,
};
use crate::valuation::round_to;

/// Rosters that make the fantasy playoffs.
pub const DEFAULT_PLAYOFF_TEAMS: usize = 6;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// NFL metadata for a rostered player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMeta {
    pub name: String,
    pub position: Option<Position>,
    pub team: Option<String>,
    pub injury_status: Option<String>,
    pub active: bool,
}

/// A fantasy roster and its current players.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterInput {
    pub roster_id: u32,
    pub owner_id: Option<String>,
    pub team_name: String,
    pub players: Vec<String>,
}

/// Actual points for one completed week: roster id -> player id -> points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedWeek {
    pub week: u32,
    pub points: HashMap<u32, HashMap<String, f64>>,
}

/// External projections for one future week.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FutureWeek {
    pub week: u32,
    /// Player id -> projected points.
    pub projections: HashMap<String, f64>,
    /// NFL teams with at least one projection entry. Teams missing here are
    /// on bye.
    pub teams_playing: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BestBallInputs {
    pub rosters: Vec<RosterInput>,
    pub players: HashMap<String, PlayerMeta>,
    pub slots: HashMap<String, usize>,
    pub completed: Vec<CompletedWeek>,
    pub future: Vec<FutureWeek>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestBallRow {
    pub roster_id: u32,
    pub team_name: String,
    pub owner_id: Option<String>,
    pub actual_total: f64,
    pub projected_future: f64,
    pub projected_total: f64,
    /// Population stddev of weekly actual totals.
    pub weekly_volatility: f64,
    pub weeks_played: usize,
    pub playoff: bool,
    /// 1-based position in the upcoming rookie draft.
    pub draft_slot: usize,
}

// ---------------------------------------------------------------------------
// Projector
// ---------------------------------------------------------------------------

/// Weight on the trend term when history and an external projection exist.
const TREND_WEIGHT: f64 = 0.1;
/// Maximum weight on history, scaled by sample-size confidence.
const HISTORY_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct BestBallProjector {
    pub positions: PositionTable,
    pub injury: InjuryModel,
    pub ewma_alpha: f64,
    pub regression_factor: f64,
    pub playoff_teams: usize,
}

impl Default for BestBallProjector {
    fn default() -> Self {
        Self {
            positions: PositionTable::default(),
            injury: InjuryModel::default(),
            ewma_alpha: DEFAULT_EWMA_ALPHA,
            regression_factor: DEFAULT_REGRESSION_FACTOR,
            playoff_teams: DEFAULT_PLAYOFF_TEAMS,
        }
    }
}

impl BestBallProjector {
    /// Projected points for one player in a week `weeks_ahead` past the last
    /// completed week. `None` when there is nothing to project from.
    pub fn project_player(
        &self,
        history: &[f64],
        external: Option<f64>,
        weeks_ahead: f64,
        position: Position,
        injury_status: Option<&str>,
    ) -> Option<f64> {
        let external = external.filter(|v| v.is_finite() && *v > 0.0);
        let raw = match (history.is_empty(), external) {
            (false, Some(ext)) => {
                let smoothed = ewma(history, self.ewma_alpha);
                let slope = trend(history);
                let w_hist = HISTORY_WEIGHT * sample_size_confidence(history.len());
                let w_ext = 1.0 - w_hist - TREND_WEIGHT;
                w_hist * smoothed + w_ext * ext + TREND_WEIGHT * (smoothed + slope * weeks_ahead)
            }
            (true, Some(ext)) => ext,
            (false, None) => {
                let smoothed = ewma(history, self.ewma_alpha);
                smoothed + TREND_WEIGHT * trend(history) * weeks_ahead
            }
            (true, None) => return None,
        };

        let regressed = regression_to_mean(
            raw,
            self.positions.baseline_ppg(position),
            self.regression_factor,
        );

        // A positive external projection for an undesignated player already
        // reflects availability.
        if external.is_some() && !has_designation(injury_status) {
            Some(regressed)
        } else {
            Some(self.injury.apply(regressed, injury_status))
        }
    }

    /// Score every roster and order them for the rookie draft.
    pub fn project(&self, inputs: &BestBallInputs) -> Vec<BestBallRow> {
        let mut weekly_totals: HashMap<u32, Vec<f64>> = HashMap::new();
        let mut history: HashMap<&str, Vec<f64>> = HashMap::new();

        let mut completed: Vec<&CompletedWeek> = inputs.completed.iter().collect();
        completed.sort_by_key(|w| w.week);
        let last_completed = completed.last().map(|w| w.week).unwrap_or(0);

        for week in &completed {
            for roster in &inputs.rosters {
                let Some(points) = week.points.get(&roster.roster_id) else {
                    continue;
                };
                let mut ids: Vec<&String> = points.keys().collect();
                ids.sort();
                let mut candidates = Vec::with_capacity(ids.len());
                for id in ids {
                    let pts = points[id];
                    history.entry(id.as_str()).or_default().push(pts);
                    if let Some(pos) = inputs.players.get(id).and_then(|m| m.position) {
                        candidates.push(Candidate { position: pos, score: pts });
                    }
                }
                let total = optimize_lineup(&candidates, &inputs.slots).total;
                weekly_totals.entry(roster.roster_id).or_default().push(total);
            }
        }

        let mut rows: Vec<BestBallRow> = inputs
            .rosters
            .iter()
            .map(|roster| {
                let weeks = weekly_totals.get(&roster.roster_id).cloned().unwrap_or_default();
                let actual: f64 = weeks.iter().sum();
                let future: f64 = inputs
                    .future
                    .iter()
                    .filter(|w| w.week > last_completed)
                    .map(|w| self.project_roster_week(roster, inputs, w, &history, last_completed))
                    .sum();
                BestBallRow {
                    roster_id: roster.roster_id,
                    team_name: roster.team_name.clone(),
                    owner_id: roster.owner_id.clone(),
                    actual_total: round_to(actual, 2),
                    projected_future: round_to(future, 2),
                    projected_total: round_to(actual + future, 2),
                    weekly_volatility: round_to(stddev(&weeks), 2),
                    weeks_played: weeks.len(),
                    playoff: false,
                    draft_slot: 0,
                }
            })
            .collect();

        assign_draft_order(&mut rows, self.playoff_teams);
        rows
    }

    fn project_roster_week(
        &self,
        roster: &RosterInput,
        inputs: &BestBallInputs,
        week: &FutureWeek,
        history: &HashMap<&str, Vec<f64>>,
        last_completed: u32,
    ) -> f64 {
        let weeks_ahead = f64::from(week.week.saturating_sub(last_completed));
        let candidates: Vec<Candidate> = roster
            .players
            .iter()
            .filter_map(|id| {
                let meta = inputs.players.get(id)?;
                let position = meta.position?;
                let team = meta.team.as_deref()?;
                if !meta.active || !week.teams_playing.contains(team) {
                    return None;
                }
                let past = history.get(id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                let score = self.project_player(
                    past,
                    week.projections.get(id).copied(),
                    weeks_ahead,
                    position,
                    meta.injury_status.as_deref(),
                )?;
                Some(Candidate { position, score })
            })
            .collect();
        optimize_lineup(&candidates, &inputs.slots).total
    }
}

/// Mark the top `playoff_teams` by actual points as playoff teams, then
/// order non-playoff teams by projected total ascending followed by the
/// playoff teams the same way. Ties fall back to roster id.
pub fn assign_draft_order(rows: &mut [BestBallRow], playoff_teams: usize) {
    let mut by_actual: Vec<usize> = (0..rows.len()).collect();
    by_actual.sort_by(|&a, &b| {
        rows[b]
            .actual_total
            .partial_cmp(&rows[a].actual_total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| rows[a].roster_id.cmp(&rows[b].roster_id))
    });
    for &i in by_actual.iter().take(playoff_teams) {
        rows[i].playoff = true;
    }

    rows.sort_by(|a, b| {
        a.playoff
            .cmp(&b.playoff)
            .then_with(|| {
                a.projected_total
                    .partial_cmp(&b.projected_total)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.roster_id.cmp(&b.roster_id))
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.draft_slot = i + 1;
    }
}
