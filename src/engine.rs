// Projection engine: pulls league, roster, stat and market feeds and turns
// them into the standings tables (Best Ball draft order, WR/TE PWOPR, RB PWRB
// and market-value power rankings).
//
// The engine never touches ranking rows. Every report is computed from a
// fresh league snapshot; per-week fetches run concurrently and a failed week
// is logged and left out.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::feeds::cache::{signal_key, SignalCache};
use crate::feeds::ktc::MarketData;
use crate::feeds::sleeper::{
    first_stat, projected_points, League, LeagueUser, Matchup, NflPlayer, NflState, Roster,
    StatLine, PROJECTED_POINT_PATHS,
};
use crate::feeds::FeedError;
use crate::names::{normalize, AliasMap};
use crate::valuation::best_ball::{
    BestBallInputs, BestBallProjector, BestBallRow, CompletedWeek, FutureWeek, PlayerMeta,
    RosterInput,
};
use crate::valuation::linear::{HistoryRow, LinearModelOptions, PwoprLinearModel};
use crate::valuation::position::{count_slots, Position};
use crate::valuation::power::{power_rankings, MarketIndex, PowerRow};
use crate::valuation::pwrb::{PwrbOutput, PwrbScorer, PwrbWeights, RbInputs};
use crate::valuation::wopr::{
    attach_signals, compute_wopr_rows, ExternalSignals, PwoprRow, PwoprScorer, ReceivingLine,
};

/// First playoff week assumed when the league does not say.
pub const DEFAULT_PLAYOFF_WEEK_START: u32 = 15;

/// Read-only league, player and weekly stat feeds.
#[async_trait]
pub trait LeagueData: Send + Sync {
    async fn league(&self, league_id: &str) -> Result<League, FeedError>;
    async fn rosters(&self, league_id: &str) -> Result<Vec<Roster>, FeedError>;
    async fn users(&self, league_id: &str) -> Result<Vec<LeagueUser>, FeedError>;
    async fn matchups(&self, league_id: &str, week: u32) -> Result<Vec<Matchup>, FeedError>;
    async fn players(&self) -> Result<HashMap<String, NflPlayer>, FeedError>;
    async fn nfl_state(&self) -> Result<NflState, FeedError>;
    async fn weekly_stats(&self, season: &str, week: u32) -> Result<HashMap<String, StatLine>, FeedError>;
    async fn weekly_projections(
        &self,
        season: &str,
        week: u32,
    ) -> Result<HashMap<String, StatLine>, FeedError>;

    /// Full-season totals, used for prior-year PPG. Sources without season
    /// totals report none.
    async fn season_stats(&self, _season: &str) -> Result<HashMap<String, StatLine>, FeedError> {
        Ok(HashMap::new())
    }
}

// ---------------------------------------------------------------------------
// Stat paths
// ---------------------------------------------------------------------------

const TARGETS: &[&str] = &["rec_tgt"];
const AIR_YARDS: &[&str] = &["rec_air_yd", "rec_air_yds"];
const RUSH_ATTEMPTS: &[&str] = &["rush_att"];
const RECEPTIONS: &[&str] = &["rec"];
const YARDS_CREATED: &[&str] = &["rush_yac", "rush_yd"];
const MISSED_TACKLES: &[&str] = &["rush_btkl", "rush_mtkl"];
const BREAKAWAY_RUNS: &[&str] = &["rush_40p", "rush_20p"];
const SUCCESSFUL_RUNS: &[&str] = &["rush_fd"];
const SNAPS: &[&str] = &["off_snp"];
const TEAM_SNAPS: &[&str] = &["tm_off_snp"];
const GAMES: &[&str] = &["gp"];

fn stat(line: Option<&StatLine>, paths: &[&str]) -> f64 {
    line.and_then(|l| first_stat(l, paths)).unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// League snapshot
// ---------------------------------------------------------------------------

/// Everything the reports share about one league at one point in time.
#[derive(Debug, Clone)]
pub struct LeagueSnapshot {
    pub league_id: String,
    pub season: String,
    pub rosters: Vec<RosterInput>,
    pub players: HashMap<String, PlayerMeta>,
    pub ages: HashMap<String, f64>,
    pub slots: HashMap<String, usize>,
    pub last_completed_week: u32,
    pub regular_season_end: u32,
}

fn player_meta(p: &NflPlayer) -> PlayerMeta {
    PlayerMeta {
        name: p.name(),
        position: p.position.as_deref().and_then(Position::from_str_pos),
        team: p
            .team
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_uppercase),
        injury_status: p.injury_status.clone(),
        active: p.is_active(),
    }
}

fn roster_inputs(rosters: Vec<Roster>, users: &[LeagueUser]) -> Vec<RosterInput> {
    let labels: HashMap<&str, String> = users
        .iter()
        .map(|u| (u.user_id.as_str(), u.team_label()))
        .collect();
    let mut inputs: Vec<RosterInput> = rosters
        .into_iter()
        .map(|r| {
            let team_name = r
                .owner_id
                .as_deref()
                .and_then(|id| labels.get(id).cloned())
                .unwrap_or_else(|| format!("Team {}", r.roster_id));
            RosterInput {
                roster_id: r.roster_id,
                owner_id: r.owner_id,
                team_name,
                players: r.players.unwrap_or_default(),
            }
        })
        .collect();
    inputs.sort_by_key(|r| r.roster_id);
    inputs
}

/// Last fully scored week of the league's season, capped at the end of the
/// regular season.
pub fn last_completed_week(league: &League, state: &NflState, regular_season_end: u32) -> u32 {
    if let Some(leg) = league.settings.last_scored_leg {
        return leg.min(regular_season_end);
    }
    let league_season = league.season.trim().parse::<i32>().ok();
    let state_season = state.season.trim().parse::<i32>().ok();
    match (league_season, state_season) {
        (Some(l), Some(s)) if s > l => regular_season_end,
        (Some(l), Some(s)) if s < l => 0,
        _ => state.week.saturating_sub(1).min(regular_season_end),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Tunables that come from configuration rather than the feeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub pwrb: PwrbWeights,
    pub linear: LinearModelOptions,
}

/// All standings tables for one league.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StandingsReport {
    pub best_ball: Vec<BestBallRow>,
    pub pwopr: Vec<PwoprRow>,
    pub pwrb: Vec<PwrbOutput>,
    pub power: Vec<PowerRow>,
}

pub struct ProjectionEngine {
    league: Arc<dyn LeagueData>,
    market: Arc<dyn MarketData>,
    aliases: Arc<AliasMap>,
    cache: Option<Arc<SignalCache>>,
    best_ball: BestBallProjector,
    pwopr: PwoprScorer,
    pwrb: PwrbScorer,
    linear: LinearModelOptions,
}

impl ProjectionEngine {
    pub fn new(league: Arc<dyn LeagueData>, market: Arc<dyn MarketData>, aliases: Arc<AliasMap>) -> Self {
        Self {
            league,
            market,
            aliases,
            cache: None,
            best_ball: BestBallProjector::default(),
            pwopr: PwoprScorer::default(),
            pwrb: PwrbScorer::default(),
            linear: LinearModelOptions::default(),
        }
    }

    /// Route stat, projection and player fetches through `cache`.
    pub fn with_cache(mut self, cache: Arc<SignalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.pwrb = PwrbScorer::with_weights(settings.pwrb);
        self.linear = settings.linear;
        self
    }

    async fn cached<T, F, Fut>(&self, key: String, fetch: F) -> Result<T, FeedError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        match &self.cache {
            Some(cache) => cache.get_or_refresh(&key, fetch).await,
            None => fetch().await,
        }
    }

    async fn stats(&self, season: &str, week: u32) -> Result<HashMap<String, StatLine>, FeedError> {
        let key = signal_key("stats", season, &format!("w{week:02}"));
        self.cached(key, || self.league.weekly_stats(season, week)).await
    }

    async fn projections(&self, season: &str, week: u32) -> Result<HashMap<String, StatLine>, FeedError> {
        let key = signal_key("projections", season, &format!("w{week:02}"));
        self.cached(key, || self.league.weekly_projections(season, week)).await
    }

    /// Fetch one table per week concurrently. Failed weeks are logged and
    /// omitted from the result.
    async fn per_week<T, F, Fut>(&self, what: &str, weeks: impl IntoIterator<Item = u32>, fetch: F) -> Vec<(u32, T)>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        let weeks: Vec<u32> = weeks.into_iter().collect();
        let results = join_all(weeks.iter().map(|&w| fetch(w))).await;
        weeks
            .into_iter()
            .zip(results)
            .filter_map(|(week, result)| match result {
                Ok(value) => Some((week, value)),
                Err(e) => {
                    warn!("{} for week {} unavailable: {}", what, week, e);
                    None
                }
            })
            .collect()
    }

    /// Fetch the league, its rosters and owners, and the player table.
    pub async fn snapshot(&self, league_id: &str) -> Result<LeagueSnapshot, FeedError> {
        let league = self.league.league(league_id).await?;
        let rosters = self.league.rosters(league_id).await?;
        let users = match self.league.users(league_id).await {
            Ok(users) => users,
            Err(e) => {
                warn!("league users unavailable, using roster ids as team names: {}", e);
                Vec::new()
            }
        };
        let state = self.league.nfl_state().await?;
        let raw_players = self
            .cached(signal_key("players", "nfl", "all"), || self.league.players())
            .await?;

        let regular_season_end = league
            .settings
            .playoff_week_start
            .unwrap_or(DEFAULT_PLAYOFF_WEEK_START)
            .saturating_sub(1);
        let last_completed_week = last_completed_week(&league, &state, regular_season_end);

        let players = raw_players
            .iter()
            .map(|(id, p)| (id.clone(), player_meta(p)))
            .collect();
        let ages = raw_players
            .iter()
            .filter_map(|(id, p)| Some((id.clone(), p.age?)))
            .collect();

        debug!(
            "league {} season {}: {} rosters, last completed week {}",
            league_id,
            league.season,
            rosters.len(),
            last_completed_week
        );
        Ok(LeagueSnapshot {
            league_id: league_id.to_string(),
            season: league.season.clone(),
            rosters: roster_inputs(rosters, &users),
            players,
            ages,
            slots: count_slots(&league.roster_positions),
            last_completed_week,
            regular_season_end,
        })
    }

    // ------------------------------------------------------------------
    // Best Ball
    // ------------------------------------------------------------------

    /// Season-to-date optimal lineup totals plus projected remaining
    /// regular-season weeks, ordered for the rookie draft.
    pub async fn best_ball(&self, snap: &LeagueSnapshot) -> Vec<BestBallRow> {
        let completed = self
            .per_week("matchups", 1..=snap.last_completed_week, |w| {
                self.league.matchups(&snap.league_id, w)
            })
            .await
            .into_iter()
            .map(|(week, matchups)| CompletedWeek {
                week,
                points: matchups
                    .into_iter()
                    .map(|m| (m.roster_id, m.players_points.unwrap_or_default()))
                    .collect(),
            })
            .collect();

        let future_weeks = snap.last_completed_week + 1..=snap.regular_season_end;
        let future = self
            .per_week("projections", future_weeks, |w| self.projections(&snap.season, w))
            .await
            .into_iter()
            .map(|(week, lines)| future_week(week, &lines, &snap.players))
            .collect();

        let inputs = BestBallInputs {
            rosters: snap.rosters.clone(),
            players: snap.players.clone(),
            slots: snap.slots.clone(),
            completed,
            future,
        };
        let rows = self.best_ball.project(&inputs);
        info!("Best Ball projection computed for {} rosters", rows.len());
        rows
    }

    // ------------------------------------------------------------------
    // WR/TE
    // ------------------------------------------------------------------

    fn receiving_lines(&self, snap: &LeagueSnapshot, stats: &HashMap<String, StatLine>) -> Vec<ReceivingLine> {
        stats
            .iter()
            .filter_map(|(id, line)| {
                let meta = snap.players.get(id)?;
                let position = meta.position?;
                Some(ReceivingLine {
                    player_id: id.clone(),
                    name: meta.name.clone(),
                    position,
                    team: meta.team.clone(),
                    active: meta.active,
                    targets: stat(Some(line), TARGETS),
                    air_yards: stat(Some(line), AIR_YARDS),
                })
            })
            .collect()
    }

    fn pwopr_signals(
        &self,
        snap: &LeagueSnapshot,
        projections: Option<&HashMap<String, StatLine>>,
        rtm: &HashMap<String, f64>,
        prior: &HashMap<String, f64>,
    ) -> HashMap<String, ExternalSignals> {
        snap.players
            .iter()
            .filter(|(_, m)| matches!(m.position, Some(Position::WR | Position::TE)))
            .map(|(id, meta)| {
                let signals = ExternalSignals {
                    external_projection: projections
                        .and_then(|p| p.get(id))
                        .and_then(projected_points),
                    rtm_overall: rtm.get(&normalize(&meta.name)).copied(),
                    prior_ppg: prior.get(id).copied(),
                    injury_status: meta.injury_status.clone(),
                };
                (id.clone(), signals)
            })
            .collect()
    }

    /// WR/TE composites from the last completed week, with linear-model
    /// signals trained on earlier week-to-week pairs.
    pub async fn pwopr(&self, snap: &LeagueSnapshot) -> Vec<PwoprRow> {
        let week = snap.last_completed_week;
        if week == 0 {
            info!("no completed weeks yet; skipping PWOPR");
            return Vec::new();
        }

        let stats: HashMap<u32, HashMap<String, StatLine>> = self
            .per_week("stats", 1..=week, |w| self.stats(&snap.season, w))
            .await
            .into_iter()
            .collect();
        let projections: HashMap<u32, HashMap<String, StatLine>> = self
            .per_week("projections", 2..=week + 1, |w| self.projections(&snap.season, w))
            .await
            .into_iter()
            .collect();

        let rtm = match self.market.rtm_overall().await {
            Ok(rtm) => rtm,
            Err(e) => {
                warn!("receiver metrics unavailable: {}", e);
                HashMap::new()
            }
        };
        let prior = self.prior_ppg(snap).await;

        // History pairs: composite at week k against actual points at k+1.
        let mut history = Vec::new();
        for k in 1..week {
            let (Some(current), Some(next)) = (stats.get(&k), stats.get(&(k + 1))) else {
                continue;
            };
            let signals = self.pwopr_signals(snap, projections.get(&(k + 1)), &rtm, &prior);
            let rows = compute_wopr_rows(&self.receiving_lines(snap, current));
            for row in self.pwopr.score(&rows, &signals) {
                let Some(actual) = next.get(&row.player_id).and_then(|l| first_stat(l, PROJECTED_POINT_PATHS)) else {
                    continue;
                };
                history.push(HistoryRow {
                    position: Some(row.position),
                    pwopr: row.pwopr,
                    actual_points: actual,
                });
            }
        }

        let Some(latest) = stats.get(&week) else {
            warn!("stats for week {} unavailable; skipping PWOPR", week);
            return Vec::new();
        };
        let signals = self.pwopr_signals(snap, projections.get(&(week + 1)), &rtm, &prior);
        let mut rows = self
            .pwopr
            .score(&compute_wopr_rows(&self.receiving_lines(snap, latest)), &signals);

        let model = PwoprLinearModel::train(&history, self.linear.clone());
        attach_signals(&mut rows, &model);
        info!(
            "PWOPR computed for {} receivers (week {}, {} history rows)",
            rows.len(),
            week,
            history.len()
        );
        rows
    }

    /// Previous season's points per game, keyed by player id.
    async fn prior_ppg(&self, snap: &LeagueSnapshot) -> HashMap<String, f64> {
        let Some(prior_season) = snap.season.trim().parse::<i32>().ok().map(|s| (s - 1).to_string()) else {
            return HashMap::new();
        };
        let key = signal_key("season", &prior_season, "totals");
        let totals = match self.cached(key, || self.league.season_stats(&prior_season)).await {
            Ok(totals) => totals,
            Err(e) => {
                warn!("{} season totals unavailable: {}", prior_season, e);
                return HashMap::new();
            }
        };
        totals
            .into_iter()
            .filter_map(|(id, line)| {
                let points = first_stat(&line, PROJECTED_POINT_PATHS)?;
                let games = first_stat(&line, GAMES).filter(|g| *g > 0.0)?;
                Some((id, points / games))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // RB
    // ------------------------------------------------------------------

    /// RB usage inputs for every running back with a stat line.
    pub fn rb_inputs(&self, snap: &LeagueSnapshot, stats: &HashMap<String, StatLine>) -> Vec<RbInputs> {
        let mut team_rush: HashMap<&str, f64> = HashMap::new();
        let mut team_targets: HashMap<&str, f64> = HashMap::new();
        for (id, line) in stats {
            let Some(meta) = snap.players.get(id) else {
                continue;
            };
            let Some(team) = meta.team.as_deref() else {
                continue;
            };
            if !meta.active {
                continue;
            }
            *team_rush.entry(team).or_default() += stat(Some(line), RUSH_ATTEMPTS);
            *team_targets.entry(team).or_default() += stat(Some(line), TARGETS);
        }

        let mut inputs: Vec<RbInputs> = stats
            .iter()
            .filter_map(|(id, line)| {
                let meta = snap.players.get(id)?;
                if meta.position != Some(Position::RB) || !meta.active {
                    return None;
                }
                let team = meta.team.as_deref()?;
                let line = Some(line);
                Some(RbInputs {
                    player_id: id.clone(),
                    name: meta.name.clone(),
                    team: team.to_string(),
                    age: snap.ages.get(id).copied(),
                    injury_status: meta.injury_status.clone(),
                    games: stat(line, GAMES).max(1.0),
                    rush_attempts: stat(line, RUSH_ATTEMPTS),
                    team_rush_attempts: team_rush.get(team).copied().unwrap_or(0.0),
                    targets: stat(line, TARGETS),
                    team_targets: team_targets.get(team).copied().unwrap_or(0.0),
                    receptions: stat(line, RECEPTIONS),
                    yards_created: stat(line, YARDS_CREATED),
                    missed_tackles: stat(line, MISSED_TACKLES),
                    breakaway_runs: stat(line, BREAKAWAY_RUNS),
                    successful_runs: stat(line, SUCCESSFUL_RUNS),
                    snaps: stat(line, SNAPS),
                    team_snaps: stat(line, TEAM_SNAPS),
                })
            })
            .collect();
        inputs.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        inputs
    }

    /// RB composites from the last completed week.
    pub async fn pwrb(&self, snap: &LeagueSnapshot) -> Vec<PwrbOutput> {
        let week = snap.last_completed_week;
        if week == 0 {
            info!("no completed weeks yet; skipping PWRB");
            return Vec::new();
        }
        let stats = match self.stats(&snap.season, week).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("stats for week {} unavailable; skipping PWRB: {}", week, e);
                return Vec::new();
            }
        };
        let rows = self.pwrb.score(&self.rb_inputs(snap, &stats));
        info!("PWRB computed for {} running backs (week {})", rows.len(), week);
        rows
    }

    // ------------------------------------------------------------------
    // Power rankings
    // ------------------------------------------------------------------

    /// Rosters ranked by the market value of their optimal lineup.
    pub async fn power(&self, snap: &LeagueSnapshot) -> Vec<PowerRow> {
        let values = match self.market.market_values().await {
            Ok(values) => values,
            Err(e) => {
                warn!("market values unavailable: {}", e);
                Vec::new()
            }
        };
        let index = MarketIndex::new(values);
        let rows = power_rankings(&snap.rosters, &snap.players, &index, &self.aliases, &snap.slots);
        info!(
            "Power rankings computed for {} rosters ({} market values)",
            rows.len(),
            index.len()
        );
        rows
    }

    /// Every standings table for `league_id`. Only the league snapshot is
    /// required; each table degrades to empty on its own.
    pub async fn standings(&self, league_id: &str) -> Result<StandingsReport, FeedError> {
        let snap = self.snapshot(league_id).await?;
        let (best_ball, pwopr, pwrb, power) = tokio::join!(
            self.best_ball(&snap),
            self.pwopr(&snap),
            self.pwrb(&snap),
            self.power(&snap),
        );
        Ok(StandingsReport {
            best_ball,
            pwopr,
            pwrb,
            power,
        })
    }
}

/// Projected points for one future week. Teams are playing when at least one
/// of their players appears in the week's projection table.
fn future_week(week: u32, lines: &HashMap<String, StatLine>, players: &HashMap<String, PlayerMeta>) -> FutureWeek {
    let teams_playing: HashSet<String> = lines
        .keys()
        .filter_map(|id| players.get(id)?.team.clone())
        .collect();
    let projections = lines
        .iter()
        .filter_map(|(id, line)| Some((id.clone(), projected_points(line)?)))
        .collect();
    FutureWeek {
        week,
        projections,
        teams_playing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::sleeper::{LeagueSettings, UserMetadata};
    use crate::valuation::power::MarketValue;
    use std::sync::Mutex;

    fn line(pairs: &[(&str, f64)]) -> StatLine {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn nfl(name: &str, pos: &str, team: &str) -> NflPlayer {
        let (first, last) = name.split_once(' ').unwrap_or((name, ""));
        NflPlayer {
            first_name: Some(first.into()),
            last_name: Some(last.into()),
            position: Some(pos.into()),
            team: Some(team.into()),
            active: Some(true),
            ..Default::default()
        }
    }

    /// In-memory league with two rosters and two completed weeks.
    #[derive(Default)]
    struct FakeLeague {
        failing_matchup_weeks: Vec<u32>,
        stats: HashMap<u32, HashMap<String, StatLine>>,
        projections: HashMap<u32, HashMap<String, StatLine>>,
        season_totals: HashMap<String, StatLine>,
        stat_calls: Mutex<usize>,
    }

    fn fail(what: &str) -> FeedError {
        FeedError::Status {
            url: format!("https://league.test/{what}"),
            status: 500,
        }
    }

    #[async_trait]
    impl LeagueData for FakeLeague {
        async fn league(&self, _league_id: &str) -> Result<League, FeedError> {
            Ok(League {
                name: Some("Test League".into()),
                season: "2025".into(),
                total_rosters: 2,
                roster_positions: ["QB", "RB", "WR", "TE", "FLEX", "BN", "BN"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                settings: LeagueSettings {
                    playoff_week_start: Some(5),
                    last_scored_leg: None,
                },
            })
        }

        async fn rosters(&self, _league_id: &str) -> Result<Vec<Roster>, FeedError> {
            Ok(vec![
                Roster {
                    roster_id: 2,
                    owner_id: Some("u2".into()),
                    players: Some(vec!["qb2".into(), "rb2".into(), "wr2".into(), "te2".into()]),
                },
                Roster {
                    roster_id: 1,
                    owner_id: Some("u1".into()),
                    players: Some(vec!["qb1".into(), "rb1".into(), "wr1".into(), "te1".into()]),
                },
            ])
        }

        async fn users(&self, _league_id: &str) -> Result<Vec<LeagueUser>, FeedError> {
            Ok(vec![LeagueUser {
                user_id: "u1".into(),
                display_name: Some("one".into()),
                metadata: Some(UserMetadata {
                    team_name: Some("Alpha".into()),
                }),
            }])
        }

        async fn matchups(&self, _league_id: &str, week: u32) -> Result<Vec<Matchup>, FeedError> {
            if self.failing_matchup_weeks.contains(&week) {
                return Err(fail("matchups"));
            }
            let pts = |ids: &[(&str, f64)]| -> Option<HashMap<String, f64>> {
                Some(ids.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            };
            Ok(vec![
                Matchup {
                    roster_id: 1,
                    players_points: pts(&[("qb1", 20.0), ("rb1", 10.0), ("wr1", 15.0), ("te1", 5.0)]),
                },
                Matchup {
                    roster_id: 2,
                    players_points: pts(&[("qb2", 25.0), ("rb2", 12.0), ("wr2", 18.0), ("te2", 8.0)]),
                },
            ])
        }

        async fn players(&self) -> Result<HashMap<String, NflPlayer>, FeedError> {
            let mut players = HashMap::new();
            players.insert("qb1".into(), nfl("Josh Allen", "QB", "BUF"));
            players.insert("rb1".into(), NflPlayer { age: Some(23.0), ..nfl("Bijan Robinson", "RB", "ATL") });
            players.insert("wr1".into(), nfl("Puka Nacua", "WR", "LAR"));
            players.insert("te1".into(), nfl("Tyler Higbee", "TE", "LAR"));
            players.insert("qb2".into(), nfl("Jalen Hurts", "QB", "PHI"));
            players.insert("rb2".into(), NflPlayer { age: Some(29.0), ..nfl("Derrick Henry", "RB", "BAL") });
            players.insert("wr2".into(), nfl("Ja'Marr Chase", "WR", "CIN"));
            players.insert("te2".into(), nfl("Trey McBride", "TE", "ARI"));
            Ok(players)
        }

        async fn nfl_state(&self) -> Result<NflState, FeedError> {
            Ok(NflState {
                season: "2025".into(),
                week: 3,
                display_week: Some(3),
            })
        }

        async fn weekly_stats(&self, _season: &str, week: u32) -> Result<HashMap<String, StatLine>, FeedError> {
            *self.stat_calls.lock().unwrap() += 1;
            self.stats.get(&week).cloned().ok_or_else(|| fail("stats"))
        }

        async fn weekly_projections(
            &self,
            _season: &str,
            week: u32,
        ) -> Result<HashMap<String, StatLine>, FeedError> {
            self.projections.get(&week).cloned().ok_or_else(|| fail("projections"))
        }

        async fn season_stats(&self, _season: &str) -> Result<HashMap<String, StatLine>, FeedError> {
            Ok(self.season_totals.clone())
        }
    }

    struct FakeMarket(Vec<MarketValue>);

    #[async_trait]
    impl MarketData for FakeMarket {
        async fn market_values(&self) -> Result<Vec<MarketValue>, FeedError> {
            Ok(self.0.clone())
        }
    }

    fn mv(name: &str, value: f64) -> MarketValue {
        MarketValue {
            name: name.into(),
            position: None,
            value,
        }
    }

    fn engine(league: FakeLeague, market: Vec<MarketValue>) -> ProjectionEngine {
        ProjectionEngine::new(
            Arc::new(league),
            Arc::new(FakeMarket(market)),
            Arc::new(AliasMap::builtin()),
        )
    }

    fn receiving_week() -> HashMap<String, StatLine> {
        let mut week = HashMap::new();
        week.insert("wr1".into(), line(&[("rec_tgt", 10.0), ("rec_air_yd", 120.0), ("pts_ppr", 18.0)]));
        week.insert("te1".into(), line(&[("rec_tgt", 5.0), ("rec_air_yd", 30.0), ("pts_ppr", 9.0)]));
        week.insert(
            "rb1".into(),
            line(&[
                ("rush_att", 20.0),
                ("rec_tgt", 4.0),
                ("rec", 3.0),
                ("rush_yac", 60.0),
                ("rush_btkl", 3.0),
                ("rush_20p", 1.0),
                ("rush_fd", 6.0),
                ("off_snp", 45.0),
                ("tm_off_snp", 60.0),
                ("gp", 1.0),
                ("pts_ppr", 17.0),
            ]),
        );
        week
    }

    #[test]
    fn completed_week_selection() {
        let mut league = League {
            season: "2025".into(),
            ..Default::default()
        };
        let state = |season: &str, week| NflState {
            season: season.into(),
            week,
            display_week: None,
        };
        assert_eq!(last_completed_week(&league, &state("2025", 7), 14), 6);
        assert_eq!(last_completed_week(&league, &state("2025", 1), 14), 0);
        assert_eq!(last_completed_week(&league, &state("2026", 1), 14), 14);
        assert_eq!(last_completed_week(&league, &state("2024", 10), 14), 0);
        assert_eq!(last_completed_week(&league, &state("2025", 18), 14), 14);
        league.settings.last_scored_leg = Some(9);
        assert_eq!(last_completed_week(&league, &state("2025", 3), 14), 9);
    }

    #[test]
    fn future_week_marks_byes() {
        let mut players = HashMap::new();
        players.insert("a".to_string(), player_meta(&nfl("A A", "WR", "KC")));
        players.insert("b".to_string(), player_meta(&nfl("B B", "WR", "BUF")));
        let mut lines = HashMap::new();
        lines.insert("a".to_string(), line(&[("pts_half_ppr", 12.5)]));
        lines.insert("TEAM_X".to_string(), line(&[("pts_ppr", 3.0)]));

        let week = future_week(6, &lines, &players);
        assert!(week.teams_playing.contains("KC"));
        assert!(!week.teams_playing.contains("BUF"));
        assert_eq!(week.projections.get("a"), Some(&12.5));
    }

    #[tokio::test]
    async fn snapshot_joins_users_and_slots() {
        let engine = engine(FakeLeague::default(), vec![]);
        let snap = engine.snapshot("L1").await.unwrap();
        assert_eq!(snap.last_completed_week, 2);
        assert_eq!(snap.regular_season_end, 4);
        assert_eq!(snap.rosters[0].roster_id, 1);
        assert_eq!(snap.rosters[0].team_name, "Alpha");
        assert_eq!(snap.rosters[1].team_name, "Team 2");
        assert_eq!(snap.slots.get("FLEX"), Some(&1));
        assert!(!snap.slots.contains_key("BN"));
        assert_eq!(snap.ages.get("rb2"), Some(&29.0));
    }

    #[tokio::test]
    async fn best_ball_skips_failed_weeks() {
        let league = FakeLeague {
            failing_matchup_weeks: vec![2],
            ..Default::default()
        };
        let engine = engine(league, vec![]);
        let snap = engine.snapshot("L1").await.unwrap();
        let rows = engine.best_ball(&snap).await;
        assert_eq!(rows.len(), 2);
        let r1 = rows.iter().find(|r| r.roster_id == 1).unwrap();
        // Only week 1 counted; FLEX has no fifth player to fill it.
        assert_eq!(r1.weeks_played, 1);
        assert_eq!(r1.actual_total, 50.0);
        let r2 = rows.iter().find(|r| r.roster_id == 2).unwrap();
        assert_eq!(r2.actual_total, 63.0);
        // No projection weeks available, so nothing is projected forward.
        assert_eq!(r1.projected_future, 0.0);
    }

    #[tokio::test]
    async fn pwopr_rows_from_latest_week() {
        let mut league = FakeLeague::default();
        league.stats.insert(1, receiving_week());
        league.stats.insert(2, receiving_week());
        let engine = engine(league, vec![]);
        let snap = engine.snapshot("L1").await.unwrap();
        let rows = engine.pwopr(&snap).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].player_id, "wr1");
        assert!(rows[0].pwopr > rows[1].pwopr);
        // No external signals: composite equals the WOPR curve value.
        assert_eq!(rows[0].pwopr, rows[0].wopr_ppg);
        // Too little history for a regression.
        assert!(rows.iter().all(|r| r.signal.is_none()));
    }

    #[tokio::test]
    async fn pwopr_empty_before_first_week() {
        let league = FakeLeague::default();
        let engine = engine(league, vec![]);
        let mut snap = engine.snapshot("L1").await.unwrap();
        snap.last_completed_week = 0;
        assert!(engine.pwopr(&snap).await.is_empty());
        assert!(engine.pwrb(&snap).await.is_empty());
    }

    #[tokio::test]
    async fn prior_ppg_from_season_totals() {
        let mut league = FakeLeague::default();
        league
            .season_totals
            .insert("wr1".into(), line(&[("pts_ppr", 272.0), ("gp", 17.0)]));
        league.season_totals.insert("te1".into(), line(&[("pts_ppr", 50.0)]));
        let engine = engine(league, vec![]);
        let snap = engine.snapshot("L1").await.unwrap();
        let prior = engine.prior_ppg(&snap).await;
        assert_eq!(prior.get("wr1"), Some(&16.0));
        assert!(!prior.contains_key("te1"));
    }

    #[tokio::test]
    async fn rb_inputs_use_team_totals() {
        let engine = engine(FakeLeague::default(), vec![]);
        let snap = engine.snapshot("L1").await.unwrap();
        let inputs = engine.rb_inputs(&snap, &receiving_week());
        assert_eq!(inputs.len(), 1);
        let rb = &inputs[0];
        assert_eq!(rb.player_id, "rb1");
        assert_eq!(rb.team_rush_attempts, 20.0);
        assert_eq!(rb.team_targets, 4.0);
        assert_eq!(rb.yards_created, 60.0);
        assert_eq!(rb.breakaway_runs, 1.0);
        assert_eq!(rb.age, Some(23.0));
    }

    #[tokio::test]
    async fn pwrb_scores_latest_week() {
        let mut league = FakeLeague::default();
        league.stats.insert(2, receiving_week());
        let engine = engine(league, vec![]);
        let snap = engine.snapshot("L1").await.unwrap();
        let rows = engine.pwrb(&snap).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Bijan Robinson");
        assert!(rows[0].pwrb > 0.0);
    }

    #[tokio::test]
    async fn power_rankings_use_market_values() {
        let market = vec![
            mv("Josh Allen", 9800.0),
            mv("Ja'Marr Chase", 9500.0),
            mv("Bijan Robinson", 9000.0),
            mv("Puka Nacua", 8000.0),
            mv("Jalen Hurts", 7000.0),
        ];
        let engine = engine(FakeLeague::default(), market);
        let snap = engine.snapshot("L1").await.unwrap();
        let rows = engine.power(&snap).await;
        assert_eq!(rows[0].roster_id, 1);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].total_value, 26800.0);
        assert_eq!(rows[0].unmatched, 1);
        assert_eq!(rows[1].total_value, 16500.0);
    }

    #[tokio::test]
    async fn standings_report_degrades_per_table() {
        let engine = engine(FakeLeague::default(), vec![]);
        let report = engine.standings("L1").await.unwrap();
        assert_eq!(report.best_ball.len(), 2);
        // Stats feed has nothing, so the stat-driven tables are empty.
        assert!(report.pwopr.is_empty());
        assert!(report.pwrb.is_empty());
        assert!(report.power.iter().all(|r| r.total_value == 0.0));
    }

    #[tokio::test]
    async fn stats_go_through_cache() {
        use crate::db::Database;

        let mut league = FakeLeague::default();
        league.stats.insert(2, receiving_week());
        let league = Arc::new(league);
        let db = Arc::new(Database::open(":memory:").unwrap());
        let engine = ProjectionEngine::new(
            league.clone(),
            Arc::new(FakeMarket(vec![])),
            Arc::new(AliasMap::builtin()),
        )
        .with_cache(Arc::new(SignalCache::new(db, 24)));

        engine.stats("2025", 2).await.unwrap();
        engine.stats("2025", 2).await.unwrap();
        assert_eq!(*league.stat_calls.lock().unwrap(), 1);
    }
}
