// Sleeper public API: drafts, leagues, rosters, matchups, players and
// weekly stat/projection tables.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::draft::pick::FeedPick;
use crate::draft::reconciler::DraftFeed;
use crate::engine::LeagueData;
use crate::feeds::{get_json, FeedError};

pub const DEFAULT_BASE_URL: &str = "https://api.sleeper.app/v1";

/// Projected-point fields in priority order.
pub const PROJECTED_POINT_PATHS: &[&str] = &["pts_ppr", "pts_half_ppr", "pts_std"];

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeagueSettings {
    #[serde(default)]
    pub playoff_week_start: Option<u32>,
    #[serde(default)]
    pub last_scored_leg: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct League {
    #[serde(default)]
    pub name: Option<String>,
    pub season: String,
    #[serde(default)]
    pub total_rosters: u32,
    #[serde(default)]
    pub roster_positions: Vec<String>,
    #[serde(default)]
    pub settings: LeagueSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    pub roster_id: u32,
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Null for empty rosters.
    #[serde(default)]
    pub players: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeagueUser {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<UserMetadata>,
}

impl LeagueUser {
    /// Team name when set, else display name, else the user id.
    pub fn team_label(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|m| m.team_name.as_deref())
            .or(self.display_name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.user_id)
            .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub roster_id: u32,
    #[serde(default)]
    pub players_points: Option<HashMap<String, f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NflPlayer {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub injury_status: Option<String>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
}

impl NflPlayer {
    /// Full name, or first and last joined, or empty.
    pub fn name(&self) -> String {
        if let Some(full) = self.full_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return full.to_string();
        }
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Active unless the feed says otherwise.
    pub fn is_active(&self) -> bool {
        match (self.active, self.status.as_deref()) {
            (Some(active), _) => active,
            (None, Some(status)) => !status.eq_ignore_ascii_case("inactive"),
            (None, None) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NflState {
    pub season: String,
    #[serde(default)]
    pub week: u32,
    #[serde(default)]
    pub display_week: Option<u32>,
}

/// Numeric stats for one player in one week.
pub type StatLine = HashMap<String, f64>;

/// Decode a `{ player_id: { stat: value } }` table, keeping only numeric
/// fields and skipping entries that are not objects.
fn numeric_lines(raw: HashMap<String, serde_json::Value>) -> HashMap<String, StatLine> {
    raw.into_iter()
        .filter_map(|(id, v)| {
            let obj = v.as_object()?;
            let line: StatLine = obj
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_f64()?)))
                .collect();
            Some((id, line))
        })
        .collect()
}

/// First stat present in `line` among `paths`, in order.
pub fn first_stat(line: &StatLine, paths: &[&str]) -> Option<f64> {
    paths.iter().find_map(|p| line.get(*p).copied().filter(|v| v.is_finite()))
}

/// Projected fantasy points for a projection line.
pub fn projected_points(line: &StatLine) -> Option<f64> {
    first_stat(line, PROJECTED_POINT_PATHS)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SleeperClient {
    client: reqwest::Client,
    base_url: String,
}

impl SleeperClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub async fn draft_picks(&self, draft_id: &str) -> Result<Vec<FeedPick>, FeedError> {
        get_json(&self.client, &self.url(&format!("draft/{draft_id}/picks"))).await
    }
}

#[async_trait]
impl DraftFeed for SleeperClient {
    async fn fetch_picks(&self, draft_id: &str) -> Result<Vec<FeedPick>, FeedError> {
        self.draft_picks(draft_id).await
    }
}

#[async_trait]
impl LeagueData for SleeperClient {
    async fn league(&self, league_id: &str) -> Result<League, FeedError> {
        get_json(&self.client, &self.url(&format!("league/{league_id}"))).await
    }

    async fn rosters(&self, league_id: &str) -> Result<Vec<Roster>, FeedError> {
        get_json(&self.client, &self.url(&format!("league/{league_id}/rosters"))).await
    }

    async fn users(&self, league_id: &str) -> Result<Vec<LeagueUser>, FeedError> {
        get_json(&self.client, &self.url(&format!("league/{league_id}/users"))).await
    }

    async fn matchups(&self, league_id: &str, week: u32) -> Result<Vec<Matchup>, FeedError> {
        get_json(&self.client, &self.url(&format!("league/{league_id}/matchups/{week}"))).await
    }

    async fn players(&self) -> Result<HashMap<String, NflPlayer>, FeedError> {
        get_json(&self.client, &self.url("players/nfl")).await
    }

    async fn nfl_state(&self) -> Result<NflState, FeedError> {
        get_json(&self.client, &self.url("state/nfl")).await
    }

    async fn weekly_stats(&self, season: &str, week: u32) -> Result<HashMap<String, StatLine>, FeedError> {
        let raw = get_json(&self.client, &self.url(&format!("stats/nfl/regular/{season}/{week}"))).await?;
        Ok(numeric_lines(raw))
    }

    async fn weekly_projections(
        &self,
        season: &str,
        week: u32,
    ) -> Result<HashMap<String, StatLine>, FeedError> {
        let raw = get_json(
            &self.client,
            &self.url(&format!("projections/nfl/regular/{season}/{week}")),
        )
        .await?;
        Ok(numeric_lines(raw))
    }

    async fn season_stats(&self, season: &str) -> Result<HashMap<String, StatLine>, FeedError> {
        let raw = get_json(&self.client, &self.url(&format!("stats/nfl/regular/{season}"))).await?;
        Ok(numeric_lines(raw))
    }
}
