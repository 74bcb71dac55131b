// Draft pick payloads and derived display values.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Feed payloads
// ---------------------------------------------------------------------------

/// Player metadata attached to a pick by the draft feed. Every field may be
/// missing or empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickMetadata {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

/// A single pick as returned by the draft feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPick {
    pub pick_no: u32,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub picked_by: Option<String>,
    #[serde(default)]
    pub metadata: PickMetadata,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl FeedPick {
    /// Player name from first/last name fields, falling back to the combined
    /// display name.
    pub fn player_name(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.metadata.first_name, &self.metadata.last_name]
            .into_iter()
            .filter_map(non_empty)
            .collect();
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
        non_empty(&self.metadata.player_name).map(str::to_string)
    }

    /// Uppercased position code, empty when missing.
    pub fn position(&self) -> String {
        non_empty(&self.metadata.position)
            .map(str::to_uppercase)
            .unwrap_or_default()
    }

    pub fn team(&self) -> String {
        non_empty(&self.metadata.team).unwrap_or_default().to_string()
    }
}

// ---------------------------------------------------------------------------
// Draft pick
// ---------------------------------------------------------------------------

/// One observed pick, recomputed from the full feed snapshot every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPick {
    /// Sequential pick number (1-indexed).
    pub pick_no: u32,
    /// "round.pick" with the pick zero-padded, e.g. "1.01".
    pub pick_display: String,
    pub player_name: String,
    pub position: String,
    pub team: String,
    /// Opaque id of the drafting user.
    pub picked_by: String,
    /// Derived from the persisted set of the user's ids; not from the feed.
    #[serde(default)]
    pub is_my_pick: bool,
}

/// Round and pick-in-round for the `n`th (1-based) selection.
pub fn round_and_pick(n: u32, league_size: u32) -> (u32, u32) {
    let size = league_size.max(1);
    let n = n.max(1);
    (n.div_ceil(size), (n - 1) % size + 1)
}

/// Display label for a pick number, e.g. 13 in a 12-team league -> "2.01".
pub fn pick_display(pick_no: u32, league_size: u32) -> String {
    let (round, pick) = round_and_pick(pick_no, league_size);
    format!("{round}.{pick:02}")
}

/// Placeholder name for the `counter`th rookie pick, e.g. "2026 2.01".
pub fn rookie_pick_name(year: i32, counter: u32, league_size: u32) -> String {
    format!("{year} {}", pick_display(counter, league_size))
}

/// Recompute `is_my_pick` from the user's ids.
pub fn mark_my_picks(picks: &mut [DraftPick], my_user_ids: &HashSet<String>) {
    for pick in picks {
        pick.is_my_pick = !pick.picked_by.is_empty() && my_user_ids.contains(&pick.picked_by);
    }
}
