// Position metadata, roster slot counting, and the best-ball lineup optimizer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Fantasy football player positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    QB,
    RB,
    WR,
    TE,
    K,
    DEF,
}

impl Position {
    pub const ALL: [Position; 6] = [
        Position::QB,
        Position::RB,
        Position::WR,
        Position::TE,
        Position::K,
        Position::DEF,
    ];

    /// Parse a position code. Accepts `DEF`, `DST` and `D/ST` for defenses.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(Position::QB),
            "RB" => Some(Position::RB),
            "WR" => Some(Position::WR),
            "TE" => Some(Position::TE),
            "K" | "PK" => Some(Position::K),
            "DEF" | "DST" | "D/ST" => Some(Position::DEF),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::QB => "QB",
            Position::RB => "RB",
            Position::WR => "WR",
            Position::TE => "TE",
            Position::K => "K",
            Position::DEF => "DEF",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// Static display and calibration data for one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionInfo {
    /// League-average points per game for a startable player.
    pub baseline_ppg: f64,
    /// Relative week-to-week volatility (1.0 = average).
    pub volatility: f64,
    /// Display color as a hex string.
    pub color: &'static str,
    pub label: &'static str,
}

/// Calibration table consulted by the projection models.
#[derive(Debug, Clone)]
pub struct PositionTable {
    entries: HashMap<Position, PositionInfo>,
}

impl Default for PositionTable {
    fn default() -> Self {
        let entries = [
            (Position::QB, PositionInfo { baseline_ppg: 18.0, volatility: 0.8, color: "#FC2B6D", label: "Quarterback" }),
            (Position::RB, PositionInfo { baseline_ppg: 12.0, volatility: 1.0, color: "#20CEB8", label: "Running Back" }),
            (Position::WR, PositionInfo { baseline_ppg: 12.0, volatility: 1.1, color: "#56C9F8", label: "Wide Receiver" }),
            (Position::TE, PositionInfo { baseline_ppg: 8.0, volatility: 1.2, color: "#FEAE58", label: "Tight End" }),
            (Position::K, PositionInfo { baseline_ppg: 8.0, volatility: 0.9, color: "#BD66FF", label: "Kicker" }),
            (Position::DEF, PositionInfo { baseline_ppg: 7.0, volatility: 1.0, color: "#BF755D", label: "Defense" }),
        ];
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

impl PositionTable {
    pub fn with_entries(entries: HashMap<Position, PositionInfo>) -> Self {
        Self { entries }
    }

    pub fn info(&self, pos: Position) -> Option<&PositionInfo> {
        self.entries.get(&pos)
    }

    /// Baseline points per game, 0.0 for positions missing from the table.
    pub fn baseline_ppg(&self, pos: Position) -> f64 {
        self.info(pos).map(|i| i.baseline_ppg).unwrap_or(0.0)
    }

    pub fn volatility(&self, pos: Position) -> f64 {
        self.info(pos).map(|i| i.volatility).unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// Roster slots
// ---------------------------------------------------------------------------

/// Starting lineup slot kinds the optimizer knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    QB,
    RB,
    WR,
    TE,
    K,
    DEF,
    /// WR or RB.
    WrRb,
    /// WR, RB or TE.
    WrRbTe,
    /// WR, RB or TE.
    Flex,
    /// QB, WR, RB or TE.
    SuperFlex,
}

/// Fill order: exact slots first, then flex slots by increasing breadth.
///
/// A narrow slot is always filled before any wider slot that could steal its
/// players, so this order must not be changed to "whatever is convenient".
pub const SLOT_ORDER: [Slot; 10] = [
    Slot::QB,
    Slot::RB,
    Slot::WR,
    Slot::TE,
    Slot::K,
    Slot::DEF,
    Slot::WrRb,
    Slot::WrRbTe,
    Slot::Flex,
    Slot::SuperFlex,
];

/// Roster codes that never contribute to a starting lineup.
const NON_STARTING_CODES: &[&str] = &["BN", "BE", "BENCH", "IR", "IL", "TAXI"];

impl Slot {
    /// Map a league roster code onto a slot kind.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "QB" => Some(Slot::QB),
            "RB" => Some(Slot::RB),
            "WR" => Some(Slot::WR),
            "TE" => Some(Slot::TE),
            "K" => Some(Slot::K),
            "DEF" | "DST" | "D/ST" => Some(Slot::DEF),
            "WRRB" | "WRRB_FLEX" | "WR/RB" => Some(Slot::WrRb),
            "WRRBTE" | "WRRBTE_FLEX" | "W/R/T" => Some(Slot::WrRbTe),
            "FLEX" => Some(Slot::Flex),
            "SUPER_FLEX" | "SUPERFLEX" | "SF" | "Q/W/R/T" => Some(Slot::SuperFlex),
            _ => None,
        }
    }

    /// Whether a player at `pos` may fill this slot.
    pub fn accepts(&self, pos: Position) -> bool {
        use Position as P;
        match self {
            Slot::QB => pos == P::QB,
            Slot::RB => pos == P::RB,
            Slot::WR => pos == P::WR,
            Slot::TE => pos == P::TE,
            Slot::K => pos == P::K,
            Slot::DEF => pos == P::DEF,
            Slot::WrRb => matches!(pos, P::WR | P::RB),
            Slot::WrRbTe | Slot::Flex => matches!(pos, P::WR | P::RB | P::TE),
            Slot::SuperFlex => matches!(pos, P::QB | P::WR | P::RB | P::TE),
        }
    }
}

/// Tally roster slot codes into `code -> count`, skipping bench, IR and taxi
/// codes. Codes are uppercased and trimmed.
pub fn count_slots<S: AsRef<str>>(roster_positions: &[S]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for code in roster_positions {
        let code = code.as_ref().trim().to_uppercase();
        if code.is_empty() || NON_STARTING_CODES.contains(&code.as_str()) {
            continue;
        }
        *counts.entry(code).or_insert(0) += 1;
    }
    counts
}

/// Number of lineup slots of kind `slot` in a tally from [`count_slots`].
fn slots_of_kind(slots: &HashMap<String, usize>, slot: Slot) -> usize {
    slots
        .iter()
        .filter(|(code, _)| Slot::from_code(code) == Some(slot))
        .map(|(_, &n)| n)
        .sum()
}

// ---------------------------------------------------------------------------
// Best-ball optimizer
// ---------------------------------------------------------------------------

/// One player eligible for the lineup, scored by points or by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub position: Position,
    pub score: f64,
}

/// A candidate placed into a lineup slot. `index` points into the slice
/// passed to [`optimize_lineup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Starter {
    pub index: usize,
    pub slot: Slot,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lineup {
    pub starters: Vec<Starter>,
    pub total: f64,
}

impl Lineup {
    /// Sum of starter scores at a given position.
    pub fn total_at(&self, candidates: &[Candidate], pos: Position) -> f64 {
        self.starters
            .iter()
            .filter(|s| candidates[s.index].position == pos)
            .map(|s| candidates[s.index].score)
            .sum()
    }
}

fn score_key(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

/// Greedily fill the lineup described by `slots`.
///
/// Slots are processed in [`SLOT_ORDER`]. For each slot kind, the highest
/// scoring unused eligible candidates are taken; equal scores keep their
/// input order.
pub fn optimize_lineup(candidates: &[Candidate], slots: &HashMap<String, usize>) -> Lineup {
    let mut used = vec![false; candidates.len()];
    let mut lineup = Lineup::default();

    for slot in SLOT_ORDER {
        let wanted = slots_of_kind(slots, slot);
        if wanted == 0 {
            continue;
        }
        let mut eligible: Vec<usize> = (0..candidates.len())
            .filter(|&i| !used[i] && slot.accepts(candidates[i].position))
            .collect();
        // Stable sort: ties stay in input order.
        eligible.sort_by(|&a, &b| {
            score_key(candidates[b].score)
                .partial_cmp(&score_key(candidates[a].score))
                .unwrap_or(Ordering::Equal)
        });
        for index in eligible.into_iter().take(wanted) {
            used[index] = true;
            lineup.total += candidates[index].score;
            lineup.starters.push(Starter { index, slot });
        }
    }

    lineup
}

/// Total score of the optimal best-ball lineup.
pub fn pick_best_ball(candidates: &[Candidate], slots: &HashMap<String, usize>) -> f64 {
    optimize_lineup(candidates, slots).total
}
