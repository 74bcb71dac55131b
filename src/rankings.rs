// User ranking sheet: parsing, taken-flag merge and manual toggles.
//
// The ranking set is the user's source of truth. Automated reconciliation
// only ever proposes taken flags; rows the user has toggled by hand keep
// whatever the user chose.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::names::{normalize, AliasMap};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One entry in the user's ranking sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    pub name: String,
    /// Sort key; numeric in most sheets but kept as written.
    pub tier: String,
    pub position: String,
    pub asset_type: Option<String>,
    pub taken: bool,
    /// Set once the user flips `taken` by hand. Never cleared by
    /// reconciliation.
    #[serde(default)]
    pub manual_override: bool,
    pub normalized_name: String,
}

impl RankingRow {
    pub fn new(name: &str, tier: &str, position: &str, asset_type: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            tier: tier.to_string(),
            position: position.to_string(),
            asset_type: asset_type.map(str::to_string),
            taken: false,
            manual_override: false,
            normalized_name: normalize(name),
        }
    }

    /// Explicit user toggle. Pins the row against automated updates.
    pub fn toggle_taken(&mut self) {
        self.taken = !self.taken;
        self.manual_override = true;
    }

    /// Numeric tier when the sheet uses numbers.
    pub fn tier_value(&self) -> Option<f64> {
        self.tier.trim().parse().ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("failed to read rankings file {source_name}: {source}")]
    Io {
        source_name: String,
        source: std::io::Error,
    },

    #[error("rankings file {source_name} is missing required column(s): {}", missing.join(", "))]
    MissingColumns {
        source_name: String,
        missing: Vec<String>,
    },

    #[error("CSV error in {source_name}: {source}")]
    Csv {
        source_name: String,
        source: csv::Error,
    },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Column positions resolved from the header row.
struct Columns {
    name: usize,
    tier: usize,
    position: usize,
    asset_type: Option<usize>,
}

fn find_column(headers: &csv::StringRecord, accepted: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim();
        accepted.iter().any(|a| h.eq_ignore_ascii_case(a))
    })
}

fn resolve_columns(headers: &csv::StringRecord, source_name: &str) -> Result<Columns, RankingError> {
    let name = find_column(headers, &["name"]);
    let tier = find_column(headers, &["tier"]);
    let position = find_column(headers, &["pos", "position"]);
    let asset_type = find_column(headers, &["assetType", "asset_type"]);

    match (name, tier, position) {
        (Some(name), Some(tier), Some(position)) => Ok(Columns {
            name,
            tier,
            position,
            asset_type,
        }),
        _ => {
            let missing = [(name, "name"), (tier, "tier"), (position, "pos")]
                .into_iter()
                .filter(|(idx, _)| idx.is_none())
                .map(|(_, label)| label.to_string())
                .collect();
            Err(RankingError::MissingColumns {
                source_name: source_name.to_string(),
                missing,
            })
        }
    }
}

/// Parse a ranking sheet from any reader.
///
/// Headers are matched case-insensitively. All required columns are checked
/// before any row is read. Rows with an empty name are dropped; rows the CSV
/// reader cannot decode are skipped with a warning.
pub fn parse_rankings<R: Read>(rdr: R, source_name: &str) -> Result<Vec<RankingRow>, RankingError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let headers = reader
        .headers()
        .map_err(|e| RankingError::Csv {
            source_name: source_name.to_string(),
            source: e,
        })?
        .clone();
    let cols = resolve_columns(&headers, source_name)?;

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed ranking row {} in {}: {}", line + 2, source_name, e);
                continue;
            }
        };
        let name = record.get(cols.name).unwrap_or("").trim();
        if name.is_empty() {
            debug!("dropping ranking row {} in {}: empty name", line + 2, source_name);
            continue;
        }
        let asset_type = cols
            .asset_type
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        rows.push(RankingRow::new(
            name,
            record.get(cols.tier).unwrap_or("").trim(),
            record.get(cols.position).unwrap_or("").trim(),
            asset_type,
        ));
    }
    Ok(rows)
}

/// Load a ranking sheet from disk.
pub fn load_rankings(path: &Path) -> Result<Vec<RankingRow>, RankingError> {
    let source_name = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| RankingError::Io {
        source_name: source_name.clone(),
        source: e,
    })?;
    parse_rankings(file, &source_name)
}

// ---------------------------------------------------------------------------
// Taken-flag merge
// ---------------------------------------------------------------------------

/// Proposed replacement for `rows` given the current taken-name set.
///
/// Rows with `manual_override` are copied through unchanged.
pub fn apply_taken(rows: &[RankingRow], taken: &HashSet<String>) -> Vec<RankingRow> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            if !row.manual_override {
                row.taken = taken.contains(&row.normalized_name);
            }
            row
        })
        .collect()
}

/// Rewrite each row's matching key through `aliases` so sheet names land on
/// the same keys as reconciled picks.
pub fn apply_aliases(rows: &mut [RankingRow], aliases: &AliasMap) {
    for row in rows {
        row.normalized_name = aliases.apply(&normalize(&row.name));
    }
}

/// Clear every taken flag and manual override for a new draft session.
pub fn reset_taken(rows: &mut [RankingRow]) {
    for row in rows {
        row.taken = false;
        row.manual_override = false;
    }
}

/// Stable sort by tier: numeric tiers ascending, then non-numeric tiers
/// in lexical order.
pub fn sort_by_tier(rows: &mut [RankingRow]) {
    rows.sort_by(|a, b| match (a.tier_value(), b.tier_value()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.tier.cmp(&b.tier),
    });
}
