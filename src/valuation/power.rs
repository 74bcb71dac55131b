// Dynasty power rankings from market values.
//
// Market values are keyed by name, so each rostered player is matched by
// progressively looser keys before the lineup optimizer runs on value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::names::{normalize, simplify, AliasMap};
use crate::valuation::best_ball::{PlayerMeta, RosterInput};
use crate::valuation::position::{optimize_lineup, Candidate, Position};
use crate::valuation::round_to;

/// One entry of the external market-value table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketValue {
    pub name: String,
    pub position: Option<String>,
    pub value: f64,
}

/// Name-keyed lookup over a market-value table.
#[derive(Debug, Clone, Default)]
pub struct MarketIndex {
    by_simple: HashMap<String, usize>,
    by_normalized: HashMap<String, usize>,
    values: Vec<MarketValue>,
}

impl MarketIndex {
    /// Index `values`. On duplicate keys the first entry wins.
    pub fn new(values: Vec<MarketValue>) -> Self {
        let mut by_simple = HashMap::new();
        let mut by_normalized = HashMap::new();
        for (i, v) in values.iter().enumerate() {
            by_simple.entry(simplify(&v.name)).or_insert(i);
            by_normalized.entry(normalize(&v.name)).or_insert(i);
        }
        Self {
            by_simple,
            by_normalized,
            values,
        }
    }

    /// Look up by exact simplified name, then suffix-stripped name, then the
    /// aliased suffix-stripped name.
    pub fn find(&self, name: &str, aliases: &AliasMap) -> Option<&MarketValue> {
        let normalized = normalize(name);
        self.by_simple
            .get(&simplify(name))
            .or_else(|| self.by_normalized.get(&normalized))
            .or_else(|| self.by_normalized.get(&aliases.apply(&normalized)))
            .map(|&i| &self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerRow {
    pub rank: usize,
    pub roster_id: u32,
    pub team_name: String,
    pub owner_id: Option<String>,
    pub total_value: f64,
    pub qb_value: f64,
    pub rb_value: f64,
    pub wr_value: f64,
    pub te_value: f64,
    pub matched: usize,
    pub unmatched: usize,
}

/// Rank rosters by the value of their optimal lineup.
pub fn power_rankings(
    rosters: &[RosterInput],
    players: &HashMap<String, PlayerMeta>,
    market: &MarketIndex,
    aliases: &AliasMap,
    slots: &HashMap<String, usize>,
) -> Vec<PowerRow> {
    let mut rows: Vec<PowerRow> = rosters
        .iter()
        .map(|roster| {
            let mut candidates = Vec::new();
            let mut unmatched = 0;
            for id in &roster.players {
                let Some(meta) = players.get(id) else {
                    unmatched += 1;
                    continue;
                };
                let Some(mv) = market.find(&meta.name, aliases) else {
                    unmatched += 1;
                    continue;
                };
                let position = meta
                    .position
                    .or_else(|| mv.position.as_deref().and_then(Position::from_str_pos));
                match position {
                    Some(position) => candidates.push(Candidate {
                        position,
                        score: mv.value,
                    }),
                    None => unmatched += 1,
                }
            }

            let lineup = optimize_lineup(&candidates, slots);
            let at = |pos| round_to(lineup.total_at(&candidates, pos), 2);
            PowerRow {
                rank: 0,
                roster_id: roster.roster_id,
                team_name: roster.team_name.clone(),
                owner_id: roster.owner_id.clone(),
                total_value: round_to(lineup.total, 2),
                qb_value: at(Position::QB),
                rb_value: at(Position::RB),
                wr_value: at(Position::WR),
                te_value: at(Position::TE),
                matched: candidates.len(),
                unmatched,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_value
            .partial_cmp(&a.total_value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.roster_id.cmp(&b.roster_id))
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::position::count_slots;

    fn mv(name: &str, pos: &str, value: f64) -> MarketValue {
        MarketValue {
            name: name.into(),
            position: Some(pos.into()),
            value,
        }
    }

    fn meta(name: &str, pos: Position) -> PlayerMeta {
        PlayerMeta {
            name: name.into(),
            position: Some(pos),
            team: None,
            injury_status: None,
            active: true,
        }
    }

    #[test]
    fn matching_falls_back_through_keys() {
        let index = MarketIndex::new(vec![
            mv("Kenneth Walker III", "RB", 5000.0),
            mv("Marvin Harrison Jr.", "WR", 7000.0),
            mv("Gabriel Davis", "WR", 900.0),
        ]);
        let aliases = AliasMap::builtin();
        assert_eq!(index.find("Kenneth Walker III", &aliases).unwrap().value, 5000.0);
        assert_eq!(index.find("Marvin Harrison", &aliases).unwrap().value, 7000.0);
        assert_eq!(index.find("Gabe Davis", &aliases).unwrap().value, 900.0);
        assert!(index.find("Nobody Here", &aliases).is_none());
    }

    #[test]
    fn first_duplicate_wins() {
        let index = MarketIndex::new(vec![mv("Josh Allen", "QB", 9000.0), mv("Josh Allen", "LB", 10.0)]);
        assert_eq!(index.find("Josh Allen", &AliasMap::default()).unwrap().value, 9000.0);
    }

    #[test]
    fn rosters_ranked_by_lineup_value() {
        let mut players = HashMap::new();
        players.insert("1".to_string(), meta("Josh Allen", Position::QB));
        players.insert("2".to_string(), meta("Ja'Marr Chase", Position::WR));
        players.insert("3".to_string(), meta("Brock Bowers", Position::TE));
        players.insert("4".to_string(), meta("Bijan Robinson", Position::RB));
        players.insert("5".to_string(), meta("Unknown Guy", Position::WR));

        let market = MarketIndex::new(vec![
            mv("Josh Allen", "QB", 8000.0),
            mv("JaMarr Chase", "WR", 9500.0),
            mv("Brock Bowers", "TE", 7000.0),
            mv("Bijan Robinson", "RB", 9800.0),
        ]);
        let rosters = vec![
            RosterInput {
                roster_id: 1,
                owner_id: None,
                team_name: "A".into(),
                players: vec!["1".into(), "3".into(), "5".into()],
            },
            RosterInput {
                roster_id: 2,
                owner_id: None,
                team_name: "B".into(),
                players: vec!["2".into(), "4".into(), "999".into()],
            },
        ];
        let slots = count_slots(&["QB", "RB", "WR", "TE", "FLEX"]);
        let rows = power_rankings(&rosters, &players, &market, &AliasMap::builtin(), &slots);

        assert_eq!(rows[0].roster_id, 2);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].total_value, 19300.0);
        assert_eq!(rows[0].wr_value, 9500.0);
        assert_eq!(rows[0].rb_value, 9800.0);
        assert_eq!(rows[0].matched, 2);
        assert_eq!(rows[0].unmatched, 1);

        assert_eq!(rows[1].total_value, 15000.0);
        assert_eq!(rows[1].qb_value, 8000.0);
        assert_eq!(rows[1].te_value, 7000.0);
        assert_eq!(rows[1].unmatched, 1);
    }
}
