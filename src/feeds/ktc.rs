// Market-value and receiver-metric feeds.
//
// Dynasty market values are scraped from a JSON array embedded in a page's
// inline script. The page layout is outside our control, so a missing or
// reshaped blob degrades to an empty table with a warning.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::feeds::{get_json, get_text, FeedError};
use crate::names::normalize;
use crate::valuation::power::MarketValue;

/// Marker preceding the embedded player array.
const PLAYERS_ARRAY_MARKER: &str = "playersArray";

/// Source of market values and optional receiver metrics.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Market values, best first. Empty when the source is unusable.
    async fn market_values(&self) -> Result<Vec<MarketValue>, FeedError>;

    /// Receiver tracking "overall" scores keyed by normalized name.
    async fn rtm_overall(&self) -> Result<HashMap<String, f64>, FeedError> {
        Ok(HashMap::new())
    }
}

#[derive(Debug, Deserialize)]
struct ValueBlock {
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKtcPlayer {
    player_name: String,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    superflex_values: Option<ValueBlock>,
    #[serde(default, rename = "oneQBValues")]
    one_qb_values: Option<ValueBlock>,
}

#[derive(Debug, Deserialize)]
struct RawRtm {
    name: String,
    #[serde(default)]
    overall: Option<f64>,
}

/// Slice out the JSON array assigned to `playersArray` in `html`.
///
/// Brackets inside string literals are ignored while scanning for the
/// closing `]`.
fn extract_array(html: &str) -> Option<&str> {
    let marker = html.find(PLAYERS_ARRAY_MARKER)?;
    let after = &html[marker + PLAYERS_ARRAY_MARKER.len()..];
    let eq = after.find('=')?;
    let rest = &after[eq + 1..];
    let start = rest.find('[')?;
    if !rest[..start].trim().is_empty() {
        return None;
    }
    let body = &rest[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse market values out of a rankings page. Superflex values are
/// preferred, one-QB values are the fallback. Entries with neither are
/// skipped.
pub fn parse_market_page(html: &str, url: &str) -> Result<Vec<MarketValue>, FeedError> {
    let array = extract_array(html).ok_or_else(|| FeedError::Shape {
        url: url.to_string(),
        what: "playersArray not found".to_string(),
    })?;
    let raw: Vec<RawKtcPlayer> = serde_json::from_str(array).map_err(|e| FeedError::Shape {
        url: url.to_string(),
        what: format!("playersArray did not decode: {e}"),
    })?;

    let mut values: Vec<MarketValue> = raw
        .into_iter()
        .filter_map(|p| {
            let value = p
                .superflex_values
                .and_then(|v| v.value)
                .or_else(|| p.one_qb_values.and_then(|v| v.value))?;
            Some(MarketValue {
                name: p.player_name.trim().to_string(),
                position: p.position,
                value,
            })
        })
        .collect();
    values.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
    Ok(values)
}

/// HTTP client for the market-value page and optional RTM table.
pub struct KtcClient {
    client: reqwest::Client,
    url: String,
    rtm_url: Option<String>,
}

impl KtcClient {
    pub fn new(client: reqwest::Client, url: &str, rtm_url: Option<&str>) -> Self {
        Self {
            client,
            url: url.to_string(),
            rtm_url: rtm_url.filter(|u| !u.trim().is_empty()).map(str::to_string),
        }
    }
}

#[async_trait]
impl MarketData for KtcClient {
    async fn market_values(&self) -> Result<Vec<MarketValue>, FeedError> {
        let html = get_text(&self.client, &self.url).await?;
        match parse_market_page(&html, &self.url) {
            Ok(values) => {
                info!("Loaded {} market values from {}", values.len(), self.url);
                Ok(values)
            }
            Err(e @ FeedError::Shape { .. }) => {
                warn!("{}; continuing without market values", e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn rtm_overall(&self) -> Result<HashMap<String, f64>, FeedError> {
        let Some(url) = &self.rtm_url else {
            return Ok(HashMap::new());
        };
        let rows: Vec<RawRtm> = get_json(&self.client, url).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Some((normalize(&r.name), r.overall?)))
            .collect())
    }
}
