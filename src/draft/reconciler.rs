// Draft feed poller and snapshot reconciliation.
//
// Every cycle fetches the full pick list, rebuilds the taken-name set and the
// ordered pick list from scratch, and reports both over a channel. Nothing
// carries over between cycles except the timer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::draft::pick::{pick_display, rookie_pick_name, DraftPick, FeedPick};
use crate::feeds::FeedError;
use crate::names::{normalize, AliasMap};

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Source of draft pick snapshots.
#[async_trait]
pub trait DraftFeed: Send + Sync {
    async fn fetch_picks(&self, draft_id: &str) -> Result<Vec<FeedPick>, FeedError>;
}

/// Parameters supplied when entering the polling state.
#[derive(Debug, Clone, PartialEq)]
pub struct PollParams {
    pub draft_id: String,
    pub interval: Duration,
    /// Treat kicker picks as placeholders for rookie draft picks.
    pub rookie_pick_mode: bool,
    pub league_size: u32,
    /// Year used in synthesized rookie pick names.
    pub rookie_year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerState {
    Idle,
    Polling(PollParams),
    Stopped,
}

/// Messages sent to the session controller. `generation` identifies the
/// `start` call that produced the event.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftEvent {
    TakenUpdate {
        generation: u64,
        taken: HashSet<String>,
    },
    PicksUpdate {
        generation: u64,
        picks: Vec<DraftPick>,
    },
    Synced {
        generation: u64,
        pick_count: usize,
    },
    Error {
        generation: u64,
        message: String,
    },
}

impl DraftEvent {
    pub fn generation(&self) -> u64 {
        match self {
            DraftEvent::TakenUpdate { generation, .. }
            | DraftEvent::PicksUpdate { generation, .. }
            | DraftEvent::Synced { generation, .. }
            | DraftEvent::Error { generation, .. } => *generation,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot reconciliation
// ---------------------------------------------------------------------------

/// Result of reconciling one full feed snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub taken: HashSet<String>,
    pub picks: Vec<DraftPick>,
}

/// Rebuild the taken set and ordered pick list from a full snapshot.
///
/// Picks are sorted by `pick_no` first. In rookie-pick mode each kicker is
/// replaced by the next sequential rookie pick name, so the result depends
/// on every earlier pick being present.
pub fn reconcile_snapshot(mut feed: Vec<FeedPick>, params: &PollParams, aliases: &AliasMap) -> Snapshot {
    feed.sort_by_key(|p| p.pick_no);

    let mut snapshot = Snapshot::default();
    let mut kickers_seen = 0u32;

    for pick in &feed {
        let position = pick.position();
        let name = if params.rookie_pick_mode && position == "K" {
            kickers_seen += 1;
            let synthesized = rookie_pick_name(params.rookie_year, kickers_seen, params.league_size);
            snapshot.taken.insert(normalize(&synthesized));
            Some(synthesized)
        } else {
            match pick.player_name() {
                Some(name) => {
                    snapshot.taken.insert(aliases.canonical(&name));
                    Some(name)
                }
                None => {
                    debug!("pick {} has no player name", pick.pick_no);
                    pick.player_id.clone().filter(|id| !id.trim().is_empty())
                }
            }
        };

        let Some(player_name) = name else {
            continue;
        };
        snapshot.picks.push(DraftPick {
            pick_no: pick.pick_no,
            pick_display: pick_display(pick.pick_no, params.league_size),
            player_name,
            position,
            team: pick.team(),
            picked_by: pick.picked_by.clone().unwrap_or_default(),
            is_my_pick: false,
        });
    }
    snapshot
}

/// Fetch and reconcile one snapshot, producing the events for this cycle.
pub async fn poll_once(
    feed: &dyn DraftFeed,
    params: &PollParams,
    aliases: &AliasMap,
    generation: u64,
) -> Vec<DraftEvent> {
    match feed.fetch_picks(&params.draft_id).await {
        Ok(picks) => {
            let snapshot = reconcile_snapshot(picks, params, aliases);
            let pick_count = snapshot.picks.len();
            debug!(
                "draft {}: {} picks, {} taken names",
                params.draft_id,
                pick_count,
                snapshot.taken.len()
            );
            vec![
                DraftEvent::TakenUpdate {
                    generation,
                    taken: snapshot.taken,
                },
                DraftEvent::PicksUpdate {
                    generation,
                    picks: snapshot.picks,
                },
                DraftEvent::Synced {
                    generation,
                    pick_count,
                },
            ]
        }
        Err(e) => {
            warn!("draft poll failed: {}", e);
            vec![DraftEvent::Error {
                generation,
                message: e.to_string(),
            }]
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Owns the polling task. At most one task runs per reconciler.
pub struct DraftReconciler {
    feed: Arc<dyn DraftFeed>,
    aliases: Arc<AliasMap>,
    state: ReconcilerState,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl DraftReconciler {
    pub fn new(feed: Arc<dyn DraftFeed>, aliases: Arc<AliasMap>) -> Self {
        Self {
            feed,
            aliases,
            state: ReconcilerState::Idle,
            task: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    /// Generation of the most recent `start`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.state, ReconcilerState::Polling(_))
    }

    /// Enter the polling state. Any previous task is cancelled first. The
    /// first fetch happens immediately, then once per interval; ticks that
    /// come due while a fetch is still running are skipped.
    ///
    /// Returns the generation stamped on this task's events.
    pub fn start(&mut self, params: PollParams, tx: mpsc::Sender<DraftEvent>) -> u64 {
        self.cancel_task();
        self.generation += 1;
        let generation = self.generation;

        info!(
            "Polling draft {} every {:?} (rookie pick mode: {}, gen: {})",
            params.draft_id, params.interval, params.rookie_pick_mode, generation
        );

        let feed = Arc::clone(&self.feed);
        let aliases = Arc::clone(&self.aliases);
        let task_params = params.clone();
        self.task = Some(tokio::spawn(async move {
            poll_loop(feed, aliases, task_params, tx, generation).await;
        }));
        self.state = ReconcilerState::Polling(params);
        generation
    }

    /// Leave the polling state. A no-op unless currently polling.
    pub fn stop(&mut self) {
        if !self.is_polling() {
            return;
        }
        self.cancel_task();
        self.state = ReconcilerState::Stopped;
        info!("Stopped draft polling (gen: {})", self.generation);
    }

    fn cancel_task(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

impl Drop for DraftReconciler {
    fn drop(&mut self) {
        self.cancel_task();
    }
}

async fn poll_loop(
    feed: Arc<dyn DraftFeed>,
    aliases: Arc<AliasMap>,
    params: PollParams,
    tx: mpsc::Sender<DraftEvent>,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(params.interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // The first tick completes immediately.
        ticker.tick().await;
        for event in poll_once(feed.as_ref(), &params, &aliases, generation).await {
            if tx.send(event).await.is_err() {
                debug!("draft event receiver dropped; ending poll task");
                return;
            }
        }
    }
}
