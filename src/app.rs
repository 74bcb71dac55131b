// Session state and orchestration logic.
//
// The central event loop that owns the user's ranking sheet. It consumes
// draft reconciler events and user commands, merges taken flags into the
// sheet, and pushes UI updates to whatever front end is attached.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::draft::pick::{mark_my_picks, DraftPick};
use crate::draft::reconciler::{DraftEvent, DraftReconciler, PollParams};
use crate::names::AliasMap;
use crate::rankings::{self, RankingRow};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Actions requested by the user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Flip the taken flag of the row at `index` and pin it.
    ToggleTaken { index: usize },
    /// Clear every taken flag and pin for a new draft session.
    ResetTaken,
    /// Replace the ranking sheet with the file at `path`.
    LoadRankings { path: PathBuf },
    /// Switch to a sheet previously saved under `name`.
    OpenSavedRankings { name: String },
    StartPolling(PollParams),
    StopPolling,
    SetMyUserIds(HashSet<String>),
    Quit,
}

/// Updates pushed to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Rankings(Vec<RankingRow>),
    Picks(Vec<DraftPick>),
    Synced {
        pick_count: usize,
        at: DateTime<Utc>,
    },
    /// A poll cycle failed; previous state is still shown.
    PollError(String),
    /// A ranking sheet could not be loaded; the previous sheet is kept.
    LoadFailed(String),
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The complete session state.
pub struct SessionState {
    pub db: Arc<Database>,
    pub aliases: Arc<AliasMap>,
    pub rankings: Vec<RankingRow>,
    /// Name the current sheet is saved under, if any.
    pub rankings_name: Option<String>,
    pub picks: Vec<DraftPick>,
    /// Taken names from the most recent successful poll.
    pub last_taken: HashSet<String>,
    pub my_user_ids: HashSet<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub reconciler: DraftReconciler,
    /// Sender handed to every poll task; the receiving end is `run`'s
    /// `draft_rx`.
    pub draft_tx: mpsc::Sender<DraftEvent>,
}

impl SessionState {
    pub fn new(
        db: Arc<Database>,
        aliases: Arc<AliasMap>,
        reconciler: DraftReconciler,
        draft_tx: mpsc::Sender<DraftEvent>,
    ) -> Self {
        Self {
            db,
            aliases,
            rankings: Vec::new(),
            rankings_name: None,
            picks: Vec::new(),
            last_taken: HashSet::new(),
            my_user_ids: HashSet::new(),
            last_sync: None,
            reconciler,
            draft_tx,
        }
    }

    /// Enter polling with a fresh generation. Events from earlier tasks are
    /// ignored from here on.
    pub fn start_polling(&mut self, params: PollParams) -> u64 {
        self.reconciler.start(params, self.draft_tx.clone())
    }

    pub fn stop_polling(&mut self) {
        self.reconciler.stop();
    }

    /// Whether `event` belongs to the running poll task.
    fn is_current(&self, event: &DraftEvent) -> bool {
        self.reconciler.is_polling() && event.generation() == self.reconciler.generation()
    }

    /// Merge a taken-name set into the sheet. Returns whether any row changed.
    pub fn apply_taken(&mut self, taken: HashSet<String>) -> bool {
        let merged = rankings::apply_taken(&self.rankings, &taken);
        let changed = merged != self.rankings;
        self.rankings = merged;
        self.last_taken = taken;
        if changed {
            self.persist_rankings();
        }
        changed
    }

    pub fn set_picks(&mut self, mut picks: Vec<DraftPick>) {
        mark_my_picks(&mut picks, &self.my_user_ids);
        self.picks = picks;
    }

    /// Flip one row by hand. Returns false for an out-of-range index.
    pub fn toggle_taken(&mut self, index: usize) -> bool {
        let Some(row) = self.rankings.get_mut(index) else {
            warn!("toggle ignored: no ranking row at index {}", index);
            return false;
        };
        row.toggle_taken();
        info!("{} marked {} by hand", row.name, if row.taken { "taken" } else { "available" });
        self.persist_rankings();
        true
    }

    pub fn reset_taken(&mut self) {
        rankings::reset_taken(&mut self.rankings);
        self.last_taken.clear();
        self.persist_rankings();
        info!("Taken flags reset for {} rows", self.rankings.len());
    }

    /// Replace the sheet with one parsed from `path`. The previous sheet
    /// stays in place when parsing fails.
    pub fn load_rankings_file(&mut self, path: &Path) -> Result<usize, rankings::RankingError> {
        let mut rows = rankings::load_rankings(path)?;
        rankings::apply_aliases(&mut rows, &self.aliases);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rankings".to_string());
        self.install_rankings(name, rows);
        Ok(self.rankings.len())
    }

    /// Switch to a saved sheet. Returns false when no sheet has that name.
    pub fn open_saved_rankings(&mut self, name: &str) -> anyhow::Result<bool> {
        match self.db.load_rankings(name)? {
            Some(rows) => {
                self.rankings = rows;
                self.rankings_name = Some(name.to_string());
                self.db.set_active_rankings(name)?;
                info!("Opened saved rankings {} ({} rows)", name, self.rankings.len());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn install_rankings(&mut self, name: String, rows: Vec<RankingRow>) {
        self.rankings = rankings::apply_taken(&rows, &self.last_taken);
        info!("Loaded {} ranking rows as {}", self.rankings.len(), name);
        if let Err(e) = self.db.set_active_rankings(&name) {
            warn!("failed to record active rankings: {:#}", e);
        }
        self.rankings_name = Some(name);
        self.persist_rankings();
    }

    pub fn set_my_user_ids(&mut self, ids: HashSet<String>) {
        if let Err(e) = self.db.set_my_user_ids(&ids) {
            warn!("failed to persist user ids: {:#}", e);
        }
        self.my_user_ids = ids;
        mark_my_picks(&mut self.picks, &self.my_user_ids);
    }

    fn persist_rankings(&self) {
        let Some(name) = &self.rankings_name else {
            return;
        };
        if let Err(e) = self.db.save_rankings(name, &self.rankings) {
            warn!("failed to save rankings {}: {:#}", name, e);
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the session event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. Draft reconciler events
/// 2. User commands
///
/// Pushes UI updates through `ui_tx`.
pub async fn run(
    mut draft_rx: mpsc::Receiver<DraftEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: SessionState,
) -> anyhow::Result<()> {
    info!("Session event loop started");

    loop {
        tokio::select! {
            // --- Draft events ---
            // `state.draft_tx` keeps this channel open for the life of the
            // loop.
            Some(event) = draft_rx.recv() => {
                handle_draft_event(&mut state, event, &ui_tx).await;
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        handle_user_command(&mut state, cmd, &ui_tx).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    state.stop_polling();
    info!("Session event loop exiting");
    Ok(())
}

async fn handle_draft_event(state: &mut SessionState, event: DraftEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    if !state.is_current(&event) {
        debug!(
            "discarding draft event from generation {} (current {})",
            event.generation(),
            state.reconciler.generation()
        );
        return;
    }

    match event {
        DraftEvent::TakenUpdate { taken, .. } => {
            if state.apply_taken(taken) {
                let _ = ui_tx.send(UiUpdate::Rankings(state.rankings.clone())).await;
            }
        }
        DraftEvent::PicksUpdate { picks, .. } => {
            state.set_picks(picks);
            let _ = ui_tx.send(UiUpdate::Picks(state.picks.clone())).await;
        }
        DraftEvent::Synced { pick_count, .. } => {
            let at = Utc::now();
            state.last_sync = Some(at);
            debug!("draft synced: {} picks", pick_count);
            let _ = ui_tx.send(UiUpdate::Synced { pick_count, at }).await;
        }
        DraftEvent::Error { message, .. } => {
            warn!("draft poll error: {}", message);
            let _ = ui_tx.send(UiUpdate::PollError(message)).await;
        }
    }
}

async fn handle_user_command(state: &mut SessionState, cmd: UserCommand, ui_tx: &mpsc::Sender<UiUpdate>) {
    match cmd {
        UserCommand::ToggleTaken { index } => {
            if state.toggle_taken(index) {
                let _ = ui_tx.send(UiUpdate::Rankings(state.rankings.clone())).await;
            }
        }
        UserCommand::ResetTaken => {
            state.reset_taken();
            let _ = ui_tx.send(UiUpdate::Rankings(state.rankings.clone())).await;
        }
        UserCommand::LoadRankings { path } => match state.load_rankings_file(&path) {
            Ok(_) => {
                let _ = ui_tx.send(UiUpdate::Rankings(state.rankings.clone())).await;
            }
            Err(e) => {
                warn!("{}", e);
                let _ = ui_tx.send(UiUpdate::LoadFailed(e.to_string())).await;
            }
        },
        UserCommand::OpenSavedRankings { name } => match state.open_saved_rankings(&name) {
            Ok(true) => {
                let _ = ui_tx.send(UiUpdate::Rankings(state.rankings.clone())).await;
            }
            Ok(false) => {
                let _ = ui_tx
                    .send(UiUpdate::LoadFailed(format!("no saved rankings named {name}")))
                    .await;
            }
            Err(e) => {
                warn!("failed to open saved rankings {}: {:#}", name, e);
                let _ = ui_tx.send(UiUpdate::LoadFailed(format!("{e:#}"))).await;
            }
        },
        UserCommand::StartPolling(params) => {
            state.start_polling(params);
        }
        UserCommand::StopPolling => {
            state.stop_polling();
        }
        UserCommand::SetMyUserIds(ids) => {
            state.set_my_user_ids(ids);
            let _ = ui_tx.send(UiUpdate::Picks(state.picks.clone())).await;
        }
        UserCommand::Quit => {
            // Handled in the main loop
        }
    }
}

// ---------------------------------------------------------------------------
// Session restore
// ---------------------------------------------------------------------------

/// Restore the user's ids and last active ranking sheet from the store.
/// Returns whether a sheet was restored.
pub fn recover_from_db(state: &mut SessionState) -> anyhow::Result<bool> {
    state.my_user_ids = state.db.my_user_ids()?;

    let Some(name) = state.db.active_rankings()? else {
        info!("No saved rankings, starting fresh");
        return Ok(false);
    };
    let restored = state.open_saved_rankings(&name)?;
    if !restored {
        warn!("Active rankings {} missing from the store", name);
    }
    Ok(restored)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::pick::{FeedPick, PickMetadata};
    use crate::draft::reconciler::DraftFeed;
    use crate::feeds::FeedError;
    use async_trait::async_trait;
    use std::io::Write;
    use std::time::Duration;

    struct StaticFeed(Vec<FeedPick>);

    #[async_trait]
    impl DraftFeed for StaticFeed {
        async fn fetch_picks(&self, _draft_id: &str) -> Result<Vec<FeedPick>, FeedError> {
            Ok(self.0.clone())
        }
    }

    fn feed_pick(pick_no: u32, name: &str, by: &str) -> FeedPick {
        let (first, last) = name.split_once(' ').unwrap();
        FeedPick {
            pick_no,
            player_id: None,
            picked_by: Some(by.into()),
            metadata: PickMetadata {
                first_name: Some(first.into()),
                last_name: Some(last.into()),
                position: Some("RB".into()),
                ..Default::default()
            },
        }
    }

    fn params() -> PollParams {
        PollParams {
            draft_id: "d1".into(),
            interval: Duration::from_secs(5),
            rookie_pick_mode: false,
            league_size: 12,
            rookie_year: 2026,
        }
    }

    fn create_test_state(feed: Vec<FeedPick>) -> (SessionState, mpsc::Receiver<DraftEvent>) {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let aliases = Arc::new(AliasMap::builtin());
        let reconciler = DraftReconciler::new(Arc::new(StaticFeed(feed)), aliases.clone());
        let (draft_tx, draft_rx) = mpsc::channel(64);
        let mut state = SessionState::new(db, aliases, reconciler, draft_tx);
        state.rankings = vec![
            RankingRow::new("Bijan Robinson", "1", "RB", None),
            RankingRow::new("Puka Nacua", "2", "WR", None),
            RankingRow::new("Gabriel Davis", "9", "WR", None),
        ];
        (state, draft_rx)
    }

    fn write_csv(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("dyn_app_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn taken(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn apply_taken_respects_manual_override() {
        let (mut state, _rx) = create_test_state(vec![]);
        state.toggle_taken(1);
        assert!(state.rankings[1].taken);

        assert!(state.apply_taken(taken(&["bijan robinson"])));
        assert!(state.rankings[0].taken);
        // Pinned row keeps the user's choice even though the feed omits it.
        assert!(state.rankings[1].taken);
        // Same set again changes nothing.
        assert!(!state.apply_taken(taken(&["bijan robinson"])));
    }

    #[test]
    fn toggle_out_of_range_is_ignored() {
        let (mut state, _rx) = create_test_state(vec![]);
        assert!(!state.toggle_taken(99));
    }

    #[test]
    fn reset_clears_flags_and_pins() {
        let (mut state, _rx) = create_test_state(vec![]);
        state.toggle_taken(0);
        state.apply_taken(taken(&["puka nacua"]));
        state.reset_taken();
        assert!(state.rankings.iter().all(|r| !r.taken && !r.manual_override));
        assert!(state.last_taken.is_empty());
    }

    #[test]
    fn loading_rankings_reapplies_last_taken_and_persists() {
        let (mut state, _rx) = create_test_state(vec![]);
        state.apply_taken(taken(&["gabriel davis"]));

        let path = write_csv("superflex.csv", "name,tier,pos\nGabe Davis,9,WR\nPuka Nacua,2,WR\n");
        assert_eq!(state.load_rankings_file(&path).unwrap(), 2);
        // Alias maps the sheet name onto the feed key.
        assert!(state.rankings[0].taken);
        assert!(!state.rankings[1].taken);
        assert_eq!(state.rankings_name.as_deref(), Some("superflex"));
        assert_eq!(state.db.active_rankings().unwrap().as_deref(), Some("superflex"));
        assert_eq!(state.db.load_rankings("superflex").unwrap().unwrap(), state.rankings);
    }

    #[test]
    fn failed_load_keeps_previous_sheet() {
        let (mut state, _rx) = create_test_state(vec![]);
        let path = write_csv("broken.csv", "player,rank\nBijan Robinson,1\n");
        let err = state.load_rankings_file(&path).unwrap_err();
        assert!(matches!(err, rankings::RankingError::MissingColumns { .. }));
        assert_eq!(state.rankings.len(), 3);
    }

    #[test]
    fn recover_restores_ids_and_sheet() {
        let (mut state, _rx) = create_test_state(vec![]);
        let mut row = RankingRow::new("Bijan Robinson", "1", "RB", None);
        row.toggle_taken();
        state.db.save_rankings("saved", &[row.clone()]).unwrap();
        state.db.set_active_rankings("saved").unwrap();
        state.db.set_my_user_ids(&taken(&["u1"])).unwrap();

        assert!(recover_from_db(&mut state).unwrap());
        assert_eq!(state.rankings, vec![row]);
        assert!(state.my_user_ids.contains("u1"));
    }

    #[test]
    fn recover_without_saved_sheet() {
        let (mut state, _rx) = create_test_state(vec![]);
        assert!(!recover_from_db(&mut state).unwrap());
        assert_eq!(state.rankings.len(), 3);
    }

    #[tokio::test]
    async fn event_loop_handles_quit_command() {
        let (state, draft_rx) = create_test_state(vec![]);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, _ui_rx) = mpsc::channel(64);

        let handle = tokio::spawn(run(draft_rx, cmd_rx, ui_tx, state));
        cmd_tx.send(UserCommand::Quit).await.unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn event_loop_merges_polled_picks() {
        let feed = vec![
            feed_pick(1, "Bijan Robinson", "u1"),
            feed_pick(2, "Gabe Davis", "u2"),
        ];
        let (state, draft_rx) = create_test_state(feed);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        let handle = tokio::spawn(run(draft_rx, cmd_rx, ui_tx, state));

        cmd_tx.send(UserCommand::SetMyUserIds(taken(&["u2"]))).await.unwrap();
        assert!(matches!(ui_rx.recv().await.unwrap(), UiUpdate::Picks(p) if p.is_empty()));

        cmd_tx.send(UserCommand::StartPolling(params())).await.unwrap();

        match ui_rx.recv().await.unwrap() {
            UiUpdate::Rankings(rows) => {
                assert!(rows[0].taken);
                assert!(!rows[1].taken);
                assert!(rows[2].taken);
            }
            other => panic!("expected rankings, got {other:?}"),
        }
        match ui_rx.recv().await.unwrap() {
            UiUpdate::Picks(picks) => {
                assert_eq!(picks.len(), 2);
                assert_eq!(picks[1].pick_display, "1.02");
                assert!(!picks[0].is_my_pick);
                assert!(picks[1].is_my_pick);
            }
            other => panic!("expected picks, got {other:?}"),
        }
        assert!(matches!(
            ui_rx.recv().await.unwrap(),
            UiUpdate::Synced { pick_count: 2, .. }
        ));

        cmd_tx.send(UserCommand::Quit).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_generation_events_are_discarded() {
        let (mut state, _rx) = create_test_state(vec![]);
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        let first = state.start_polling(params());
        let second = state.start_polling(params());
        assert_eq!(second, first + 1);

        handle_draft_event(
            &mut state,
            DraftEvent::TakenUpdate {
                generation: first,
                taken: taken(&["puka nacua"]),
            },
            &ui_tx,
        )
        .await;
        assert!(!state.rankings[1].taken);
        assert!(ui_rx.try_recv().is_err());

        handle_draft_event(
            &mut state,
            DraftEvent::TakenUpdate {
                generation: second,
                taken: taken(&["puka nacua"]),
            },
            &ui_tx,
        )
        .await;
        assert!(state.rankings[1].taken);
        state.stop_polling();
    }

    #[tokio::test]
    async fn events_after_stop_are_discarded() {
        let (mut state, _rx) = create_test_state(vec![]);
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        let generation = state.start_polling(params());
        state.stop_polling();

        handle_draft_event(
            &mut state,
            DraftEvent::Error {
                generation,
                message: "late".into(),
            },
            &ui_tx,
        )
        .await;
        assert!(ui_rx.try_recv().is_err());
    }
}
