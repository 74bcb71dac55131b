// Dynasty assistant entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database, restore the previous session
// 4. Build feed clients
// 5. Print the league standings report (when a league is configured)
// 6. Create mpsc channels and the draft reconciler
// 7. Spawn session loop task
// 8. Console front end (blocks until the user quits)
// 9. Cleanup on exit

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use dynasty_assistant::app;
use dynasty_assistant::config;
use dynasty_assistant::console;
use dynasty_assistant::db;
use dynasty_assistant::draft::reconciler::{DraftReconciler, PollParams};
use dynasty_assistant::engine::{EngineSettings, ProjectionEngine};
use dynasty_assistant::feeds::cache::SignalCache;
use dynasty_assistant::feeds::ktc::KtcClient;
use dynasty_assistant::feeds::sleeper::SleeperClient;
use dynasty_assistant::feeds::build_client;
use dynasty_assistant::names::AliasMap;

use anyhow::Context;
use chrono::Datelike;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Dynasty assistant starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={:?}, draft={:?}, {} teams",
        config.league.league_id, config.league.draft_id, config.league.league_size
    );

    // 3. Open database
    let db_path = config::resolve_db_path(&config.league);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db_path_str = db_path.to_string_lossy().into_owned();
    let db = Arc::new(db::Database::open(&db_path_str).context("failed to open database")?);
    info!("Database opened at {}", db_path_str);

    // 4. Build feed clients
    let client = build_client().context("failed to build HTTP client")?;
    let feeds = &config.model.feeds;
    let sleeper = Arc::new(SleeperClient::new(client.clone(), &feeds.sleeper_base_url));
    let market = Arc::new(KtcClient::new(client, &feeds.ktc_url, feeds.rtm_url.as_deref()));
    let aliases = Arc::new(AliasMap::builtin());

    // 5. League report
    if !config.league.league_id.is_empty() {
        let cache = Arc::new(SignalCache::new(db.clone(), config.model.cache.max_age_hours));
        let engine = ProjectionEngine::new(sleeper.clone(), market, aliases.clone())
            .with_cache(cache)
            .with_settings(EngineSettings {
                pwrb: config.model.pwrb.clone(),
                linear: config.model.pwopr.clone(),
            });
        match engine.standings(&config.league.league_id).await {
            Ok(report) => println!("{}", console::render_report(&report)),
            Err(e) => {
                error!("League report failed: {}", e);
                eprintln!("league report failed: {e}");
            }
        }
    }

    if config.league.draft_id.is_empty() {
        info!("No draft configured, exiting");
        return Ok(());
    }

    // 6. Create mpsc channels and the reconciler
    let (draft_tx, draft_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let reconciler = DraftReconciler::new(sleeper, aliases.clone());
    let mut session = app::SessionState::new(db, aliases, reconciler, draft_tx);

    match app::recover_from_db(&mut session) {
        Ok(true) => info!("Ranking sheet restored from previous session"),
        Ok(false) => info!("Starting fresh session"),
        Err(e) => {
            error!("Session restore failed: {}", e);
            return Err(e.context("session restore failed"));
        }
    }

    if !config.league.my_user_ids.is_empty() {
        let ids: HashSet<String> = config.league.my_user_ids.iter().cloned().collect();
        session.set_my_user_ids(ids);
    }
    if let Some(path) = config.league.rankings_path.as_deref() {
        if session.rankings.is_empty() {
            if let Err(e) = session.load_rankings_file(Path::new(path)) {
                warn!("{}", e);
                eprintln!("{e}");
            }
        }
    }

    let poll = PollParams {
        draft_id: config.league.draft_id.clone(),
        interval: config.league.poll_interval(),
        rookie_pick_mode: config.league.rookie_pick_mode,
        league_size: config.league.league_size,
        rookie_year: config.league.rookie_year_or(chrono::Local::now().year() + 1),
    };
    session.start_polling(poll.clone());

    // 7. Spawn session loop task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(draft_rx, cmd_rx, ui_tx, session).await {
            error!("Session loop error: {}", e);
        }
    });

    // 8. Console front end
    info!("Polling draft {} every {:?}", poll.draft_id, poll.interval);
    if let Err(e) = console::run(ui_rx, cmd_tx, poll).await {
        error!("Console error: {}", e);
    }

    // 9. Cleanup: wait for the session task to finish (with timeout)
    if tokio::time::timeout(std::time::Duration::from_secs(5), app_handle)
        .await
        .is_err()
    {
        warn!("Session loop did not stop in time");
    }

    info!("Dynasty assistant shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which is used by the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("dynasty-assistant.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dynasty_assistant=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
