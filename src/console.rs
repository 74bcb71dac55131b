// Line-oriented console front end.
//
// Reads commands from stdin, forwards them to the session loop, and prints
// each `UiUpdate` it receives. Also renders the standings tables for the
// one-shot league report.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::app::{UiUpdate, UserCommand};
use crate::draft::reconciler::PollParams;
use crate::engine::StandingsReport;
use crate::rankings::RankingRow;

pub const HELP: &str = "\
commands:
  t <row>        toggle taken on a ranking row (1-based)
  reset          clear all taken flags
  load <path>    load a ranking sheet (csv)
  open <name>    switch to a saved ranking sheet
  start          start polling the draft
  stop           stop polling
  me <id,...>    set your user ids
  q              quit";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Translate one input line into a command.
///
/// Returns `Ok(None)` for blank lines and `Err` with a message for anything
/// unrecognized. `start` uses `poll` as its parameters.
pub fn parse_command(line: &str, poll: &PollParams) -> Result<Option<UserCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "t" | "toggle" => {
            let row: usize = rest
                .parse()
                .map_err(|_| format!("expected a row number, got {rest:?}"))?;
            if row == 0 {
                return Err("rows are numbered from 1".into());
            }
            UserCommand::ToggleTaken { index: row - 1 }
        }
        "reset" => UserCommand::ResetTaken,
        "load" if !rest.is_empty() => UserCommand::LoadRankings {
            path: PathBuf::from(rest),
        },
        "open" if !rest.is_empty() => UserCommand::OpenSavedRankings { name: rest.to_string() },
        "start" => UserCommand::StartPolling(poll.clone()),
        "stop" => UserCommand::StopPolling,
        "me" => {
            let ids: HashSet<String> = rest
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            UserCommand::SetMyUserIds(ids)
        }
        "q" | "quit" | "exit" => UserCommand::Quit,
        _ => return Err(format!("unknown command {line:?}")),
    };
    Ok(Some(cmd))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn render_rankings(rows: &[RankingRow]) -> String {
    let mut out = String::new();
    let taken = rows.iter().filter(|r| r.taken).count();
    let _ = writeln!(out, "rankings: {} rows, {} taken", rows.len(), taken);
    for (i, row) in rows.iter().enumerate() {
        let mark = match (row.taken, row.manual_override) {
            (true, true) => "X*",
            (true, false) => "X ",
            (false, true) => " *",
            (false, false) => "  ",
        };
        let _ = writeln!(
            out,
            "{:>4} [{}] {:<28} {:<4} tier {}",
            i + 1,
            mark,
            row.name,
            row.position,
            row.tier
        );
    }
    out
}

/// Text shown for one update.
pub fn render_update(update: &UiUpdate) -> String {
    match update {
        UiUpdate::Rankings(rows) => render_rankings(rows),
        UiUpdate::Picks(picks) => {
            let mut out = format!("picks: {}\n", picks.len());
            for p in picks.iter().rev().take(5) {
                let _ = writeln!(
                    out,
                    "  {} {:<28} {:<3} {:<4}{}",
                    p.pick_display,
                    p.player_name,
                    p.position,
                    p.team,
                    if p.is_my_pick { " (you)" } else { "" }
                );
            }
            out
        }
        UiUpdate::Synced { pick_count, at } => {
            format!("synced {} picks at {}\n", pick_count, at.format("%H:%M:%S"))
        }
        UiUpdate::PollError(message) => format!("poll failed: {message}\n"),
        UiUpdate::LoadFailed(message) => format!("load failed: {message}\n"),
    }
}

/// Text tables for a league report.
pub fn render_report(report: &StandingsReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "== Best Ball ==");
    for row in &report.best_ball {
        let _ = writeln!(
            out,
            "{:>2}. {:<24} actual {:>7.1}  proj {:>7.1}  total {:>7.1}{}",
            row.draft_slot,
            row.team_name,
            row.actual_total,
            row.projected_future,
            row.projected_total,
            if row.playoff { "  playoff" } else { "" }
        );
    }

    let _ = writeln!(out, "\n== WR/TE PWOPR ==");
    for row in report.pwopr.iter().take(40) {
        let signal = row.signal.map(|s| s.label()).unwrap_or("-");
        let _ = writeln!(
            out,
            "{:<24} {:<2} {:<4} pwopr {:>5.1} [{:>5.1}-{:>5.1}] {:<6} {}",
            row.name,
            row.position.display_str(),
            row.team,
            row.pwopr,
            row.floor,
            row.ceiling,
            row.tier,
            signal
        );
    }

    let _ = writeln!(out, "\n== RB PWRB ==");
    for row in report.pwrb.iter().take(40) {
        let _ = writeln!(
            out,
            "{:<24} {:<4} {:<9} pwrb {:>5.1} [{:>5.1}-{:>5.1}] {}",
            row.name,
            row.team,
            format!("{:?}", row.role),
            row.pwrb,
            row.floor,
            row.ceiling,
            row.tier
        );
    }

    let _ = writeln!(out, "\n== Power Rankings ==");
    for row in &report.power {
        let _ = writeln!(
            out,
            "{:>2}. {:<24} {:>8.0}  QB {:>7.0} RB {:>7.0} WR {:>7.0} TE {:>7.0}  ({} unmatched)",
            row.rank,
            row.team_name,
            row.total_value,
            row.qb_value,
            row.rb_value,
            row.wr_value,
            row.te_value,
            row.unmatched
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Run the console until the user quits, stdin closes, or the session loop
/// drops its update sender.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
    poll: PollParams,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(update) => print!("{}", render_update(&update)),
                    None => break,
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    let _ = cmd_tx.send(UserCommand::Quit).await;
                    break;
                };
                match parse_command(&line, &poll) {
                    Ok(Some(UserCommand::Quit)) => {
                        let _ = cmd_tx.send(UserCommand::Quit).await;
                        break;
                    }
                    Ok(Some(cmd)) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}\n{HELP}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(UserCommand::Quit).await;
                break;
            }
        }
    }
    Ok(())
}
