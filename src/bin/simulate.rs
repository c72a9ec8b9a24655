use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arena_tactics_server::constants::DEFAULT_ESCAPE_PROBABILITY;
use arena_tactics_server::engine::{GameRoom, GameRoomOptions};
use arena_tactics_server::grid::generate_arena;
use arena_tactics_server::types::{
    Behavior, GameEndReason, GameMap, GameMode, GameSummary, JoinRequest, PlayerKind, RoomEvent,
    StatBonus,
};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_VIRTUAL_PLAYERS: usize = 6;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON map file; a seeded arena is generated when omitted.
    #[arg(long)]
    map: Option<PathBuf>,
    #[arg(long, default_value_t = 4)]
    ai: usize,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    mode: Option<String>,
    #[arg(long, default_value_t = 10)]
    size: usize,
    #[arg(long, default_value_t = 1)]
    matches: u32,
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    #[arg(long, default_value_t = 20_000)]
    max_steps: u32,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct MatchResultLine {
    seed: u64,
    mode: GameMode,
    players: usize,
    reason: GameEndReason,
    #[serde(rename = "winnerId")]
    winner_id: Option<String>,
    #[serde(rename = "totalTurns")]
    total_turns: u32,
    steps: u32,
    moves: u32,
    combats: u32,
    #[serde(rename = "failedEscapes")]
    failed_escapes: u32,
    #[serde(rename = "doorsToggled")]
    doors_toggled: u32,
    #[serde(rename = "itemsPicked")]
    items_picked: u32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct MatchRun {
    #[serde(flatten)]
    result: MatchResultLine,
    summary: Option<GameSummary>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "matchCount")]
    match_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageTurns")]
    average_turns: u32,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    matches: Vec<MatchRun>,
}

#[derive(Debug, Default)]
struct EventCounts {
    moves: u32,
    combats: u32,
    failed_escapes: u32,
    doors_toggled: u32,
    items_picked: u32,
}

impl EventCounts {
    fn absorb(&mut self, events: &[RoomEvent]) {
        for event in events {
            match event {
                RoomEvent::PlayerMoved { .. } => self.moves += 1,
                RoomEvent::CombatStarted { .. } => self.combats += 1,
                RoomEvent::EscapeFailed { .. } => self.failed_escapes += 1,
                RoomEvent::DoorToggled { .. } => self.doors_toggled += 1,
                RoomEvent::ItemPickedUp { .. } => self.items_picked += 1,
                _ => {}
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let run_started_at_ms = now_ms();
    let base_seed = cli.seed.unwrap_or(run_started_at_ms);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(base_seed, run_started_at_ms));
    let mode = match cli.mode.as_deref() {
        None => None,
        Some(raw) => match GameMode::parse(raw) {
            Some(mode) => Some(mode),
            None => {
                error!(mode = raw, "unknown game mode");
                std::process::exit(2);
            }
        },
    };
    let players = cli.ai.clamp(2, MAX_VIRTUAL_PLAYERS);
    let file_map = match cli.map.as_deref().map(load_map).transpose() {
        Ok(map) => map,
        Err(err) => {
            error!(%err, "failed to load map");
            std::process::exit(2);
        }
    };

    let mut runs = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut has_anomaly = false;
    for ordinal in 0..cli.matches.max(1) {
        let seed = base_seed.wrapping_add(u64::from(ordinal));
        let map = resolve_map(file_map.as_ref(), mode, cli.size, players, seed);
        info!(run_id = %run_id, seed, map_id = %map.id, players, "match_started");

        let run = match run_match(
            &map,
            players,
            seed,
            cli.max_steps,
            Duration::from_millis(cli.delay_ms),
        ) {
            Ok(run) => run,
            Err(message) => {
                error!(run_id = %run_id, seed, %message, "match could not start");
                std::process::exit(2);
            }
        };
        for anomaly in &run.result.anomalies {
            warn!(run_id = %run_id, seed, anomaly = %anomaly, "anomaly_detected");
        }
        has_anomaly |= !run.result.anomalies.is_empty();
        *reason_counts
            .entry(reason_key(run.result.reason))
            .or_insert(0) += 1;
        info!(
            run_id = %run_id,
            seed,
            reason = ?run.result.reason,
            winner = ?run.result.winner_id,
            turns = run.result.total_turns,
            "match_finished"
        );
        match serde_json::to_string(&run.result) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, "failed to encode match result"),
        }
        runs.push(run);
    }

    let summary = build_run_summary(run_id.clone(), run_started_at_ms, now_ms(), runs, reason_counts);
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(path = %path.display(), %err, "summary_write_failed");
            std::process::exit(2);
        }
    }
    info!(
        run_id = %run_id,
        matches = summary.match_count,
        anomalies = summary.anomaly_count,
        average_turns = summary.average_turns,
        "run_finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn load_map(path: &Path) -> io::Result<GameMap> {
    let text = std::fs::read_to_string(path)?;
    let mut map: GameMap = serde_json::from_str(&text).map_err(io::Error::other)?;
    if map.id.is_empty() {
        map.id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "map".to_string());
    }
    Ok(map)
}

fn resolve_map(
    file_map: Option<&GameMap>,
    mode: Option<GameMode>,
    size: usize,
    players: usize,
    seed: u64,
) -> GameMap {
    match file_map {
        Some(map) => {
            let mut map = map.clone();
            if let Some(mode) = mode {
                map.game_mode = mode;
            }
            map
        }
        None => generate_arena(size, mode.unwrap_or(GameMode::Classic), players, seed),
    }
}

fn virtual_request(idx: usize) -> JoinRequest {
    let behavior = if idx % 2 == 0 {
        Behavior::Aggressive
    } else {
        Behavior::Defensive
    };
    let bonus = if idx % 3 == 0 {
        StatBonus::Speed
    } else {
        StatBonus::Life
    };
    JoinRequest {
        player_id: format!("ai_{}", idx + 1),
        name: format!("AI-{:02}", idx + 1),
        kind: PlayerKind::Virtual(behavior),
        bonus,
    }
}

fn run_match(
    map: &GameMap,
    players: usize,
    seed: u64,
    max_steps: u32,
    delay: Duration,
) -> Result<MatchRun, String> {
    let mut room = GameRoom::new(
        &format!("sim-{seed}"),
        &map.id,
        GameRoomOptions {
            escape_probability: DEFAULT_ESCAPE_PROBABILITY,
            seed: Some(seed),
        },
    );
    for idx in 0..players {
        room.join(virtual_request(idx));
    }
    match room.start_game("ai_1", map) {
        Ok(true) => {}
        Ok(false) => return Err("room refused to start".to_string()),
        Err(err) => return Err(err.to_string()),
    }

    let mut counts = EventCounts::default();
    let mut anomalies = Vec::new();
    let mut steps = 0u32;
    while !room.is_finished() {
        if room.run_virtual_step().is_none() {
            anomalies.push("no virtual player could act".to_string());
            room.abandon();
            break;
        }
        counts.absorb(&room.drain_events());
        steps += 1;
        if steps >= max_steps {
            anomalies.push(format!("step limit {max_steps} exceeded"));
            room.abandon();
            break;
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
    counts.absorb(&room.drain_events());

    let summary = room.summary().cloned();
    let (reason, winner_id, total_turns) = match &summary {
        Some(summary) => (summary.reason, summary.winner_id.clone(), summary.total_turns),
        None => (GameEndReason::Abandoned, None, 0),
    };
    Ok(MatchRun {
        result: MatchResultLine {
            seed,
            mode: room.mode(),
            players,
            reason,
            winner_id,
            total_turns,
            steps,
            moves: counts.moves,
            combats: counts.combats,
            failed_escapes: counts.failed_escapes,
            doors_toggled: counts.doors_toggled,
            items_picked: counts.items_picked,
            anomalies,
        },
        summary,
    })
}

fn default_run_id(seed: u64, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    matches: Vec<MatchRun>,
    reason_counts: BTreeMap<String, usize>,
) -> RunSummary {
    let match_count = matches.len();
    let anomaly_count = matches.iter().map(|run| run.result.anomalies.len()).sum();
    let total_turns: u64 = matches
        .iter()
        .map(|run| u64::from(run.result.total_turns))
        .sum();
    let average_turns = if match_count == 0 {
        0
    } else {
        (total_turns / match_count as u64) as u32
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        match_count,
        anomaly_count,
        average_turns,
        reason_counts,
        matches,
    }
}

fn reason_key(reason: GameEndReason) -> String {
    match reason {
        GameEndReason::Victories => "victories",
        GameEndReason::FlagCaptured => "flag_captured",
        GameEndReason::LastPlayerStanding => "last_player_standing",
        GameEndReason::Abandoned => "abandoned",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_run(reason: GameEndReason, total_turns: u32, anomalies: usize) -> MatchRun {
        MatchRun {
            result: MatchResultLine {
                seed: 42,
                mode: GameMode::Classic,
                players: 2,
                reason,
                winner_id: None,
                total_turns,
                steps: 0,
                moves: 0,
                combats: 0,
                failed_escapes: 0,
                doors_toggled: 0,
                items_picked: 0,
                anomalies: vec!["odd".to_string(); anomalies],
            },
            summary: None,
        }
    }

    #[test]
    fn default_run_id_contains_seed_and_timestamp() {
        assert_eq!(default_run_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_averages_turns_and_counts_anomalies() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_run(GameEndReason::Victories, 30, 0),
                make_run(GameEndReason::Abandoned, 50, 2),
            ],
            BTreeMap::from([
                ("victories".to_string(), 1usize),
                ("abandoned".to_string(), 1usize),
            ]),
        );
        assert_eq!(summary.average_turns, 40);
        assert_eq!(summary.match_count, 2);
        assert_eq!(summary.anomaly_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("missing").join("summary.json");
        let summary = build_run_summary("sim-1-1".to_string(), 1, 2, Vec::new(), BTreeMap::new());
        assert!(write_summary(&target, &summary).is_err());
        let target = dir.path().join("summary.json");
        assert!(write_summary(&target, &summary).is_ok());
    }

    #[test]
    fn mode_override_applies_to_file_maps() {
        let base = generate_arena(8, GameMode::Classic, 2, 3);
        let map = resolve_map(Some(&base), Some(GameMode::CaptureTheFlag), 8, 2, 3);
        assert_eq!(map.game_mode, GameMode::CaptureTheFlag);
        assert_eq!(map.board.len(), base.board.len());
    }

    #[test]
    fn generated_matches_always_terminate() {
        for seed in 0..5 {
            let map = resolve_map(None, None, 8, 3, seed);
            let run = run_match(&map, 3, seed, 5_000, Duration::ZERO).expect("match starts");
            assert!(run.summary.is_some(), "seed {seed} left no summary");
            assert_eq!(run.result.players, 3);
        }
    }
}
