use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::GameSummary;

const STORE_VERSION: u8 = 1;

/// Receives the final statistics of every finished match.
pub trait StatsSink: Send + Sync {
    fn record_match(&self, summary: &GameSummary);
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct StoredCareer {
    name: String,
    matches: u64,
    wins: u64,
    victories: u64,
    defeats: u64,
    combats: u64,
    evasions: u64,
    #[serde(rename = "damageDealt", default)]
    damage_dealt: u64,
    #[serde(rename = "damageTaken", default)]
    damage_taken: u64,
    #[serde(rename = "itemsCollected", default)]
    items_collected: u64,
    #[serde(rename = "bestCoveragePct", default)]
    best_coverage_pct: f64,
    #[serde(rename = "updatedAtMs", default)]
    updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StatsStoreFile {
    version: u8,
    players: HashMap<String, StoredCareer>,
}

#[derive(Clone, Debug, Deserialize)]
struct StatsStoreFileRaw {
    version: u8,
    players: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CareerEntry {
    pub name: String,
    pub matches: u64,
    pub wins: u64,
    #[serde(rename = "winRate")]
    pub win_rate: f64,
    pub victories: u64,
    pub defeats: u64,
    pub combats: u64,
    pub evasions: u64,
    #[serde(rename = "damageDealt")]
    pub damage_dealt: u64,
    #[serde(rename = "damageTaken")]
    pub damage_taken: u64,
    #[serde(rename = "itemsCollected")]
    pub items_collected: u64,
    #[serde(rename = "bestCoveragePct")]
    pub best_coverage_pct: f64,
    #[serde(rename = "updatedAtMs")]
    pub updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatsResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<CareerEntry>,
}

/// Career aggregates for human players, persisted as a versioned JSON document.
pub struct JsonStatsStore {
    file_path: PathBuf,
    players: Mutex<HashMap<String, StoredCareer>>,
}

impl JsonStatsStore {
    pub fn new(file_path: PathBuf) -> Self {
        let players = load_players(&file_path);
        Self {
            file_path,
            players: Mutex::new(players),
        }
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> StatsResponse {
        StatsResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entries: self.get_top(requested_limit),
        }
    }

    fn get_top(&self, requested_limit: Option<usize>) -> Vec<CareerEntry> {
        let normalized_limit = requested_limit.unwrap_or(10).clamp(1, 100);
        let players = self.lock();
        let mut entries: Vec<CareerEntry> = players
            .values()
            .map(|career| CareerEntry {
                name: career.name.clone(),
                matches: career.matches,
                wins: career.wins.min(career.matches),
                win_rate: career.wins as f64 / career.matches.max(1) as f64,
                victories: career.victories,
                defeats: career.defeats,
                combats: career.combats,
                evasions: career.evasions,
                damage_dealt: career.damage_dealt,
                damage_taken: career.damage_taken,
                items_collected: career.items_collected,
                best_coverage_pct: career.best_coverage_pct,
                updated_at_ms: career.updated_at_ms,
            })
            .collect();

        entries.sort_by(|a, b| {
            cmp_desc_f64(a.win_rate, b.win_rate)
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| b.victories.cmp(&a.victories))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        entries.truncate(normalized_limit);
        entries
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredCareer>> {
        match self.players.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn save(&self, players: &HashMap<String, StoredCareer>) {
        if let Some(parent) = self.file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), %error, "failed to create stats directory");
                return;
            }
        }

        let payload = StatsStoreFile {
            version: STORE_VERSION,
            players: players.clone(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(&self.file_path, text) {
                    warn!(path = %self.file_path.display(), %error, "failed to write stats");
                }
            }
            Err(error) => {
                warn!(path = %self.file_path.display(), %error, "failed to serialize stats");
            }
        }
    }
}

impl StatsSink for JsonStatsStore {
    fn record_match(&self, summary: &GameSummary) {
        let now_ms = now_ms();
        let mut players = self.lock();
        for entry in summary.players.iter().filter(|entry| !entry.is_virtual) {
            let key = career_key(&entry.name);
            if key.is_empty() {
                continue;
            }
            let career = players.entry(key).or_default();
            career.name = entry.name.trim().to_string();
            career.matches += 1;
            if summary.winner_id.as_deref() == Some(entry.player_id.as_str()) {
                career.wins += 1;
            }
            career.victories += u64::from(entry.stats.victories);
            career.defeats += u64::from(entry.stats.defeats);
            career.combats += u64::from(entry.stats.combats);
            career.evasions += u64::from(entry.stats.evasions);
            career.damage_dealt += u64::from(entry.stats.damage_dealt);
            career.damage_taken += u64::from(entry.stats.damage_taken);
            career.items_collected += entry.stats.items_collected as u64;
            career.best_coverage_pct = career
                .best_coverage_pct
                .max(f64::from(entry.tiles_visited_pct));
            career.updated_at_ms = now_ms;
        }
        debug!(room_id = %summary.room_id, players = players.len(), "recorded match stats");
        self.save(&players);
    }
}

fn cmp_desc_f64(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn load_players(path: &Path) -> HashMap<String, StoredCareer> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read stats");
            }
            return HashMap::new();
        }
    };
    let parsed = match serde_json::from_str::<StatsStoreFileRaw>(&text) {
        Ok(value) if value.version == STORE_VERSION => value,
        Ok(value) => {
            warn!(path = %path.display(), version = value.version, "unsupported stats version");
            return HashMap::new();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse stats");
            return HashMap::new();
        }
    };

    let mut sanitized = HashMap::<String, StoredCareer>::new();
    for (player_key, raw_value) in parsed.players {
        let value: StoredCareer = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(path = %path.display(), player = %player_key, %error, "skipping stats entry");
                continue;
            }
        };
        let Some(normalized) = sanitize_stored_career(value) else {
            continue;
        };
        let key = career_key(&normalized.name);
        match sanitized.get_mut(&key) {
            Some(current) => merge_career(current, normalized),
            None => {
                sanitized.insert(key, normalized);
            }
        }
    }
    sanitized
}

fn merge_career(current: &mut StoredCareer, other: StoredCareer) {
    current.name = other.name;
    current.matches += other.matches;
    current.wins += other.wins;
    current.victories += other.victories;
    current.defeats += other.defeats;
    current.combats += other.combats;
    current.evasions += other.evasions;
    current.damage_dealt += other.damage_dealt;
    current.damage_taken += other.damage_taken;
    current.items_collected += other.items_collected;
    current.best_coverage_pct = current.best_coverage_pct.max(other.best_coverage_pct);
    current.updated_at_ms = current.updated_at_ms.max(other.updated_at_ms);
}

fn sanitize_stored_career(value: StoredCareer) -> Option<StoredCareer> {
    let name = value.name.trim().to_string();
    if name.is_empty() {
        return None;
    }
    if !value.best_coverage_pct.is_finite() || value.best_coverage_pct < 0.0 {
        return None;
    }
    Some(StoredCareer {
        name,
        wins: value.wins.min(value.matches),
        best_coverage_pct: value.best_coverage_pct.min(100.0),
        ..value
    })
}

fn career_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
