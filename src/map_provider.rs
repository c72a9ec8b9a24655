use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::warn;

use crate::types::GameMap;

/// Read-only source of map definitions, consulted once when a match starts.
pub trait MapProvider: Send + Sync {
    fn get_game(&self, map_id: &str) -> Option<GameMap>;
}

/// Loads `<dir>/<map_id>.json` on every request so edited maps apply to the next match.
pub struct JsonMapDirectory {
    dir: PathBuf,
}

impl JsonMapDirectory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn list_ids(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().to_string()))
            .collect();
        ids.sort();
        ids
    }
}

impl MapProvider for JsonMapDirectory {
    fn get_game(&self, map_id: &str) -> Option<GameMap> {
        if !is_safe_map_id(map_id) {
            return None;
        }
        let path = self.dir.join(format!("{map_id}.json"));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %error, "failed to read map");
                }
                return None;
            }
        };
        match serde_json::from_str::<GameMap>(&text) {
            Ok(mut map) => {
                map.id = map_id.to_string();
                Some(map)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to parse map");
                None
            }
        }
    }
}

fn is_safe_map_id(map_id: &str) -> bool {
    !map_id.is_empty()
        && map_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

#[derive(Default)]
pub struct InMemoryMaps {
    maps: RwLock<HashMap<String, GameMap>>,
}

impl InMemoryMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, map: GameMap) {
        let mut maps = match self.maps.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        maps.insert(map.id.clone(), map);
    }

    pub fn remove(&self, map_id: &str) -> Option<GameMap> {
        let mut maps = match self.maps.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        maps.remove(map_id)
    }
}

impl MapProvider for InMemoryMaps {
    fn get_game(&self, map_id: &str) -> Option<GameMap> {
        let maps = match self.maps.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        maps.get(map_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameMode, TerrainKind};

    const SMALL_MAP: &str = r#"{
  "id": "ignored",
  "name": "Small",
  "gridSize": 2,
  "gameMode": "ctf",
  "board": [
    [{ "terrain": "default", "spawn": true }, { "terrain": "water", "item": "flag" }],
    [{ "terrain": "lava" }, { "terrain": "door", "spawn": true }]
  ]
}"#;

    #[test]
    fn directory_loads_maps_by_file_stem() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("small.json"), SMALL_MAP).expect("write map");
        fs::write(dir.path().join("notes.txt"), "not a map").expect("write note");
        let provider = JsonMapDirectory::new(dir.path().to_path_buf());

        let map = provider.get_game("small").expect("map loads");
        assert_eq!(map.id, "small");
        assert_eq!(map.game_mode, GameMode::CaptureTheFlag);
        assert_eq!(map.board[1][0].terrain, TerrainKind::Unknown);
        assert_eq!(provider.list_ids(), vec!["small".to_string()]);
    }

    #[test]
    fn missing_broken_or_unsafe_ids_yield_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("broken.json"), "{ nope").expect("write map");
        let provider = JsonMapDirectory::new(dir.path().to_path_buf());
        assert!(provider.get_game("absent").is_none());
        assert!(provider.get_game("broken").is_none());
        assert!(provider.get_game("../broken").is_none());
    }

    #[test]
    fn in_memory_maps_can_disappear() {
        let maps = InMemoryMaps::new();
        let map: GameMap = serde_json::from_str(SMALL_MAP).expect("parse");
        maps.insert(map);
        assert!(maps.get_game("ignored").is_some());
        assert!(maps.remove("ignored").is_some());
        assert!(maps.get_game("ignored").is_none());
    }
}
