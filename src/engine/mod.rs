use std::collections::HashSet;
use std::mem;

use serde::Serialize;

use crate::constants::{
    base_stats_for_bonus, ACTIONS_PER_TURN, BASE_STAT, DEFAULT_ESCAPE_PROBABILITY,
    ESCAPE_ATTEMPTS, ICE_PENALTY, INVENTORY_CAPACITY, ITEM_STAT_BONUS, MIN_PLAYERS_TO_START,
    WINS_TO_END,
};
use crate::error::EngineError;
use crate::grid::Grid;
use crate::pathfinder::{decrease_speed, find_paths, search, Mover, PathTarget, SearchOptions};
use crate::rng::Rng;
use crate::types::{
    Behavior, CombatOutcome, GameEndReason, GameMap, GameMode, GameSummary, ItemKind,
    JoinRequest, PlayerKind, PlayerMatchStats, PlayerSummary, PlayerView, Position, RoomEvent,
    StatBlock,
};

mod combat_system;
mod movement_system;
mod stats_system;
mod turn_system;
mod utils;
mod virtual_player;

pub use self::virtual_player::VirtualAction;

use self::stats_system::MatchStats;
use self::utils::{now_ms, percentage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    WaitingForPlayers,
    Starting,
    InProgress,
    Finished,
}

#[derive(Clone, Debug)]
pub struct GameRoomOptions {
    pub escape_probability: f64,
    pub seed: Option<u64>,
}

impl Default for GameRoomOptions {
    fn default() -> Self {
        Self {
            escape_probability: DEFAULT_ESCAPE_PROBABILITY,
            seed: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub kind: PlayerKind,
    pub stats: StatBlock,
    pub inventory: Vec<ItemKind>,
    pub spawn: Option<Position>,
    pub position: Option<Position>,
    pub wins: u32,
    pub match_stats: PlayerMatchStats,
    visited: HashSet<Position>,
}

impl Player {
    fn new(request: JoinRequest) -> Self {
        let (life, speed) = base_stats_for_bonus(request.bonus);
        Self {
            id: request.player_id,
            name: request.name,
            kind: request.kind,
            stats: StatBlock {
                life,
                max_life: life,
                speed,
                max_speed: speed,
                attack: BASE_STAT,
                defense: BASE_STAT,
            },
            inventory: Vec::new(),
            spawn: None,
            position: None,
            wins: 0,
            match_stats: PlayerMatchStats::default(),
            visited: HashSet::new(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, PlayerKind::Virtual(_))
    }

    pub fn has_item(&self, item: ItemKind) -> bool {
        self.inventory.contains(&item)
    }

    pub fn has_visited(&self, pos: Position) -> bool {
        self.visited.contains(&pos)
    }

    fn visit(&mut self, pos: Position) {
        if self.visited.insert(pos) {
            self.match_stats.tiles_visited = self.visited.len();
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            stats: self.stats,
            position: self.position,
            spawn: self.spawn,
            inventory: self.inventory.clone(),
            wins: self.wins,
        }
    }
}

#[derive(Clone, Debug)]
struct Combatant {
    id: String,
    snapshot: StatBlock,
    escapes_left: u32,
    revive_used: bool,
    hex_used: bool,
}

impl Combatant {
    fn new(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            snapshot: player.stats,
            escapes_left: ESCAPE_ATTEMPTS,
            revive_used: false,
            hex_used: false,
        }
    }
}

/// Pairwise combat. The combatant in the `attacker` slot always owns the combat turn; a flip
/// swaps the slots together with their pre-combat snapshots.
#[derive(Clone, Debug)]
pub struct CombatState {
    attacker: Combatant,
    defender: Combatant,
    initiator: String,
}

impl CombatState {
    pub fn turn(&self) -> &str {
        &self.attacker.id
    }

    pub fn attacker_id(&self) -> &str {
        &self.attacker.id
    }

    pub fn defender_id(&self) -> &str {
        &self.defender.id
    }

    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    pub fn involves(&self, player_id: &str) -> bool {
        self.attacker.id == player_id || self.defender.id == player_id
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<&str> {
        if self.attacker.id == player_id {
            Some(&self.defender.id)
        } else if self.defender.id == player_id {
            Some(&self.attacker.id)
        } else {
            None
        }
    }

    pub fn escapes_left(&self, player_id: &str) -> u32 {
        self.combatant(player_id)
            .map(|c| c.escapes_left)
            .unwrap_or(0)
    }

    pub fn snapshot_of(&self, player_id: &str) -> Option<StatBlock> {
        self.combatant(player_id).map(|c| c.snapshot)
    }

    fn combatant(&self, player_id: &str) -> Option<&Combatant> {
        [&self.attacker, &self.defender]
            .into_iter()
            .find(|c| c.id == player_id)
    }

    fn flip(&mut self) {
        mem::swap(&mut self.attacker, &mut self.defender);
    }
}

/// Authoritative state of one match. Every mutation goes through `&mut self`; the hub keeps
/// each room behind a single actor so no two intents touch it at once.
#[derive(Debug)]
pub struct GameRoom {
    pub room_id: String,
    pub map_id: String,

    phase: RoomPhase,
    mode: GameMode,
    grid: Option<Grid>,
    players: Vec<Player>,
    host_id: Option<String>,
    current_turn: Option<String>,
    actions_left: u32,
    combat: Option<CombatState>,
    debug: bool,
    stats: MatchStats,
    rng: Rng,
    options: GameRoomOptions,
    events: Vec<RoomEvent>,
    summary: Option<GameSummary>,
    ai_steps: u32,
}

impl GameRoom {
    pub fn new(room_id: &str, map_id: &str, options: GameRoomOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => Rng::new(seed),
            None => Rng::from_entropy(),
        };
        Self {
            room_id: room_id.to_string(),
            map_id: map_id.to_string(),
            phase: RoomPhase::WaitingForPlayers,
            mode: GameMode::Classic,
            grid: None,
            players: Vec::new(),
            host_id: None,
            current_turn: None,
            actions_left: 0,
            combat: None,
            debug: false,
            stats: MatchStats::default(),
            rng,
            options,
            events: Vec::new(),
            summary: None,
            ai_steps: 0,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn current_turn(&self) -> Option<&str> {
        self.current_turn.as_deref()
    }

    pub fn actions_left(&self) -> u32 {
        self.actions_left
    }

    pub fn combat(&self) -> Option<&CombatState> {
        self.combat.as_ref()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RoomPhase::Finished
    }

    pub fn summary(&self) -> Option<&GameSummary> {
        self.summary.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<RoomEvent> {
        mem::take(&mut self.events)
    }

    pub fn join(&mut self, request: JoinRequest) -> bool {
        if self.phase != RoomPhase::WaitingForPlayers {
            self.reject(format!("room '{}' has already started", self.room_id));
            return false;
        }
        if self.player(&request.player_id).is_some() {
            return false;
        }
        let player = Player::new(request);
        if self.host_id.is_none() {
            self.host_id = Some(player.id.clone());
        }
        self.events.push(RoomEvent::PlayerJoined {
            player: player.view(),
        });
        self.players.push(player);
        true
    }

    /// First half of the start transition. Moves the room into `Starting` so a second start
    /// request is refused while the map is fetched.
    pub fn begin_start(&mut self, player_id: &str) -> bool {
        if self.phase != RoomPhase::WaitingForPlayers {
            return false;
        }
        if self.host_id.as_deref() != Some(player_id) {
            return false;
        }
        if self.players.len() < MIN_PLAYERS_TO_START {
            self.reject(format!(
                "at least {MIN_PLAYERS_TO_START} players are needed to start"
            ));
            return false;
        }
        self.phase = RoomPhase::Starting;
        true
    }

    pub fn abort_start(&mut self, message: String) {
        if self.phase != RoomPhase::Starting {
            return;
        }
        self.phase = RoomPhase::WaitingForPlayers;
        self.reject(message);
    }

    pub fn start_with_map(&mut self, map: &GameMap) -> Result<bool, EngineError> {
        if self.phase != RoomPhase::Starting {
            return Ok(false);
        }
        let (mut grid, spawns) = match self.prepare_grid(map) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.abort_start(err.to_string());
                return Err(err);
            }
        };

        let mut used = spawns.into_iter();
        for player in &mut self.players {
            let Some(spawn) = used.next() else {
                break;
            };
            player.spawn = Some(spawn);
            player.position = Some(spawn);
            player.visit(spawn);
            grid.set_occupant(spawn, Some(player.id.clone()));
            self.stats.visited.insert(spawn);
        }
        for unused in used {
            grid.clear_spawn(unused);
        }

        self.mode = map.game_mode;
        self.stats.started_at_ms = now_ms();
        self.events.push(RoomEvent::GameStarted {
            grid: grid.to_view(),
            mode: self.mode,
            players: self.players.iter().map(Player::view).collect(),
        });
        self.grid = Some(grid);
        self.phase = RoomPhase::InProgress;
        self.set_first_turn();
        Ok(true)
    }

    pub fn start_game(&mut self, player_id: &str, map: &GameMap) -> Result<bool, EngineError> {
        if !self.begin_start(player_id) {
            return Ok(false);
        }
        self.start_with_map(map)
    }

    fn prepare_grid(&mut self, map: &GameMap) -> Result<(Grid, Vec<Position>), EngineError> {
        let mut grid = Grid::from_map(map)?;
        grid.randomize_for_match(map.game_mode, &mut self.rng);
        let mut spawns = grid.spawn_points();
        if spawns.len() < self.players.len() {
            return Err(EngineError::MalformedGrid(format!(
                "map '{}' has {} starting points for {} players",
                map.id,
                spawns.len(),
                self.players.len()
            )));
        }
        self.rng.shuffle(&mut spawns);
        Ok((grid, spawns))
    }

    pub fn toggle_debug(&mut self, player_id: &str) -> bool {
        if self.host_id.as_deref() != Some(player_id) || self.phase == RoomPhase::Finished {
            return false;
        }
        self.debug = !self.debug;
        self.events.push(RoomEvent::DebugToggled {
            enabled: self.debug,
        });
        true
    }

    /// Ends a running match with no winner.
    pub fn abandon(&mut self) {
        if self.phase == RoomPhase::InProgress {
            self.end_game(None, GameEndReason::Abandoned);
        }
    }

    fn end_game(&mut self, winner_id: Option<String>, reason: GameEndReason) {
        if self.phase == RoomPhase::Finished {
            return;
        }
        self.phase = RoomPhase::Finished;
        self.combat = None;
        self.current_turn = None;
        self.actions_left = 0;
        self.stats.ended_at_ms = now_ms();
        let summary = self.build_summary(winner_id.clone(), reason);
        self.events.push(RoomEvent::GameEnded {
            winner_id,
            reason,
            summary: summary.clone(),
        });
        self.summary = Some(summary);
    }

    fn reject(&mut self, message: String) {
        self.events.push(RoomEvent::Error { message });
    }

    fn player_index(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|player| player.id == player_id)
    }

    fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == player_id)
    }

    fn holds_turn(&self, player_id: &str) -> bool {
        self.phase == RoomPhase::InProgress && self.current_turn.as_deref() == Some(player_id)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::types::StatBonus;

    #[test]
    fn start_places_players_on_distinct_starting_points() {
        let spawns = [Position::new(0, 0), Position::new(3, 3), Position::new(0, 3)];
        let map = open_map(4, &spawns, GameMode::Classic);
        let room = started_room(vec![human("a"), human("b")], &map, 0.4, 3);
        assert_eq!(room.phase(), RoomPhase::InProgress);
        let positions: HashSet<Position> =
            room.players().iter().filter_map(|p| p.position).collect();
        assert_eq!(positions.len(), 2);
        for player in room.players() {
            assert_eq!(player.position, player.spawn);
            let grid = room.grid().expect("grid");
            assert_eq!(grid.occupant(player.spawn.expect("spawn")), Some(player.id.as_str()));
        }
        assert_eq!(room.grid().expect("grid").spawn_points().len(), 2);
    }

    #[test]
    fn second_start_request_is_refused_while_starting() {
        let map = open_map(4, &[Position::new(0, 0), Position::new(3, 3)], GameMode::Classic);
        let mut room = GameRoom::new("r", &map.id, GameRoomOptions::default());
        room.join(human("a"));
        room.join(human("b"));
        assert!(room.begin_start("a"));
        assert!(!room.begin_start("a"));
        assert_eq!(room.start_with_map(&map), Ok(true));
        assert_eq!(room.start_with_map(&map), Ok(false));
        assert!(!room.join(human("c")));
    }

    #[test]
    fn only_the_host_can_start_and_a_lone_player_cannot() {
        let map = open_map(4, &[Position::new(0, 0), Position::new(3, 3)], GameMode::Classic);
        let mut room = GameRoom::new("r", &map.id, GameRoomOptions::default());
        room.join(human("a"));
        assert!(!room.begin_start("a"));
        room.join(request("b", PlayerKind::Virtual(Behavior::Aggressive), StatBonus::Speed));
        assert!(!room.begin_start("b"));
        assert!(room.begin_start("a"));
    }

    #[test]
    fn maps_without_enough_starting_points_abort_the_start() {
        let map = open_map(4, &[Position::new(0, 0)], GameMode::Classic);
        let mut room = GameRoom::new("r", &map.id, GameRoomOptions::default());
        room.join(human("a"));
        room.join(human("b"));
        assert!(room.begin_start("a"));
        assert!(matches!(
            room.start_with_map(&map),
            Err(EngineError::MalformedGrid(_))
        ));
        assert_eq!(room.phase(), RoomPhase::WaitingForPlayers);
        assert!(room
            .drain_events()
            .iter()
            .any(|event| matches!(event, RoomEvent::Error { .. })));
    }

    #[test]
    fn bonus_choice_sets_life_or_speed() {
        let map = open_map(4, &[Position::new(0, 0), Position::new(3, 3)], GameMode::Classic);
        let room = started_room(
            vec![
                request("a", PlayerKind::Human, StatBonus::Life),
                request("b", PlayerKind::Human, StatBonus::Speed),
            ],
            &map,
            0.4,
            1,
        );
        let a = room.player("a").expect("a");
        let b = room.player("b").expect("b");
        assert_eq!((a.stats.max_life, a.stats.max_speed), (6, 4));
        assert_eq!((b.stats.max_life, b.stats.max_speed), (4, 6));
        assert_eq!(room.current_turn(), Some("b"));
    }
}
