use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn step(self, dir: Direction) -> Self {
        match dir {
            Direction::Up => Self::new(self.row - 1, self.col),
            Direction::Down => Self::new(self.row + 1, self.col),
            Direction::Left => Self::new(self.row, self.col - 1),
            Direction::Right => Self::new(self.row, self.col + 1),
        }
    }

    pub fn neighbors(self) -> [Position; 4] {
        Direction::ALL.map(|dir| self.step(dir))
    }

    pub fn manhattan(self, other: Position) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    pub fn is_adjacent(self, other: Position) -> bool {
        self.manhattan(other) == 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    #[default]
    Default,
    Ice,
    Water,
    Wall,
    Door,
    OpenedDoor,
    #[serde(other)]
    Unknown,
}

impl TerrainKind {
    pub fn is_door(self) -> bool {
        matches!(self, TerrainKind::Door | TerrainKind::OpenedDoor)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    AttackBoost,
    DefenseBoost,
    LoadedDie,
    Hex,
    Phoenix,
    Flag,
    Random,
}

impl ItemKind {
    pub const RANDOM_POOL: [ItemKind; 5] = [
        ItemKind::AttackBoost,
        ItemKind::DefenseBoost,
        ItemKind::LoadedDie,
        ItemKind::Hex,
        ItemKind::Phoenix,
    ];

    pub fn is_critical(self) -> bool {
        self == ItemKind::Flag
    }

    pub fn is_offensive(self) -> bool {
        matches!(
            self,
            ItemKind::AttackBoost | ItemKind::LoadedDie | ItemKind::Hex
        )
    }

    pub fn is_defensive(self) -> bool {
        matches!(self, ItemKind::DefenseBoost | ItemKind::Phoenix)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Classic,
    #[serde(rename = "ctf")]
    CaptureTheFlag,
}

impl GameMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "classic" => Some(Self::Classic),
            "ctf" => Some(Self::CaptureTheFlag),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Aggressive,
    Defensive,
}

impl Behavior {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "aggressive" => Some(Self::Aggressive),
            "defensive" => Some(Self::Defensive),
            _ => None,
        }
    }

    pub fn wants_item(self, item: ItemKind) -> bool {
        match self {
            Behavior::Aggressive => item.is_offensive(),
            Behavior::Defensive => item.is_defensive(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "behavior", rename_all = "snake_case")]
pub enum PlayerKind {
    Human,
    Virtual(Behavior),
}

impl PlayerKind {
    pub fn behavior(self) -> Option<Behavior> {
        match self {
            PlayerKind::Human => None,
            PlayerKind::Virtual(behavior) => Some(behavior),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatBonus {
    Life,
    Speed,
}

impl StatBonus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "life" => Some(Self::Life),
            "speed" => Some(Self::Speed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatBlock {
    pub life: i32,
    #[serde(rename = "maxLife")]
    pub max_life: i32,
    pub speed: i32,
    #[serde(rename = "maxSpeed")]
    pub max_speed: i32,
    pub attack: i32,
    pub defense: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlayerMatchStats {
    pub combats: u32,
    pub evasions: u32,
    pub victories: u32,
    pub defeats: u32,
    #[serde(rename = "damageDealt")]
    pub damage_dealt: u32,
    #[serde(rename = "damageTaken")]
    pub damage_taken: u32,
    #[serde(rename = "tilesVisited")]
    pub tiles_visited: usize,
    #[serde(rename = "itemsCollected")]
    pub items_collected: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoardTile {
    #[serde(default)]
    pub terrain: TerrainKind,
    #[serde(default)]
    pub item: Option<ItemKind>,
    #[serde(default)]
    pub spawn: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameMap {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "gridSize")]
    pub grid_size: usize,
    pub board: Vec<Vec<BoardTile>>,
    #[serde(rename = "gameMode")]
    pub game_mode: GameMode,
}

#[derive(Clone, Debug, Serialize)]
pub struct CellView {
    pub terrain: TerrainKind,
    pub item: Option<ItemKind>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GridView {
    pub size: usize,
    pub cells: Vec<Vec<CellView>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub kind: PlayerKind,
    pub stats: StatBlock,
    pub position: Option<Position>,
    pub spawn: Option<Position>,
    pub inventory: Vec<ItemKind>,
    pub wins: u32,
}

#[derive(Clone, Debug)]
pub struct JoinRequest {
    pub player_id: String,
    pub name: String,
    pub kind: PlayerKind,
    pub bonus: StatBonus,
}

/// Inbound message-bus intents. `StartGame` is resolved by the room actor, which owns the map
/// provider; everything else goes straight to the room.
#[derive(Clone, Debug)]
pub enum Intent {
    PlayerJoin(JoinRequest),
    PlayerQuit { player_id: String },
    StartGame { player_id: String },
    Move { player_id: String, target: Position },
    Attack { player_id: String, target_id: String },
    Escape { player_id: String },
    EndTurn { player_id: String },
    ForceEndTurn,
    ToggleDoor { player_id: String, position: Position },
    ToggleDebug { player_id: String },
    Teleport { player_id: String, position: Position },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEndReason {
    Victories,
    FlagCaptured,
    LastPlayerStanding,
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CombatOutcome {
    Victory {
        #[serde(rename = "winnerId")]
        winner_id: String,
        #[serde(rename = "loserId")]
        loser_id: String,
        forfeit: bool,
    },
    Escaped {
        #[serde(rename = "playerId")]
        player_id: String,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    PlayerJoined {
        player: PlayerView,
    },
    PlayerLeft {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    GameStarted {
        grid: GridView,
        mode: GameMode,
        players: Vec<PlayerView>,
    },
    TurnChanged {
        #[serde(rename = "playerId")]
        player_id: String,
        speed: i32,
    },
    PlayerMoved {
        #[serde(rename = "playerId")]
        player_id: String,
        from: Position,
        to: Position,
        #[serde(rename = "remainingSpeed")]
        remaining_speed: i32,
    },
    DoorToggled {
        position: Position,
        open: bool,
    },
    ItemPickedUp {
        #[serde(rename = "playerId")]
        player_id: String,
        item: ItemKind,
        position: Position,
    },
    ItemDropped {
        #[serde(rename = "playerId")]
        player_id: String,
        item: ItemKind,
        position: Position,
    },
    CombatStarted {
        #[serde(rename = "attackerId")]
        attacker_id: String,
        #[serde(rename = "defenderId")]
        defender_id: String,
        #[serde(rename = "turnId")]
        turn_id: String,
    },
    CombatRoll {
        #[serde(rename = "attackerId")]
        attacker_id: String,
        #[serde(rename = "defenderId")]
        defender_id: String,
        #[serde(rename = "attackRoll")]
        attack_roll: i32,
        #[serde(rename = "defenseRoll")]
        defense_roll: i32,
        damage: i32,
        #[serde(rename = "defenderLife")]
        defender_life: i32,
        revived: bool,
    },
    EscapeFailed {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "attemptsLeft")]
        attempts_left: u32,
    },
    CombatResolved {
        outcome: CombatOutcome,
    },
    DebugToggled {
        enabled: bool,
    },
    GameEnded {
        #[serde(rename = "winnerId")]
        winner_id: Option<String>,
        reason: GameEndReason,
        summary: GameSummary,
    },
    Error {
        message: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerSummary {
    #[serde(rename = "playerId")]
    pub player_id: String,
    pub name: String,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub wins: u32,
    pub stats: PlayerMatchStats,
    #[serde(rename = "tilesVisitedPct")]
    pub tiles_visited_pct: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameSummary {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub mode: GameMode,
    #[serde(rename = "winnerId")]
    pub winner_id: Option<String>,
    pub reason: GameEndReason,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "totalTurns")]
    pub total_turns: u32,
    #[serde(rename = "tilesVisitedPct")]
    pub tiles_visited_pct: f32,
    #[serde(rename = "doorsToggledPct")]
    pub doors_toggled_pct: f32,
    #[serde(rename = "flagHolders")]
    pub flag_holders: usize,
    pub players: Vec<PlayerSummary>,
}
