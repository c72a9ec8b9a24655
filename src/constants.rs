use crate::types::{StatBonus, TerrainKind};

pub const BASE_STAT: i32 = 4;
pub const STAT_BONUS: i32 = 2;
pub const INVENTORY_CAPACITY: usize = 2;
pub const ESCAPE_ATTEMPTS: u32 = 2;
pub const DEFAULT_ESCAPE_PROBABILITY: f64 = 0.4;
pub const ICE_PENALTY: i32 = 2;
pub const ITEM_STAT_BONUS: i32 = 2;
pub const WINS_TO_END: u32 = 3;
pub const ACTIONS_PER_TURN: u32 = 1;

pub const AI_STEP_DELAY_MS: u64 = 250;
pub const MAILBOX_CAPACITY: usize = 256;
pub const EVENT_BUFFER: usize = 512;

pub const MIN_GRID_SIZE: usize = 2;
pub const MAX_GRID_SIZE: usize = 40;
pub const MIN_PLAYERS_TO_START: usize = 2;

/// Movement points needed to enter a tile; `None` means the tile cannot be entered.
pub fn tile_cost(terrain: TerrainKind) -> Option<u32> {
    match terrain {
        TerrainKind::Default => Some(1),
        TerrainKind::Ice => Some(0),
        TerrainKind::Water => Some(2),
        TerrainKind::OpenedDoor => Some(1),
        TerrainKind::Unknown => Some(0),
        TerrainKind::Wall | TerrainKind::Door => None,
    }
}

/// Returns `(life, speed)` for a fresh player.
pub fn base_stats_for_bonus(bonus: StatBonus) -> (i32, i32) {
    match bonus {
        StatBonus::Life => (BASE_STAT + STAT_BONUS, BASE_STAT),
        StatBonus::Speed => (BASE_STAT, BASE_STAT + STAT_BONUS),
    }
}
