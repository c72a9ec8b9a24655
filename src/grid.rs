use std::collections::{HashSet, VecDeque};

use crate::constants::{tile_cost, MAX_GRID_SIZE, MIN_GRID_SIZE};
use crate::error::EngineError;
use crate::rng::Rng;
use crate::types::{
    BoardTile, CellView, GameMap, GameMode, GridView, ItemKind, Position, TerrainKind,
};

#[derive(Clone, Debug, Default)]
pub struct Cell {
    pub terrain: TerrainKind,
    pub item: Option<ItemKind>,
    pub spawn: bool,
    pub occupant: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Grid {
    size: usize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn filled(size: usize, terrain: TerrainKind) -> Self {
        let cells = (0..size * size)
            .map(|_| Cell {
                terrain,
                ..Cell::default()
            })
            .collect();
        Self { size, cells }
    }

    pub fn from_map(map: &GameMap) -> Result<Self, EngineError> {
        Self::from_board(map.grid_size, &map.board)
    }

    pub fn from_board(size: usize, board: &[Vec<BoardTile>]) -> Result<Self, EngineError> {
        if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&size) {
            return Err(EngineError::MalformedGrid(format!(
                "grid size {size} outside {MIN_GRID_SIZE}..={MAX_GRID_SIZE}"
            )));
        }
        if board.len() != size {
            return Err(EngineError::MalformedGrid(format!(
                "expected {size} rows, found {}",
                board.len()
            )));
        }
        let mut cells = Vec::with_capacity(size * size);
        for (row_idx, row) in board.iter().enumerate() {
            if row.len() != size {
                return Err(EngineError::MalformedGrid(format!(
                    "row {row_idx} has {} tiles, expected {size}",
                    row.len()
                )));
            }
            for tile in row {
                cells.push(Cell {
                    terrain: tile.terrain,
                    item: tile.item,
                    spawn: tile.spawn,
                    occupant: None,
                });
            }
        }
        Ok(Self { size, cells })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.row >= 0
            && pos.col >= 0
            && (pos.row as usize) < self.size
            && (pos.col as usize) < self.size
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(pos.row as usize * self.size + pos.col as usize)
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        self.index(pos).and_then(|idx| self.cells.get(idx))
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        let idx = self.index(pos)?;
        self.cells.get_mut(idx)
    }

    pub fn terrain(&self, pos: Position) -> Option<TerrainKind> {
        self.cell(pos).map(|cell| cell.terrain)
    }

    pub fn set_terrain(&mut self, pos: Position, terrain: TerrainKind) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.terrain = terrain;
        }
    }

    /// Cost to enter `pos`, or `None` when it is out of bounds or impassable terrain.
    pub fn tile_cost(&self, pos: Position) -> Option<u32> {
        self.terrain(pos).and_then(tile_cost)
    }

    pub fn is_wall(&self, pos: Position) -> bool {
        self.terrain(pos) == Some(TerrainKind::Wall)
    }

    pub fn is_closed_door(&self, pos: Position) -> bool {
        self.terrain(pos) == Some(TerrainKind::Door)
    }

    pub fn is_ice(&self, pos: Position) -> bool {
        self.terrain(pos) == Some(TerrainKind::Ice)
    }

    pub fn is_occupied(&self, pos: Position) -> bool {
        self.cell(pos)
            .map(|cell| cell.occupant.is_some())
            .unwrap_or(false)
    }

    pub fn is_walkable(&self, pos: Position) -> bool {
        self.tile_cost(pos).is_some()
    }

    pub fn is_free(&self, pos: Position) -> bool {
        self.is_walkable(pos) && !self.is_occupied(pos)
    }

    pub fn occupant(&self, pos: Position) -> Option<&str> {
        self.cell(pos).and_then(|cell| cell.occupant.as_deref())
    }

    pub fn set_occupant(&mut self, pos: Position, occupant: Option<String>) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.occupant = occupant;
        }
    }

    pub fn item(&self, pos: Position) -> Option<ItemKind> {
        self.cell(pos).and_then(|cell| cell.item)
    }

    pub fn take_item(&mut self, pos: Position) -> Option<ItemKind> {
        self.cell_mut(pos).and_then(|cell| cell.item.take())
    }

    pub fn place_item(&mut self, pos: Position, item: ItemKind) -> bool {
        let Some(cell) = self.cell_mut(pos) else {
            return false;
        };
        if cell.item.is_some() {
            return false;
        }
        cell.item = Some(item);
        true
    }

    pub fn adjacent_doors(&self, pos: Position) -> Vec<Position> {
        pos.neighbors()
            .into_iter()
            .filter(|next| self.terrain(*next).map(|t| t.is_door()).unwrap_or(false))
            .collect()
    }

    pub fn has_adjacent_wall(&self, pos: Position) -> bool {
        pos.neighbors().iter().any(|next| self.is_wall(*next))
    }

    /// Flips a door between open and closed. Returns the new open state, or `None` when `pos`
    /// is not a door or something stands in the doorway.
    pub fn toggle_door(&mut self, pos: Position) -> Option<bool> {
        let cell = self.cell_mut(pos)?;
        if cell.occupant.is_some() {
            return None;
        }
        match cell.terrain {
            TerrainKind::Door => {
                cell.terrain = TerrainKind::OpenedDoor;
                Some(true)
            }
            TerrainKind::OpenedDoor => {
                if cell.item.is_some() {
                    return None;
                }
                cell.terrain = TerrainKind::Door;
                Some(false)
            }
            _ => None,
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.size).flat_map(move |row| {
            (0..self.size).map(move |col| Position::new(row as i32, col as i32))
        })
    }

    pub fn spawn_points(&self) -> Vec<Position> {
        self.positions()
            .filter(|pos| self.cell(*pos).map(|cell| cell.spawn).unwrap_or(false))
            .collect()
    }

    pub fn clear_spawn(&mut self, pos: Position) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.spawn = false;
        }
    }

    pub fn item_positions(&self, item: ItemKind) -> Vec<Position> {
        self.positions()
            .filter(|pos| self.item(*pos) == Some(item))
            .collect()
    }

    pub fn walkable_tile_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.terrain.is_door() || tile_cost(cell.terrain).is_some())
            .count()
    }

    pub fn door_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.terrain.is_door())
            .count()
    }

    /// Breadth-first search for the closest tile accepted by `accept`, walking only through
    /// walkable tiles. `from` itself is a candidate.
    pub fn nearest_tile<F>(&self, from: Position, accept: F) -> Option<Position>
    where
        F: Fn(&Grid, Position) -> bool,
    {
        if !self.in_bounds(from) {
            return None;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(from);
        queue.push_back(from);
        while let Some(current) = queue.pop_front() {
            if accept(self, current) {
                return Some(current);
            }
            for next in current.neighbors() {
                if !self.is_walkable(next) || !visited.insert(next) {
                    continue;
                }
                queue.push_back(next);
            }
        }
        None
    }

    pub fn nearest_free_tile(&self, from: Position) -> Option<Position> {
        self.nearest_tile(from, |grid, pos| grid.is_free(pos))
    }

    pub fn nearest_item_slot(&self, from: Position) -> Option<Position> {
        self.nearest_tile(from, |grid, pos| {
            grid.is_walkable(pos) && grid.item(pos).is_none()
        })
    }

    /// One-time start-of-match pass: resolves `Random` placeholders into concrete items not
    /// already on the board, and strips flags from Classic maps.
    pub fn randomize_for_match(&mut self, mode: GameMode, rng: &mut Rng) {
        let present: HashSet<ItemKind> = self.cells.iter().filter_map(|cell| cell.item).collect();
        let mut pool: Vec<ItemKind> = ItemKind::RANDOM_POOL
            .into_iter()
            .filter(|item| !present.contains(item))
            .collect();
        for cell in &mut self.cells {
            match cell.item {
                Some(ItemKind::Random) => {
                    let item = if pool.is_empty() {
                        ItemKind::RANDOM_POOL[rng.pick_index(ItemKind::RANDOM_POOL.len())]
                    } else {
                        pool.swap_remove(rng.pick_index(pool.len()))
                    };
                    cell.item = Some(item);
                }
                Some(ItemKind::Flag) if mode == GameMode::Classic => {
                    cell.item = None;
                }
                _ => {}
            }
        }
    }

    pub fn to_view(&self) -> GridView {
        let cells = (0..self.size)
            .map(|row| {
                (0..self.size)
                    .map(|col| {
                        let cell = &self.cells[row * self.size + col];
                        CellView {
                            terrain: cell.terrain,
                            item: cell.item,
                        }
                    })
                    .collect()
            })
            .collect();
        GridView {
            size: self.size,
            cells,
        }
    }
}

/// Generates a playable square arena for headless matches: scattered walls, water and ice,
/// a few doors, one starting point per player in the outer ring, and random items. Every
/// non-wall tile is reachable from the first starting point once doors are opened.
pub fn generate_arena(size: usize, mode: GameMode, player_count: usize, seed: u64) -> GameMap {
    let size = size.clamp(MIN_GRID_SIZE.max(6), MAX_GRID_SIZE);
    let mut rng = Rng::new(seed);
    let mut board = vec![vec![BoardTile::default(); size]; size];

    for row in board.iter_mut() {
        for tile in row.iter_mut() {
            let roll = rng.pick_index(100);
            tile.terrain = match roll {
                0..=11 => TerrainKind::Wall,
                12..=19 => TerrainKind::Water,
                20..=27 => TerrainKind::Ice,
                28..=30 => TerrainKind::Door,
                _ => TerrainKind::Default,
            };
        }
    }

    let spawns = spawn_candidates(size)
        .into_iter()
        .take(player_count.max(2))
        .collect::<Vec<_>>();
    for spawn in &spawns {
        let tile = &mut board[spawn.row as usize][spawn.col as usize];
        tile.terrain = TerrainKind::Default;
        tile.spawn = true;
    }
    if let Some(first) = spawns.first().copied() {
        for other in spawns.iter().skip(1) {
            carve_corridor(&mut board, first, *other);
        }
    }

    let reachable = build_reachable_tiles(&board, spawns.first().copied());
    for (row_idx, row) in board.iter_mut().enumerate() {
        for (col_idx, tile) in row.iter_mut().enumerate() {
            if !reachable.contains(&Position::new(row_idx as i32, col_idx as i32)) {
                tile.terrain = TerrainKind::Wall;
            }
        }
    }

    let mut item_slots: Vec<Position> = reachable
        .iter()
        .copied()
        .filter(|pos| {
            let tile = &board[pos.row as usize][pos.col as usize];
            tile.terrain == TerrainKind::Default && !tile.spawn
        })
        .collect();
    item_slots.sort();
    let mut items = vec![ItemKind::Random; (size / 4).max(2)];
    if mode == GameMode::CaptureTheFlag {
        items.push(ItemKind::Flag);
    }
    for item in items {
        if item_slots.is_empty() {
            break;
        }
        let pos = item_slots.swap_remove(rng.pick_index(item_slots.len()));
        board[pos.row as usize][pos.col as usize].item = Some(item);
    }

    GameMap {
        id: format!("arena_{size}_{seed}"),
        name: format!("Generated arena {size}x{size}"),
        grid_size: size,
        board,
        game_mode: mode,
    }
}

fn spawn_candidates(size: usize) -> Vec<Position> {
    let last = size as i32 - 1;
    let mid = size as i32 / 2;
    vec![
        Position::new(0, 0),
        Position::new(last, last),
        Position::new(0, last),
        Position::new(last, 0),
        Position::new(0, mid),
        Position::new(last, mid),
    ]
}

fn carve_corridor(board: &mut [Vec<BoardTile>], from: Position, to: Position) {
    let mut current = from;
    while current != to {
        if current.col != to.col {
            current.col += (to.col - current.col).signum();
        } else {
            current.row += (to.row - current.row).signum();
        }
        let tile = &mut board[current.row as usize][current.col as usize];
        if tile.terrain == TerrainKind::Wall {
            tile.terrain = TerrainKind::Default;
        }
    }
}

fn build_reachable_tiles(board: &[Vec<BoardTile>], start: Option<Position>) -> HashSet<Position> {
    let mut out = HashSet::new();
    let Some(start) = start else {
        return out;
    };
    let size = board.len() as i32;
    let passable = |pos: Position| {
        pos.row >= 0
            && pos.col >= 0
            && pos.row < size
            && pos.col < size
            && board[pos.row as usize][pos.col as usize].terrain != TerrainKind::Wall
    };
    if !passable(start) {
        return out;
    }

    let mut queue = VecDeque::new();
    out.insert(start);
    queue.push_back(start);
    while let Some(current) = queue.pop_front() {
        for next in current.neighbors() {
            if passable(next) && out.insert(next) {
                queue.push_back(next);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(size: usize) -> Vec<Vec<BoardTile>> {
        vec![vec![BoardTile::default(); size]; size]
    }

    #[test]
    fn non_square_boards_are_rejected() {
        let mut rows = board(4);
        rows[2].pop();
        assert!(matches!(
            Grid::from_board(4, &rows),
            Err(EngineError::MalformedGrid(_))
        ));
        assert!(Grid::from_board(5, &board(4)).is_err());
        assert!(Grid::from_board(1, &board(1)).is_err());
    }

    #[test]
    fn terrain_costs_follow_tile_kind() {
        let mut rows = board(3);
        rows[0][1].terrain = TerrainKind::Ice;
        rows[0][2].terrain = TerrainKind::Water;
        rows[1][0].terrain = TerrainKind::Wall;
        rows[1][1].terrain = TerrainKind::Door;
        rows[1][2].terrain = TerrainKind::OpenedDoor;
        let grid = Grid::from_board(3, &rows).expect("valid board");

        assert_eq!(grid.tile_cost(Position::new(0, 0)), Some(1));
        assert_eq!(grid.tile_cost(Position::new(0, 1)), Some(0));
        assert_eq!(grid.tile_cost(Position::new(0, 2)), Some(2));
        assert_eq!(grid.tile_cost(Position::new(1, 0)), None);
        assert_eq!(grid.tile_cost(Position::new(1, 1)), None);
        assert_eq!(grid.tile_cost(Position::new(1, 2)), Some(1));
        assert_eq!(grid.tile_cost(Position::new(-1, 0)), None);
        assert_eq!(grid.tile_cost(Position::new(0, 3)), None);
    }

    #[test]
    fn unknown_terrain_deserializes_as_zero_cost() {
        let tile: BoardTile =
            serde_json::from_str(r#"{"terrain":"lava"}"#).expect("tile should parse");
        assert_eq!(tile.terrain, TerrainKind::Unknown);
        assert_eq!(tile_cost(tile.terrain), Some(0));
    }

    #[test]
    fn doors_toggle_only_when_doorway_is_clear() {
        let mut grid = Grid::filled(3, TerrainKind::Default);
        let door = Position::new(1, 1);
        grid.set_terrain(door, TerrainKind::Door);

        assert_eq!(grid.toggle_door(door), Some(true));
        assert!(grid.is_walkable(door));
        grid.set_occupant(door, Some("p1".to_string()));
        assert_eq!(grid.toggle_door(door), None);
        grid.set_occupant(door, None);
        assert_eq!(grid.toggle_door(door), Some(false));
        assert!(grid.is_closed_door(door));
        assert_eq!(grid.toggle_door(Position::new(0, 0)), None);
    }

    #[test]
    fn adjacency_helpers_report_walls_and_doors() {
        let mut grid = Grid::filled(3, TerrainKind::Default);
        grid.set_terrain(Position::new(0, 1), TerrainKind::Wall);
        grid.set_terrain(Position::new(1, 0), TerrainKind::Door);
        assert!(grid.has_adjacent_wall(Position::new(1, 1)));
        assert_eq!(
            grid.adjacent_doors(Position::new(1, 1)),
            vec![Position::new(1, 0)]
        );
        assert!(!grid.has_adjacent_wall(Position::new(2, 2)));
    }

    #[test]
    fn nearest_free_tile_skips_occupied_cells() {
        let mut grid = Grid::filled(3, TerrainKind::Default);
        let origin = Position::new(0, 0);
        grid.set_occupant(origin, Some("a".to_string()));
        let found = grid.nearest_free_tile(origin).expect("free tile exists");
        assert!(origin.is_adjacent(found));
    }

    #[test]
    fn randomize_resolves_placeholders_and_strips_classic_flags() {
        for seed in 0..50u64 {
            let mut rows = board(4);
            rows[0][0].item = Some(ItemKind::Random);
            rows[0][1].item = Some(ItemKind::Random);
            rows[0][2].item = Some(ItemKind::Phoenix);
            rows[3][3].item = Some(ItemKind::Flag);
            let mut grid = Grid::from_board(4, &rows).expect("valid board");
            let mut rng = Rng::new(seed);
            grid.randomize_for_match(GameMode::Classic, &mut rng);

            let first = grid.item(Position::new(0, 0)).expect("resolved");
            let second = grid.item(Position::new(0, 1)).expect("resolved");
            assert_ne!(first, ItemKind::Random);
            assert_ne!(second, ItemKind::Random);
            assert_ne!(first, second, "seed={seed}");
            assert_ne!(first, ItemKind::Phoenix);
            assert_eq!(grid.item(Position::new(3, 3)), None);
        }
    }

    #[test]
    fn generated_arenas_are_connected_and_have_spawns() {
        for seed in 0..100u64 {
            let map = generate_arena(12, GameMode::CaptureTheFlag, 4, seed);
            let mut grid = Grid::from_map(&map).expect("generated map is valid");
            let spawns = grid.spawn_points();
            assert_eq!(spawns.len(), 4, "seed={seed}");
            assert_eq!(grid.item_positions(ItemKind::Flag).len(), 1);

            for pos in grid.positions().collect::<Vec<_>>() {
                if grid.is_closed_door(pos) {
                    grid.toggle_door(pos);
                }
            }
            for spawn in &spawns {
                let found = grid.nearest_tile(spawns[0], |_, pos| pos == *spawn);
                assert_eq!(found, Some(*spawn), "seed={seed}");
            }
        }
    }
}
