//! Cost-bounded movement search over the arena grid.
//!
//! Frontier order is (cumulative cost, direction changes), so among equal-cost routes the
//! straightest one wins. Search states carry the heading they arrived with; a position is
//! only re-expanded from another heading when that arrival could still produce fewer turns.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::Serialize;

use crate::grid::Grid;
use crate::types::{Direction, Position, StatBlock};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mover {
    pub position: Option<Position>,
    pub speed: Option<i32>,
}

impl Mover {
    pub fn new(position: Position, speed: i32) -> Self {
        Self {
            position: Some(position),
            speed: Some(speed),
        }
    }

    /// Planning mover with no practical movement limit.
    pub fn unbounded(position: Position) -> Self {
        Self::new(position, i32::MAX)
    }

    fn budget(&self) -> u32 {
        self.speed.unwrap_or(0).max(0) as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathTarget {
    /// The goal tile must be stood on.
    Exact(Position),
    /// The goal tile cannot be entered (an opponent); stop on the cheapest free neighbour.
    Adjacent(Position),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub through_closed_doors: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Path {
    pub positions: Vec<Position>,
    pub cost: u32,
    #[serde(rename = "turnChanges")]
    pub turn_changes: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathResult {
    pub reachable_tiles: Vec<Position>,
    pub path: Option<Path>,
}

type StateKey = (Position, Option<Direction>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FrontierNode {
    cost: u32,
    turns: u32,
    seq: u64,
    pos: Position,
    heading: Option<Direction>,
}

impl Ord for FrontierNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the cheapest, straightest, oldest node pops first.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.turns.cmp(&self.turns))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn find_paths(grid: &Grid, mover: Mover, target: Option<Position>) -> PathResult {
    search(
        grid,
        mover,
        target.map(PathTarget::Exact),
        SearchOptions::default(),
    )
}

pub fn search(
    grid: &Grid,
    mover: Mover,
    target: Option<PathTarget>,
    options: SearchOptions,
) -> PathResult {
    let Some(origin) = mover.position else {
        return PathResult::default();
    };
    if let Some(PathTarget::Adjacent(goal)) = target {
        if origin.is_adjacent(goal) {
            let reachable = search(grid, mover, None, options).reachable_tiles;
            return PathResult {
                reachable_tiles: reachable,
                path: Some(Path {
                    positions: Vec::new(),
                    cost: 0,
                    turn_changes: 0,
                }),
            };
        }
    }
    let budget = mover.budget();
    if budget == 0 {
        return PathResult::default();
    }

    let mut frontier = BinaryHeap::new();
    let mut best: HashMap<StateKey, (u32, u32)> = HashMap::new();
    let mut parents: HashMap<StateKey, StateKey> = HashMap::new();
    let mut closed: HashSet<StateKey> = HashSet::new();
    let mut closed_positions: HashMap<Position, (u32, u32)> = HashMap::new();
    let mut reachable = Vec::new();
    let mut target_state: Option<StateKey> = None;
    let mut seq = 0u64;

    best.insert((origin, None), (0, 0));
    frontier.push(FrontierNode {
        cost: 0,
        turns: 0,
        seq,
        pos: origin,
        heading: None,
    });

    while let Some(node) = frontier.pop() {
        let key = (node.pos, node.heading);
        if !closed.insert(key) {
            continue;
        }
        if !closed_positions.contains_key(&node.pos) {
            closed_positions.insert(node.pos, (node.cost, node.turns));
            if node.pos != origin {
                reachable.push(node.pos);
            }
        }
        if target_state.is_none() && node.pos != origin && matches_target(target, node.pos) {
            target_state = Some(key);
        }

        for dir in Direction::ALL {
            let next = node.pos.step(dir);
            let Some(step_cost) = step_cost(grid, next, options) else {
                continue;
            };
            if grid.is_occupied(next) {
                continue;
            }
            let cost = node.cost.saturating_add(step_cost);
            if cost > budget {
                continue;
            }
            let turns = node.turns + u32::from(node.heading.is_some_and(|h| h != dir));
            if let Some(&(closed_cost, closed_turns)) = closed_positions.get(&next) {
                if closed_cost < cost || (closed_cost == cost && closed_turns + 1 <= turns) {
                    continue;
                }
            }
            let next_key = (next, Some(dir));
            if closed.contains(&next_key) {
                continue;
            }
            if best
                .get(&next_key)
                .is_some_and(|&known| known <= (cost, turns))
            {
                continue;
            }
            best.insert(next_key, (cost, turns));
            parents.insert(next_key, key);
            seq += 1;
            frontier.push(FrontierNode {
                cost,
                turns,
                seq,
                pos: next,
                heading: Some(dir),
            });
        }
    }

    let path = target_state.map(|state| rebuild_path(&parents, &best, origin, state));
    PathResult {
        reachable_tiles: reachable,
        path,
    }
}

fn matches_target(target: Option<PathTarget>, pos: Position) -> bool {
    match target {
        None => false,
        Some(PathTarget::Exact(goal)) => pos == goal,
        Some(PathTarget::Adjacent(goal)) => pos.is_adjacent(goal),
    }
}

fn step_cost(grid: &Grid, pos: Position, options: SearchOptions) -> Option<u32> {
    if options.through_closed_doors && grid.is_closed_door(pos) {
        return Some(1);
    }
    grid.tile_cost(pos)
}

fn rebuild_path(
    parents: &HashMap<StateKey, StateKey>,
    best: &HashMap<StateKey, (u32, u32)>,
    origin: Position,
    target: StateKey,
) -> Path {
    let (cost, turn_changes) = best.get(&target).copied().unwrap_or((0, 0));
    let mut positions = Vec::new();
    let mut current = target;
    while current.0 != origin || current.1.is_some() {
        positions.push(current.0);
        match parents.get(&current) {
            Some(parent) => current = *parent,
            None => break,
        }
    }
    positions.reverse();
    Path {
        positions,
        cost,
        turn_changes,
    }
}

/// Deducts the cost of entering `position` from the mover's remaining speed.
pub fn decrease_speed(stats: Option<&mut StatBlock>, grid: &Grid, position: Position) {
    let Some(stats) = stats else {
        return;
    };
    let cost = grid.tile_cost(position).unwrap_or(0) as i32;
    stats.speed = (stats.speed - cost).max(0);
}
