use super::*;

/// One decision of an autonomous player. Each variant maps onto the same room method a human
/// intent would call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VirtualAction {
    Attack { target_id: String },
    Move { to: Position },
    ToggleDoor { position: Position },
    Escape,
    EndTurn,
}

impl GameRoom {
    /// The virtual player expected to act next: the combat-turn owner during combat, the active
    /// player otherwise.
    pub fn virtual_actor(&self) -> Option<&str> {
        if self.phase != RoomPhase::InProgress {
            return None;
        }
        let actor = match &self.combat {
            Some(combat) => combat.turn(),
            None => self.current_turn.as_deref()?,
        };
        let player = self.player(actor)?;
        player.is_virtual().then_some(player.id.as_str())
    }

    /// Plans and applies a single step for the pending virtual player.
    pub fn run_virtual_step(&mut self) -> Option<VirtualAction> {
        let actor = self.virtual_actor()?.to_string();
        let action = self.plan_virtual_action(&actor)?;
        let in_combat = self.combat.is_some();
        if !in_combat {
            self.ai_steps += 1;
        }
        let applied = match &action {
            VirtualAction::Attack { target_id } => self.attack(&actor, target_id),
            VirtualAction::Move { to } => self.move_player(&actor, *to),
            VirtualAction::ToggleDoor { position } => self.toggle_door(&actor, *position),
            VirtualAction::Escape => self.escape(&actor),
            VirtualAction::EndTurn => self.end_turn(&actor),
        };
        if !applied && !in_combat && self.holds_turn(&actor) {
            self.next_turn();
        }
        Some(action)
    }

    pub fn plan_virtual_action(&self, player_id: &str) -> Option<VirtualAction> {
        let player = self.player(player_id)?;
        let behavior = player.kind.behavior()?;

        if let Some(combat) = &self.combat {
            if combat.turn() != player_id {
                return None;
            }
            let escapes_left = combat.escapes_left(player_id);
            return Some(match behavior {
                Behavior::Defensive if escapes_left > 0 => VirtualAction::Escape,
                _ => VirtualAction::Attack {
                    target_id: combat.defender_id().to_string(),
                },
            });
        }

        if !self.holds_turn(player_id) {
            return None;
        }
        // A spent action (door or combat) closes the turn.
        if self.ai_steps >= self.ai_step_limit() || self.actions_left == 0 {
            return Some(VirtualAction::EndTurn);
        }
        let grid = self.grid.as_ref()?;
        let position = player.position?;

        if let Some(target_id) = self.adjacent_target(player, behavior) {
            return Some(VirtualAction::Attack { target_id });
        }

        for goal in self.goal_candidates(player, behavior, grid) {
            let planned = search(
                grid,
                Mover::unbounded(position),
                Some(goal),
                SearchOptions {
                    through_closed_doors: true,
                },
            );
            let Some(next) = planned.path.and_then(|path| path.positions.first().copied()) else {
                continue;
            };
            return Some(self.step_toward(player, grid, next));
        }
        Some(VirtualAction::EndTurn)
    }

    fn step_toward(&self, player: &Player, grid: &Grid, next: Position) -> VirtualAction {
        if grid.is_closed_door(next) {
            return VirtualAction::ToggleDoor { position: next };
        }
        match grid.tile_cost(next) {
            Some(cost) if cost as i32 <= player.stats.speed => VirtualAction::Move { to: next },
            _ => VirtualAction::EndTurn,
        }
    }

    fn adjacent_target(&self, player: &Player, behavior: Behavior) -> Option<String> {
        let position = player.position?;
        let mut adjacent: Vec<&Player> = self
            .opponents(player)
            .filter(|other| other.position.is_some_and(|pos| pos.is_adjacent(position)))
            .collect();
        adjacent.sort_by_key(|other| !other.has_item(ItemKind::Flag));
        let target = adjacent.into_iter().find(|other| match behavior {
            Behavior::Aggressive => true,
            Behavior::Defensive => other.has_item(ItemKind::Flag),
        })?;
        Some(target.id.clone())
    }

    /// Goals in priority order; the caller takes the first one with a route.
    fn goal_candidates(&self, player: &Player, behavior: Behavior, grid: &Grid) -> Vec<PathTarget> {
        let Some(position) = player.position else {
            return Vec::new();
        };
        let ctf = self.mode == GameMode::CaptureTheFlag;
        let by_distance = |mut tiles: Vec<Position>| {
            tiles.sort_by_key(|tile| (tile.manhattan(position), *tile));
            tiles
        };
        let mut goals = Vec::new();

        if ctf && player.has_item(ItemKind::Flag) {
            if let Some(spawn) = player.spawn.filter(|spawn| *spawn != position) {
                goals.push(PathTarget::Exact(spawn));
            }
        }
        if behavior == Behavior::Defensive {
            if let Some(refuge) = self.flee_tile(player, grid) {
                goals.push(PathTarget::Exact(refuge));
            }
        }
        if ctf && behavior == Behavior::Aggressive {
            let carriers = self
                .opponents(player)
                .filter(|other| other.has_item(ItemKind::Flag))
                .filter_map(|other| other.position)
                .collect();
            goals.extend(by_distance(carriers).into_iter().map(PathTarget::Adjacent));
        }

        let wanted = grid
            .positions()
            .filter(|tile| {
                grid.item(*tile)
                    .is_some_and(|item| behavior.wants_item(item) && !player.has_item(item))
            })
            .collect();
        goals.extend(by_distance(wanted).into_iter().map(PathTarget::Exact));

        if ctf {
            let flags = grid.item_positions(ItemKind::Flag);
            goals.extend(by_distance(flags).into_iter().map(PathTarget::Exact));
        }
        if behavior == Behavior::Aggressive {
            let enemies = self
                .opponents(player)
                .filter_map(|other| other.position)
                .collect();
            goals.extend(by_distance(enemies).into_iter().map(PathTarget::Adjacent));
        }
        if let Some(unexplored) =
            grid.nearest_tile(position, |g, tile| g.is_free(tile) && !player.has_visited(tile))
        {
            goals.push(PathTarget::Exact(unexplored));
        }
        goals
    }

    /// A reachable tile this turn that maximises the distance to the nearest opponent, when an
    /// opponent is adjacent and moving actually helps.
    fn flee_tile(&self, player: &Player, grid: &Grid) -> Option<Position> {
        let position = player.position?;
        let threats: Vec<Position> = self
            .opponents(player)
            .filter_map(|other| other.position)
            .collect();
        let distance_to_threat = |tile: Position| {
            threats
                .iter()
                .map(|threat| threat.manhattan(tile))
                .min()
                .unwrap_or(u32::MAX)
        };
        let current = distance_to_threat(position);
        if current > 1 {
            return None;
        }
        let reachable = find_paths(grid, Mover::new(position, player.stats.speed), None);
        reachable
            .reachable_tiles
            .into_iter()
            .map(|tile| (distance_to_threat(tile), tile))
            .filter(|(distance, _)| *distance > current)
            .max_by_key(|(distance, tile)| (*distance, std::cmp::Reverse(*tile)))
            .map(|(_, tile)| tile)
    }

    fn opponents<'a>(&'a self, player: &'a Player) -> impl Iterator<Item = &'a Player> + 'a {
        self.players.iter().filter(move |other| other.id != player.id)
    }

    fn ai_step_limit(&self) -> u32 {
        let size = self.grid.as_ref().map(Grid::size).unwrap_or(0) as u32;
        (size * size * 2).max(8)
    }
}
