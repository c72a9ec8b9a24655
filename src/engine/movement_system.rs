use super::*;

impl GameRoom {
    /// Walks the active player along the cheapest path to `target` within its remaining speed.
    /// Picking up an item ends the walk on that tile.
    pub fn move_player(&mut self, player_id: &str, target: Position) -> bool {
        if self.combat.is_some() || !self.holds_turn(player_id) {
            return false;
        }
        let Some(idx) = self.player_index(player_id) else {
            return false;
        };
        let Some(grid) = self.grid.as_ref() else {
            return false;
        };
        let player = &self.players[idx];
        let mover = Mover {
            position: player.position,
            speed: Some(player.stats.speed),
        };
        let Some(path) = find_paths(grid, mover, Some(target)).path else {
            return false;
        };
        for step in path.positions {
            if !self.step_player(idx, step) {
                break;
            }
        }
        true
    }

    /// Returns whether the walk may continue past this tile.
    fn step_player(&mut self, idx: usize, to: Position) -> bool {
        let Some(grid) = self.grid.as_mut() else {
            return false;
        };
        let player = &mut self.players[idx];
        let Some(from) = player.position else {
            return false;
        };
        grid.set_occupant(from, None);
        grid.set_occupant(to, Some(player.id.clone()));
        player.position = Some(to);
        decrease_speed(Some(&mut player.stats), grid, to);
        player.visit(to);
        self.stats.visited.insert(to);
        self.events.push(RoomEvent::PlayerMoved {
            player_id: player.id.clone(),
            from,
            to,
            remaining_speed: player.stats.speed,
        });

        let picked_up = self.pick_up(idx, to);
        if self.check_flag_capture(idx) {
            return false;
        }
        !picked_up
    }

    fn pick_up(&mut self, idx: usize, pos: Position) -> bool {
        let Some(grid) = self.grid.as_mut() else {
            return false;
        };
        let Some(item) = grid.take_item(pos) else {
            return false;
        };
        let player = &mut self.players[idx];
        if player.inventory.len() >= INVENTORY_CAPACITY {
            let Some(oldest) = player.inventory.iter().position(|held| !held.is_critical()) else {
                grid.place_item(pos, item);
                return false;
            };
            let dropped = player.inventory.remove(oldest);
            grid.place_item(pos, dropped);
            self.events.push(RoomEvent::ItemDropped {
                player_id: player.id.clone(),
                item: dropped,
                position: pos,
            });
        }
        player.inventory.push(item);
        player.match_stats.items_collected += 1;
        if item == ItemKind::Flag {
            self.stats.flag_holders.insert(player.id.clone());
        }
        self.events.push(RoomEvent::ItemPickedUp {
            player_id: player.id.clone(),
            item,
            position: pos,
        });
        true
    }

    fn check_flag_capture(&mut self, idx: usize) -> bool {
        if self.mode != GameMode::CaptureTheFlag || self.phase != RoomPhase::InProgress {
            return false;
        }
        let player = &self.players[idx];
        if !player.has_item(ItemKind::Flag) || player.position.is_none() {
            return false;
        }
        if player.position != player.spawn {
            return false;
        }
        let winner = player.id.clone();
        self.end_game(Some(winner), GameEndReason::FlagCaptured);
        true
    }

    /// Drops `items` on `origin` and the closest free item slots around it.
    pub(super) fn scatter_items(&mut self, owner_id: &str, origin: Position, items: Vec<ItemKind>) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        for item in items {
            let Some(slot) = grid.nearest_item_slot(origin) else {
                break;
            };
            grid.place_item(slot, item);
            self.events.push(RoomEvent::ItemDropped {
                player_id: owner_id.to_string(),
                item,
                position: slot,
            });
        }
    }

    /// Opens or closes a door orthogonally adjacent to the active player. Spends the turn's
    /// action.
    pub fn toggle_door(&mut self, player_id: &str, position: Position) -> bool {
        if self.combat.is_some() || !self.holds_turn(player_id) || self.actions_left == 0 {
            return false;
        }
        let Some(from) = self.player(player_id).and_then(|p| p.position) else {
            return false;
        };
        if !from.is_adjacent(position) {
            return false;
        }
        let Some(grid) = self.grid.as_mut() else {
            return false;
        };
        let Some(open) = grid.toggle_door(position) else {
            return false;
        };
        self.actions_left -= 1;
        self.stats.doors_toggled.insert(position);
        self.events.push(RoomEvent::DoorToggled { position, open });
        true
    }

    /// Debug-only relocation of the active player onto any free walkable tile.
    pub fn teleport(&mut self, player_id: &str, position: Position) -> bool {
        if !self.debug || self.combat.is_some() || !self.holds_turn(player_id) {
            return false;
        }
        let Some(idx) = self.player_index(player_id) else {
            return false;
        };
        let Some(grid) = self.grid.as_mut() else {
            return false;
        };
        if !grid.is_free(position) {
            return false;
        }
        let player = &mut self.players[idx];
        let Some(from) = player.position else {
            return false;
        };
        grid.set_occupant(from, None);
        grid.set_occupant(position, Some(player.id.clone()));
        player.position = Some(position);
        player.visit(position);
        self.stats.visited.insert(position);
        self.events.push(RoomEvent::PlayerMoved {
            player_id: player.id.clone(),
            from,
            to: position,
            remaining_speed: player.stats.speed,
        });
        self.pick_up(idx, position);
        self.check_flag_capture(idx);
        true
    }
}
