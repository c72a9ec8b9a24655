use super::*;

impl GameRoom {
    /// Orders the participants by `maxSpeed`, fastest first, with equal speeds in random order,
    /// and opens the first turn.
    pub(super) fn set_first_turn(&mut self) -> Option<String> {
        if self.players.is_empty() {
            return None;
        }
        self.rng.shuffle(&mut self.players);
        self.players
            .sort_by(|a, b| b.stats.max_speed.cmp(&a.stats.max_speed));
        self.begin_turn(0)
    }

    pub(super) fn begin_turn(&mut self, idx: usize) -> Option<String> {
        let player = self.players.get_mut(idx)?;
        player.stats.speed = player.stats.max_speed;
        let player_id = player.id.clone();
        let speed = player.stats.speed;
        self.current_turn = Some(player_id.clone());
        self.actions_left = ACTIONS_PER_TURN;
        self.ai_steps = 0;
        self.stats.total_turns += 1;
        self.events.push(RoomEvent::TurnChanged {
            player_id: player_id.clone(),
            speed,
        });
        Some(player_id)
    }

    pub fn next_turn(&mut self) -> Option<String> {
        if self.phase != RoomPhase::InProgress || self.players.is_empty() {
            return None;
        }
        let next = match self
            .current_turn
            .as_deref()
            .and_then(|id| self.player_index(id))
        {
            Some(idx) => (idx + 1) % self.players.len(),
            None => 0,
        };
        self.begin_turn(next)
    }

    pub fn end_turn(&mut self, player_id: &str) -> bool {
        if self.combat.is_some() || !self.holds_turn(player_id) {
            return false;
        }
        self.next_turn().is_some()
    }

    /// External turn clock. Ends the active turn, or during combat makes the combat-turn owner
    /// attack.
    pub fn force_end_turn(&mut self) -> bool {
        if self.phase != RoomPhase::InProgress {
            return false;
        }
        if let Some(owner) = self.combat.as_ref().map(|combat| combat.turn().to_string()) {
            return self.combat_attack(&owner);
        }
        self.next_turn().is_some()
    }

    pub fn handle_player_quit(&mut self, player_id: &str) -> bool {
        if self.player_index(player_id).is_none() {
            return false;
        }
        if self.phase == RoomPhase::InProgress {
            let opponent = self
                .combat
                .as_ref()
                .and_then(|combat| combat.opponent_of(player_id))
                .map(str::to_string);
            if let Some(opponent) = opponent {
                self.finish_combat_victory(&opponent, player_id, true);
            }
        }

        let Some(idx) = self.player_index(player_id) else {
            return false;
        };
        let was_active = self.current_turn.as_deref() == Some(player_id);
        let player = self.players.remove(idx);
        if let Some(pos) = player.position {
            if let Some(grid) = self.grid.as_mut() {
                grid.set_occupant(pos, None);
            }
            self.scatter_items(&player.id, pos, player.inventory);
        }
        self.events.push(RoomEvent::PlayerLeft {
            player_id: player_id.to_string(),
        });
        if self.host_id.as_deref() == Some(player_id) {
            self.host_id = self
                .players
                .iter()
                .find(|p| p.kind == PlayerKind::Human)
                .or_else(|| self.players.first())
                .map(|p| p.id.clone());
        }

        if self.phase != RoomPhase::InProgress {
            return true;
        }
        match self.players.len() {
            0 => self.end_game(None, GameEndReason::Abandoned),
            1 => {
                let winner = self.players[0].id.clone();
                self.end_game(Some(winner), GameEndReason::LastPlayerStanding);
            }
            _ if !self.players.iter().any(|p| p.kind == PlayerKind::Human) => {
                self.end_game(None, GameEndReason::Abandoned);
            }
            len => {
                if was_active {
                    self.current_turn = None;
                    self.begin_turn(idx % len);
                }
            }
        }
        true
    }
}
