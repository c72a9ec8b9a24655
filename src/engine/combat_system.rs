use super::*;

impl GameRoom {
    /// Attack intent. Opens a combat against an adjacent player, or resolves one round when the
    /// sender owns the running combat's turn.
    pub fn attack(&mut self, player_id: &str, target_id: &str) -> bool {
        if self.phase != RoomPhase::InProgress {
            return false;
        }
        match &self.combat {
            Some(combat) => {
                if combat.turn() != player_id || combat.defender_id() != target_id {
                    return false;
                }
                self.combat_attack(player_id)
            }
            None => self.start_combat(player_id, target_id),
        }
    }

    pub fn start_combat(&mut self, attacker_id: &str, defender_id: &str) -> bool {
        if attacker_id == defender_id || self.combat.is_some() {
            return false;
        }
        if !self.holds_turn(attacker_id) || self.actions_left == 0 {
            return false;
        }
        let (Some(attacker), Some(defender)) = (self.player(attacker_id), self.player(defender_id))
        else {
            return false;
        };
        let adjacent = match (attacker.position, defender.position) {
            (Some(a), Some(d)) => a.is_adjacent(d),
            _ => false,
        };
        if !adjacent {
            return false;
        }

        let defender_first = defender.stats.max_speed > attacker.stats.max_speed;
        let mut combat = CombatState {
            attacker: Combatant::new(attacker),
            defender: Combatant::new(defender),
            initiator: attacker_id.to_string(),
        };
        if defender_first {
            combat.flip();
        }
        self.actions_left -= 1;
        for id in [attacker_id, defender_id] {
            if let Some(player) = self.player_mut(id) {
                player.match_stats.combats += 1;
            }
        }
        self.events.push(RoomEvent::CombatStarted {
            attacker_id: attacker_id.to_string(),
            defender_id: defender_id.to_string(),
            turn_id: combat.turn().to_string(),
        });
        self.combat = Some(combat);
        true
    }

    /// Resolves one attack round for the combat-turn owner.
    pub fn combat_attack(&mut self, player_id: &str) -> bool {
        let Some(mut combat) = self.combat.take() else {
            return false;
        };
        let indices = (
            self.player_index(&combat.attacker.id),
            self.player_index(&combat.defender.id),
        );
        let (Some(att), Some(def)) = indices else {
            self.combat = Some(combat);
            return false;
        };
        if combat.turn() != player_id {
            self.combat = Some(combat);
            return false;
        }

        let attack = self.effective_attack(att);
        let defense = self.effective_defense(def);
        let attack_faces = combat.attacker.snapshot.attack;
        let defense_faces = combat.defender.snapshot.defense;
        let attack_roll = if self.debug || self.players[att].has_item(ItemKind::LoadedDie) {
            attack_faces
        } else {
            self.rng.roll(attack_faces)
        };
        let defense_roll = if self.players[att].has_item(ItemKind::Hex) && !combat.attacker.hex_used
        {
            combat.attacker.hex_used = true;
            1
        } else if self.debug {
            defense_faces
        } else {
            self.rng.roll(defense_faces)
        };

        let damage = (defense_roll + defense) - (attack_roll + attack);
        if damage < 0 {
            let dealt = damage.unsigned_abs();
            self.players[def].stats.life -= dealt as i32;
            self.players[att].match_stats.damage_dealt += dealt;
            self.players[def].match_stats.damage_taken += dealt;
        }

        let mut revived = false;
        if self.players[def].stats.life <= 0
            && self.players[def].has_item(ItemKind::Phoenix)
            && !combat.defender.revive_used
        {
            combat.defender.revive_used = true;
            self.players[def].stats.life = 1;
            revived = true;
        }
        let defender_life = self.players[def].stats.life;
        self.events.push(RoomEvent::CombatRoll {
            attacker_id: combat.attacker.id.clone(),
            defender_id: combat.defender.id.clone(),
            attack_roll,
            defense_roll,
            damage,
            defender_life,
            revived,
        });

        if defender_life <= 0 {
            let winner = combat.attacker.id.clone();
            let loser = combat.defender.id.clone();
            self.combat = Some(combat);
            self.finish_combat_victory(&winner, &loser, false);
        } else {
            combat.flip();
            self.combat = Some(combat);
        }
        true
    }

    pub fn escape(&mut self, player_id: &str) -> bool {
        let Some(combat) = self.combat.as_mut() else {
            return false;
        };
        if combat.turn() != player_id || combat.attacker.escapes_left == 0 {
            return false;
        }
        if self.rng.chance(self.options.escape_probability) {
            let Some(combat) = self.combat.take() else {
                return false;
            };
            self.restore_snapshots(&combat);
            if let Some(player) = self.player_mut(player_id) {
                player.match_stats.evasions += 1;
            }
            self.events.push(RoomEvent::CombatResolved {
                outcome: CombatOutcome::Escaped {
                    player_id: player_id.to_string(),
                },
            });
        } else {
            combat.attacker.escapes_left -= 1;
            let attempts_left = combat.attacker.escapes_left;
            combat.flip();
            self.events.push(RoomEvent::EscapeFailed {
                player_id: player_id.to_string(),
                attempts_left,
            });
        }
        true
    }

    /// Closes the running combat in favour of `winner_id`. A forfeit leaves the loser where it
    /// stands since it is about to leave the room.
    pub(super) fn finish_combat_victory(&mut self, winner_id: &str, loser_id: &str, forfeit: bool) {
        let Some(combat) = self.combat.take() else {
            return;
        };
        self.restore_snapshots(&combat);
        let mut winner_wins = 0;
        if let Some(winner) = self.player_mut(winner_id) {
            winner.match_stats.victories += 1;
            winner.wins += 1;
            winner_wins = winner.wins;
        }
        if let Some(loser) = self.player_mut(loser_id) {
            loser.match_stats.defeats += 1;
        }
        if !forfeit {
            self.respawn_after_defeat(loser_id);
        }
        self.events.push(RoomEvent::CombatResolved {
            outcome: CombatOutcome::Victory {
                winner_id: winner_id.to_string(),
                loser_id: loser_id.to_string(),
                forfeit,
            },
        });

        if self.mode == GameMode::Classic && winner_wins >= WINS_TO_END {
            self.end_game(Some(winner_id.to_string()), GameEndReason::Victories);
            return;
        }
        if !forfeit && self.current_turn.as_deref() == Some(loser_id) {
            self.next_turn();
        }
    }

    fn restore_snapshots(&mut self, combat: &CombatState) {
        for combatant in [&combat.attacker, &combat.defender] {
            if let Some(player) = self.player_mut(&combatant.id) {
                player.stats = combatant.snapshot;
            }
        }
    }

    fn respawn_after_defeat(&mut self, loser_id: &str) {
        let Some(idx) = self.player_index(loser_id) else {
            return;
        };
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        let player = &mut self.players[idx];
        let fallen = player.position;
        let items = mem::take(&mut player.inventory);
        if let Some(pos) = fallen {
            grid.set_occupant(pos, None);
        }
        let respawn = player
            .spawn
            .filter(|spawn| grid.is_free(*spawn))
            .or_else(|| player.spawn.and_then(|spawn| grid.nearest_free_tile(spawn)))
            .or(fallen);
        if let Some(to) = respawn {
            grid.set_occupant(to, Some(player.id.clone()));
            player.position = Some(to);
            player.visit(to);
            self.stats.visited.insert(to);
            if let Some(from) = fallen {
                self.events.push(RoomEvent::PlayerMoved {
                    player_id: player.id.clone(),
                    from,
                    to,
                    remaining_speed: player.stats.speed,
                });
            }
        }
        if let Some(pos) = fallen {
            self.scatter_items(loser_id, pos, items);
        }
    }

    fn effective_attack(&self, idx: usize) -> i32 {
        let player = &self.players[idx];
        let mut value = player.stats.attack.min(BASE_STAT);
        if player.has_item(ItemKind::AttackBoost) {
            value += ITEM_STAT_BONUS;
        }
        if self.stands_on_ice(player) {
            value -= ICE_PENALTY;
        }
        value
    }

    fn effective_defense(&self, idx: usize) -> i32 {
        let player = &self.players[idx];
        let mut value = player.stats.defense.min(BASE_STAT);
        if player.has_item(ItemKind::DefenseBoost) {
            value += ITEM_STAT_BONUS;
        }
        if self.stands_on_ice(player) {
            value -= ICE_PENALTY;
        }
        value
    }

    fn stands_on_ice(&self, player: &Player) -> bool {
        match (self.grid.as_ref(), player.position) {
            (Some(grid), Some(pos)) => grid.is_ice(pos),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::types::{StatBonus, TerrainKind};

    fn duel(escape_probability: f64, seed: u64) -> GameRoom {
        let map = open_map(5, &[Position::new(0, 0), Position::new(4, 4)], GameMode::Classic);
        let mut room = started_room(vec![human("a"), human("b")], &map, escape_probability, seed);
        place(&mut room, "a", Position::new(2, 1));
        place(&mut room, "b", Position::new(2, 2));
        give_turn(&mut room, "a");
        room
    }

    #[test]
    fn debug_dice_on_equal_stats_deal_no_damage_and_flip() {
        let mut room = duel(0.4, 1);
        room.debug = true;
        assert!(room.attack("a", "b"));
        assert_eq!(room.combat().map(|c| c.turn()), Some("a"));
        room.drain_events();
        assert!(room.attack("a", "b"));
        let events = room.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            RoomEvent::CombatRoll {
                attack_roll: 4,
                defense_roll: 4,
                damage: 0,
                ..
            }
        )));
        let combat = room.combat().expect("still fighting");
        assert_eq!(combat.turn(), "b");
        assert_eq!(combat.defender_id(), "a");
        assert_eq!(room.player("b").map(|p| p.stats.life), Some(6));
    }

    #[test]
    fn combat_needs_adjacency_turn_and_distinct_ids() {
        let mut room = duel(0.4, 2);
        assert!(!room.attack("a", "a"));
        assert!(!room.attack("b", "a"));
        place(&mut room, "b", Position::new(4, 4));
        assert!(!room.attack("a", "b"));
        place(&mut room, "b", Position::new(1, 1));
        assert!(room.attack("a", "b"));
        assert_eq!(room.actions_left(), 0);
        assert_eq!(room.player("a").map(|p| p.match_stats.combats), Some(1));
        assert_eq!(room.player("b").map(|p| p.match_stats.combats), Some(1));
    }

    #[test]
    fn faster_defender_acts_first() {
        let map = open_map(5, &[Position::new(0, 0), Position::new(4, 4)], GameMode::Classic);
        let mut room = started_room(
            vec![
                request("a", PlayerKind::Human, StatBonus::Life),
                request("b", PlayerKind::Human, StatBonus::Speed),
            ],
            &map,
            0.4,
            3,
        );
        place(&mut room, "a", Position::new(2, 1));
        place(&mut room, "b", Position::new(2, 2));
        give_turn(&mut room, "a");
        assert!(room.attack("a", "b"));
        let combat = room.combat().expect("combat");
        assert_eq!(combat.turn(), "b");
        assert_eq!(combat.initiator(), "a");
    }

    #[test]
    fn decisive_combat_records_one_victory_and_one_defeat() {
        for seed in 0..100u64 {
            let mut room = duel(0.0, seed);
            give_item(&mut room, "b", ItemKind::AttackBoost);
            assert!(room.attack("a", "b"));
            let mut rounds = 0;
            while room.combat().is_some() {
                let owner = room.combat().expect("combat").turn().to_string();
                assert!(room.combat_attack(&owner));
                rounds += 1;
                assert!(rounds < 500, "seed={seed} combat never ended");
            }
            let events = room.drain_events();
            let loser_life = events.iter().rev().find_map(|event| match event {
                RoomEvent::CombatRoll { defender_life, .. } => Some(*defender_life),
                _ => None,
            });
            assert!(loser_life.is_some_and(|life| life <= 0), "seed={seed}");

            let victories: u32 = room.players().iter().map(|p| p.match_stats.victories).sum();
            let defeats: u32 = room.players().iter().map(|p| p.match_stats.defeats).sum();
            assert_eq!((victories, defeats), (1, 1), "seed={seed}");
            for player in room.players() {
                assert_eq!(player.stats.life, player.stats.max_life, "seed={seed}");
            }
            let loser = room
                .players()
                .iter()
                .find(|p| p.match_stats.defeats == 1)
                .expect("loser");
            assert_eq!(loser.position, loser.spawn);
            assert!(loser.inventory.is_empty());
        }
    }

    #[test]
    fn defeated_active_player_passes_the_turn() {
        let mut room = duel(0.0, 5);
        room.debug = true;
        give_item(&mut room, "b", ItemKind::AttackBoost);
        give_item(&mut room, "b", ItemKind::LoadedDie);
        room.players
            .iter_mut()
            .for_each(|p| p.stats.life = 1);
        assert!(room.attack("a", "b"));
        assert!(room.combat_attack("a"));
        assert!(room.combat_attack("b"));
        assert!(room.combat().is_none());
        assert_eq!(room.player("b").map(|p| p.wins), Some(1));
        assert_eq!(room.current_turn(), Some("b"));
        let a = room.player("a").expect("a");
        assert_eq!(a.position, a.spawn);
    }

    #[test]
    fn phoenix_revives_once_per_combat() {
        let mut room = duel(0.0, 6);
        room.debug = true;
        give_item(&mut room, "a", ItemKind::AttackBoost);
        give_item(&mut room, "b", ItemKind::Phoenix);
        room.players.iter_mut().for_each(|p| p.stats.life = 1);
        assert!(room.attack("a", "b"));
        room.drain_events();
        assert!(room.combat_attack("a"));
        assert_eq!(room.player("b").map(|p| p.stats.life), Some(1));
        assert_eq!(room.combat().map(|c| c.turn()), Some("b"));
        assert!(room
            .drain_events()
            .iter()
            .any(|event| matches!(event, RoomEvent::CombatRoll { revived: true, .. })));

        // b's counter attack is a draw, then a strikes again and the revive is spent.
        assert!(room.combat_attack("b"));
        assert!(room.combat_attack("a"));
        assert!(room.combat().is_none());
        assert_eq!(room.player("a").map(|p| p.wins), Some(1));
    }

    #[test]
    fn hex_forces_minimum_defense_roll_once() {
        let mut room = duel(0.0, 7);
        room.debug = true;
        give_item(&mut room, "a", ItemKind::Hex);
        assert!(room.attack("a", "b"));
        room.drain_events();
        assert!(room.combat_attack("a"));
        assert!(room.combat_attack("b"));
        assert!(room.combat_attack("a"));
        let rolls: Vec<i32> = room
            .drain_events()
            .iter()
            .filter_map(|event| match event {
                RoomEvent::CombatRoll {
                    attacker_id,
                    defense_roll,
                    ..
                } if attacker_id == "a" => Some(*defense_roll),
                _ => None,
            })
            .collect();
        assert_eq!(rolls, vec![1, 4]);
        assert_eq!(room.player("b").map(|p| p.stats.life), Some(3));
    }

    #[test]
    fn ice_weakens_both_attack_and_defense() {
        let mut room = duel(0.0, 8);
        set_terrain(&mut room, Position::new(2, 2), TerrainKind::Ice);
        let b = room.player_index("b").expect("b");
        let a = room.player_index("a").expect("a");
        assert_eq!(room.effective_defense(b), BASE_STAT - ICE_PENALTY);
        assert_eq!(room.effective_attack(b), BASE_STAT - ICE_PENALTY);
        give_item(&mut room, "a", ItemKind::AttackBoost);
        assert_eq!(room.effective_attack(a), BASE_STAT + ITEM_STAT_BONUS);
    }

    #[test]
    fn successful_escape_restores_pre_combat_stats() {
        let mut room = duel(1.0, 9);
        room.debug = true;
        give_item(&mut room, "a", ItemKind::AttackBoost);
        let before: Vec<StatBlock> = room.players().iter().map(|p| p.stats).collect();
        assert!(room.attack("a", "b"));
        let snapshots: Vec<Option<StatBlock>> = ["a", "b"]
            .iter()
            .map(|id| room.combat().and_then(|c| c.snapshot_of(id)))
            .collect();
        assert!(room.combat_attack("a"));
        assert!(room.player("b").is_some_and(|p| p.stats.life < 6));
        assert!(room.escape("b"));
        assert!(room.combat().is_none());
        let after: Vec<StatBlock> = room.players().iter().map(|p| p.stats).collect();
        assert_eq!(before, after);
        let restored: Vec<Option<StatBlock>> = ["a", "b"]
            .iter()
            .map(|id| room.player(id).map(|p| p.stats))
            .collect();
        assert_eq!(snapshots, restored);
        assert_eq!(room.player("b").map(|p| p.match_stats.evasions), Some(1));
        assert_eq!(room.current_turn(), Some("a"));
    }

    #[test]
    fn failed_escapes_alternate_turns_until_attempts_run_out() {
        let mut room = duel(0.0, 10);
        assert!(room.attack("a", "b"));
        let mut expected = "a";
        for _ in 0..4 {
            let owner = room.combat().expect("combat").turn().to_string();
            assert_eq!(owner, expected);
            assert!(room.escape(&owner));
            expected = if expected == "a" { "b" } else { "a" };
        }
        let combat = room.combat().expect("combat");
        assert_eq!(combat.escapes_left("a"), 0);
        assert_eq!(combat.escapes_left("b"), 0);
        assert!(!room.escape("a"));
        assert_eq!(room.combat().map(|c| c.turn()), Some("a"));
    }

    #[test]
    fn combat_actions_without_combat_are_no_ops() {
        let mut room = duel(1.0, 11);
        assert!(!room.escape("a"));
        assert!(!room.combat_attack("a"));
        assert!(room.drain_events().is_empty());
    }

    #[test]
    fn third_classic_win_ends_the_match() {
        let mut room = duel(0.0, 12);
        room.debug = true;
        give_item(&mut room, "a", ItemKind::AttackBoost);
        let a = room.player_index("a").expect("a");
        room.players[a].wins = 2;
        room.players
            .iter_mut()
            .filter(|p| p.id == "b")
            .for_each(|p| p.stats.life = 1);
        assert!(room.attack("a", "b"));
        assert!(room.combat_attack("a"));
        assert_eq!(room.phase(), RoomPhase::Finished);
        let summary = room.summary().expect("summary");
        assert_eq!(summary.winner_id.as_deref(), Some("a"));
        assert_eq!(summary.reason, GameEndReason::Victories);
    }
}
