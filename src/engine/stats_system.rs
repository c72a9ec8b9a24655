use super::*;

#[derive(Clone, Debug, Default)]
pub(super) struct MatchStats {
    pub(super) started_at_ms: u64,
    pub(super) ended_at_ms: u64,
    pub(super) total_turns: u32,
    pub(super) visited: HashSet<Position>,
    pub(super) doors_toggled: HashSet<Position>,
    pub(super) flag_holders: HashSet<String>,
}

impl GameRoom {
    pub fn build_summary(&self, winner_id: Option<String>, reason: GameEndReason) -> GameSummary {
        let walkable = self
            .grid
            .as_ref()
            .map(Grid::walkable_tile_count)
            .unwrap_or(0);
        let doors = self.grid.as_ref().map(Grid::door_count).unwrap_or(0);
        let ended_at_ms = if self.stats.ended_at_ms == 0 {
            now_ms()
        } else {
            self.stats.ended_at_ms
        };

        let players = self
            .players
            .iter()
            .map(|player| PlayerSummary {
                player_id: player.id.clone(),
                name: player.name.clone(),
                is_virtual: player.is_virtual(),
                wins: player.wins,
                stats: player.match_stats.clone(),
                tiles_visited_pct: percentage(player.visited.len(), walkable),
            })
            .collect();

        GameSummary {
            room_id: self.room_id.clone(),
            mode: self.mode,
            winner_id,
            reason,
            duration_ms: ended_at_ms.saturating_sub(self.stats.started_at_ms),
            total_turns: self.stats.total_turns,
            tiles_visited_pct: percentage(self.stats.visited.len(), walkable),
            doors_toggled_pct: percentage(self.stats.doors_toggled.len(), doors),
            flag_holders: self.stats.flag_holders.len(),
            players,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::types::TerrainKind;

    #[test]
    fn summary_reports_coverage_and_door_usage() {
        let map = open_map(4, &[Position::new(0, 0), Position::new(3, 3)], GameMode::Classic);
        let mut room = started_room(vec![human("a"), human("b")], &map, 0.4, 1);
        place(&mut room, "a", Position::new(1, 1));
        place(&mut room, "b", Position::new(3, 3));
        set_terrain(&mut room, Position::new(1, 2), TerrainKind::Door);
        set_terrain(&mut room, Position::new(2, 0), TerrainKind::Door);
        give_turn(&mut room, "a");
        assert!(room.toggle_door("a", Position::new(1, 2)));

        let summary = room.build_summary(None, GameEndReason::Abandoned);
        assert_eq!(summary.doors_toggled_pct, 50.0);
        assert_eq!(summary.tiles_visited_pct, 2.0 / 16.0 * 100.0);
        assert_eq!(summary.total_turns, 2);
        assert_eq!(summary.players.len(), 2);
        assert!(summary
            .players
            .iter()
            .all(|p| p.tiles_visited_pct == 1.0 / 16.0 * 100.0));
    }

    #[test]
    fn doorless_maps_report_zero_door_usage() {
        let map = open_map(3, &[Position::new(0, 0), Position::new(2, 2)], GameMode::Classic);
        let room = started_room(vec![human("a"), human("b")], &map, 0.4, 2);
        let summary = room.build_summary(Some("a".to_string()), GameEndReason::Victories);
        assert_eq!(summary.doors_toggled_pct, 0.0);
        assert_eq!(summary.winner_id.as_deref(), Some("a"));
        assert_eq!(summary.room_id, "room-1");
    }
}
