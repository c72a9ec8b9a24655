use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::EngineOptions;
use crate::constants::{EVENT_BUFFER, MAILBOX_CAPACITY};
use crate::engine::{GameRoom, RoomPhase};
use crate::error::EngineError;
use crate::map_provider::MapProvider;
use crate::stats_store::StatsSink;
use crate::types::{Intent, JoinRequest, RoomEvent};

type RoomRegistry = Arc<Mutex<HashMap<String, RoomHandle>>>;

/// What a room's mailbox carries. Joins report back whether the room took the player.
enum Mail {
    Intent(Intent),
    Join {
        request: JoinRequest,
        reply: oneshot::Sender<bool>,
    },
}

#[derive(Clone)]
struct RoomHandle {
    tx: mpsc::Sender<Mail>,
    events: broadcast::Sender<RoomEvent>,
}

/// Registry of live rooms. Each room runs as its own task fed by a mailbox, so intents for one
/// room are applied strictly in arrival order while rooms progress independently.
#[derive(Clone)]
pub struct RoomHub {
    rooms: RoomRegistry,
    maps: Arc<dyn MapProvider>,
    sink: Arc<dyn StatsSink>,
    options: EngineOptions,
    next_ordinal: Arc<AtomicU64>,
}

impl RoomHub {
    pub fn new(maps: Arc<dyn MapProvider>, sink: Arc<dyn StatsSink>, options: EngineOptions) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            maps,
            sink,
            options,
            next_ordinal: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a room bound to `map_id` and returns a subscription to its events.
    pub async fn create_room(
        &self,
        room_id: &str,
        map_id: &str,
    ) -> Result<broadcast::Receiver<RoomEvent>, EngineError> {
        if self.maps.get_game(map_id).is_none() {
            warn!(room_id, map_id, "refusing room for unknown map");
            return Err(EngineError::MapNotFound(map_id.to_string()));
        }
        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(room_id) {
            return Err(EngineError::RoomAlreadyExists(room_id.to_string()));
        }

        let (tx, inbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (events, receiver) = broadcast::channel(EVENT_BUFFER);
        rooms.insert(
            room_id.to_string(),
            RoomHandle {
                tx,
                events: events.clone(),
            },
        );

        let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        let actor = RoomActor {
            room: GameRoom::new(room_id, map_id, self.options.room_options(ordinal)),
            inbox,
            events,
            maps: self.maps.clone(),
            sink: self.sink.clone(),
            rooms: self.rooms.clone(),
            ai_step_delay: self.options.ai_step_delay,
        };
        tokio::spawn(actor.run());
        info!(room_id, map_id, "room created");
        Ok(receiver)
    }

    pub async fn submit(&self, room_id: &str, intent: Intent) -> Result<(), EngineError> {
        let Some(handle) = self.handle(room_id).await else {
            debug!(room_id, ?intent, "dropping intent for unknown room");
            return Err(EngineError::RoomNotFound(room_id.to_string()));
        };
        handle
            .tx
            .send(Mail::Intent(intent))
            .await
            .map_err(|_| EngineError::RoomClosed(room_id.to_string()))
    }

    /// Joins a player and waits for the room's verdict. The returned subscription was taken
    /// before the join, so it also carries the player's own `PlayerJoined`.
    pub async fn join(
        &self,
        room_id: &str,
        request: JoinRequest,
    ) -> Result<broadcast::Receiver<RoomEvent>, EngineError> {
        let Some(handle) = self.handle(room_id).await else {
            return Err(EngineError::RoomNotFound(room_id.to_string()));
        };
        let events = handle.events.subscribe();
        let (reply, verdict) = oneshot::channel();
        handle
            .tx
            .send(Mail::Join { request, reply })
            .await
            .map_err(|_| EngineError::RoomClosed(room_id.to_string()))?;
        match verdict.await {
            Ok(true) => Ok(events),
            Ok(false) => Err(EngineError::JoinRefused(room_id.to_string())),
            Err(_) => Err(EngineError::RoomClosed(room_id.to_string())),
        }
    }

    async fn handle(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.lock().await.contains_key(room_id)
    }

    pub async fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

struct RoomActor {
    room: GameRoom,
    inbox: mpsc::Receiver<Mail>,
    events: broadcast::Sender<RoomEvent>,
    maps: Arc<dyn MapProvider>,
    sink: Arc<dyn StatsSink>,
    rooms: RoomRegistry,
    ai_step_delay: Duration,
}

impl RoomActor {
    async fn run(mut self) {
        let mut pending: Option<(String, Instant)> = None;
        let mut had_players = false;
        loop {
            pending = match (self.room.virtual_actor(), pending) {
                (Some(actor), Some((waiting, deadline))) if actor == waiting => {
                    Some((waiting, deadline))
                }
                (Some(actor), _) => Some((actor.to_string(), Instant::now() + self.ai_step_delay)),
                (None, _) => None,
            };
            let deadline = pending
                .as_ref()
                .map(|(_, deadline)| *deadline)
                .unwrap_or_else(Instant::now);

            tokio::select! {
                mail = self.inbox.recv() => {
                    match mail {
                        Some(Mail::Intent(intent)) => self.apply(intent),
                        Some(Mail::Join { request, reply }) => {
                            let player_id = request.player_id.clone();
                            let joined = self.room.join(request);
                            if !joined {
                                debug!(room_id = %self.room.room_id, %player_id, "join refused");
                            }
                            let _ = reply.send(joined);
                        }
                        None => break,
                    }
                }
                _ = sleep_until(deadline), if pending.is_some() => {
                    pending = None;
                    if let Some(action) = self.room.run_virtual_step() {
                        debug!(room_id = %self.room.room_id, ?action, "virtual step");
                    }
                }
            }

            self.flush();
            if self.room.is_finished() {
                if let Some(summary) = self.room.summary() {
                    self.sink.record_match(summary);
                    info!(
                        room_id = %self.room.room_id,
                        winner = ?summary.winner_id,
                        reason = ?summary.reason,
                        turns = summary.total_turns,
                        "match ended"
                    );
                }
                break;
            }
            // A lobby whose last player left is closed.
            if self.room.phase() == RoomPhase::WaitingForPlayers {
                if !self.room.players().is_empty() {
                    had_players = true;
                } else if had_players {
                    break;
                }
            }
        }
        self.rooms.lock().await.remove(&self.room.room_id);
        info!(room_id = %self.room.room_id, "room torn down");
    }

    fn apply(&mut self, intent: Intent) {
        let applied = match &intent {
            Intent::PlayerJoin(request) => self.room.join(request.clone()),
            Intent::PlayerQuit { player_id } => self.room.handle_player_quit(player_id),
            Intent::StartGame { player_id } => self.start_game(player_id),
            Intent::Move { player_id, target } => self.room.move_player(player_id, *target),
            Intent::Attack {
                player_id,
                target_id,
            } => self.room.attack(player_id, target_id),
            Intent::Escape { player_id } => self.room.escape(player_id),
            Intent::EndTurn { player_id } => self.room.end_turn(player_id),
            Intent::ForceEndTurn => self.room.force_end_turn(),
            Intent::ToggleDoor {
                player_id,
                position,
            } => self.room.toggle_door(player_id, *position),
            Intent::ToggleDebug { player_id } => self.room.toggle_debug(player_id),
            Intent::Teleport {
                player_id,
                position,
            } => self.room.teleport(player_id, *position),
        };
        if !applied {
            debug!(room_id = %self.room.room_id, ?intent, "intent ignored");
        }
    }

    fn start_game(&mut self, player_id: &str) -> bool {
        if !self.room.begin_start(player_id) {
            return false;
        }
        let map_id = self.room.map_id.clone();
        let Some(map) = self.maps.get_game(&map_id) else {
            warn!(room_id = %self.room.room_id, map_id = %map_id, "map missing at match start");
            self.room
                .abort_start(EngineError::MapNotFound(map_id).to_string());
            return false;
        };
        match self.room.start_with_map(&map) {
            Ok(started) => {
                if started {
                    info!(
                        room_id = %self.room.room_id,
                        players = self.room.players().len(),
                        "match started"
                    );
                }
                started
            }
            Err(error) => {
                warn!(room_id = %self.room.room_id, %error, "match start failed");
                false
            }
        }
    }

    fn flush(&mut self) {
        for event in self.room.drain_events() {
            // No subscribers is fine; the room keeps running headless.
            let _ = self.events.send(event);
        }
    }
}
