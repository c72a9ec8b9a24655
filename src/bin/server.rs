use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arena_tactics_server::config::ServerArgs;
use arena_tactics_server::hub::RoomHub;
use arena_tactics_server::map_provider::JsonMapDirectory;
use arena_tactics_server::server_protocol::{
    parse_client_message, ParsedClientMessage, ServerMessage,
};
use arena_tactics_server::server_utils::{
    normalize_room_id, parse_stats_limit, sanitize_name, virtual_player_name,
};
use arena_tactics_server::stats_store::JsonStatsStore;
use arena_tactics_server::types::{Behavior, Intent, JoinRequest, PlayerKind, RoomEvent, StatBonus};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const OUTBOUND_QUEUE: usize = 256;

type SharedState = Arc<ServerState>;

struct ServerState {
    hub: RoomHub,
    maps: Arc<JsonMapDirectory>,
    stats: Arc<JsonStatsStore>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

/// What one websocket connection has bound itself to.
struct Session {
    client_id: String,
    tx: mpsc::Sender<OutboundMessage>,
    room_id: Option<String>,
    player_id: Option<String>,
    forwarder: Option<JoinHandle<()>>,
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();
    let maps = Arc::new(JsonMapDirectory::new(args.maps_dir.clone()));
    let stats = Arc::new(JsonStatsStore::new(args.stats_path.clone()));
    let hub = RoomHub::new(maps.clone(), stats.clone(), args.engine_options());
    info!(
        maps_dir = %args.maps_dir.display(),
        maps = maps.list_ids().len(),
        stats_path = %args.stats_path.display(),
        "server configured"
    );

    let state = Arc::new(ServerState { hub, maps, stats });
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/stats", get(stats_handler))
        .route("/api/maps", get(maps_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%bind_addr, %err, "failed to bind server socket");
            std::process::exit(1);
        }
    };

    info!(port = args.port, "listening");
    if let Err(err) = axum::serve(listener, app).await {
        error!(%err, "server runtime failed");
        std::process::exit(1);
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn stats_handler(
    State(state): State<SharedState>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    Json(
        state
            .stats
            .build_response(parse_stats_limit(query.limit.as_deref())),
    )
}

async fn maps_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "maps": state.maps.list_ids(),
        "rooms": state.hub.room_ids().await,
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);
    let mut session = Session {
        client_id: make_id("client"),
        tx,
        room_id: None,
        player_id: None,
        forwarder: None,
    };
    debug!(client_id = %session.client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &mut session, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(&state, &mut session, &text).await;
                } else {
                    send_error(&session, "invalid utf8 message");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&state, &mut session).await;
    drop(session);
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, session: &mut Session, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        send_error(session, "invalid message");
        return;
    };

    match message {
        ParsedClientMessage::Ping { t } => {
            send_message(session, &ServerMessage::Pong { t });
        }
        ParsedClientMessage::CreateRoom { room_id, map_id } => {
            let Some(room_id) = normalize_room_id(&room_id) else {
                send_error(session, "invalid room id");
                return;
            };
            match state.hub.create_room(&room_id, &map_id).await {
                Ok(_) => send_message(session, &ServerMessage::RoomCreated { room_id, map_id }),
                Err(err) => send_error(session, &err.to_string()),
            }
        }
        ParsedClientMessage::Join {
            room_id,
            name,
            bonus,
        } => {
            handle_join(state, session, room_id, name, bonus).await;
        }
        ParsedClientMessage::AddVirtual {
            behavior,
            bonus,
            name,
        } => {
            handle_add_virtual(state, session, behavior, bonus, name).await;
        }
        command => {
            let (Some(room_id), Some(player_id)) = (&session.room_id, &session.player_id) else {
                send_error(session, "join a room first");
                return;
            };
            let Some(intent) = command.into_intent(player_id) else {
                return;
            };
            if let Err(err) = state.hub.submit(room_id, intent).await {
                send_error(session, &err.to_string());
            }
        }
    }
}

async fn handle_join(
    state: &SharedState,
    session: &mut Session,
    room_id: String,
    name: String,
    bonus: StatBonus,
) {
    if session.room_id.is_some() {
        send_error(session, "already in a room");
        return;
    }
    let Some(room_id) = normalize_room_id(&room_id) else {
        send_error(session, "invalid room id");
        return;
    };
    let player_id = make_id("player");
    let request = JoinRequest {
        player_id: player_id.clone(),
        name: sanitize_name(&name),
        kind: PlayerKind::Human,
        bonus,
    };
    // The session binds only once the room has taken the player.
    let events = match state.hub.join(&room_id, request).await {
        Ok(events) => events,
        Err(err) => {
            debug!(client_id = %session.client_id, room_id = %room_id, %err, "join refused");
            send_error(session, &err.to_string());
            return;
        }
    };

    info!(client_id = %session.client_id, room_id = %room_id, player_id = %player_id, "player joined");
    send_message(
        session,
        &ServerMessage::Welcome {
            player_id: player_id.clone(),
            room_id: room_id.clone(),
        },
    );
    session.forwarder = Some(spawn_forwarder(events, session.tx.clone()));
    session.room_id = Some(room_id);
    session.player_id = Some(player_id);
}

async fn handle_add_virtual(
    state: &SharedState,
    session: &Session,
    behavior: Behavior,
    bonus: StatBonus,
    name: Option<String>,
) {
    let Some(room_id) = &session.room_id else {
        send_error(session, "join a room first");
        return;
    };
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let label = match behavior {
        Behavior::Aggressive => "aggressive",
        Behavior::Defensive => "defensive",
    };
    let name = match name {
        Some(name) => sanitize_name(&name),
        None => virtual_player_name(label, seq),
    };
    let request = JoinRequest {
        player_id: format!("bot_{seq}"),
        name,
        kind: PlayerKind::Virtual(behavior),
        bonus,
    };
    if let Err(err) = state.hub.join(room_id, request).await {
        send_error(session, &err.to_string());
    }
}

async fn handle_disconnect(state: &SharedState, session: &mut Session) {
    if let Some(forwarder) = session.forwarder.take() {
        forwarder.abort();
    }
    let (Some(room_id), Some(player_id)) = (session.room_id.take(), session.player_id.take())
    else {
        debug!(client_id = %session.client_id, "client disconnected");
        return;
    };
    info!(client_id = %session.client_id, room_id = %room_id, player_id = %player_id, "player disconnected");
    let quit = Intent::PlayerQuit { player_id };
    if let Err(err) = state.hub.submit(&room_id, quit).await {
        debug!(room_id = %room_id, %err, "room gone before quit");
    }
}

/// Relays room events to one client. Full queues drop events for that client only.
fn spawn_forwarder(
    mut events: broadcast::Receiver<RoomEvent>,
    tx: mpsc::Sender<OutboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client lagged behind room events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = tx.try_send(OutboundMessage::Close {
                        code: 1000,
                        reason: "room closed".to_string(),
                    });
                    break;
                }
            };
            match serde_json::to_string(&event) {
                Ok(payload) => {
                    if tx.is_closed() {
                        break;
                    }
                    let _ = tx.try_send(OutboundMessage::Text(payload));
                }
                Err(err) => warn!(%err, "failed to encode room event"),
            }
        }
    })
}

fn send_message(session: &Session, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            if session.tx.try_send(OutboundMessage::Text(payload)).is_err() {
                debug!(client_id = %session.client_id, "outbound queue full");
            }
        }
        Err(err) => warn!(%err, "failed to encode server message"),
    }
}

fn send_error(session: &Session, message: &str) {
    send_message(
        session,
        &ServerMessage::Error {
            message: message.to_string(),
        },
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
