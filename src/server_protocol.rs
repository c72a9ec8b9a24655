use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{Behavior, Intent, Position, StatBonus};

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    CreateRoom {
        room_id: String,
        map_id: String,
    },
    Join {
        room_id: String,
        name: String,
        bonus: StatBonus,
    },
    AddVirtual {
        behavior: Behavior,
        bonus: StatBonus,
        name: Option<String>,
    },
    Start,
    Move {
        target: Position,
    },
    Attack {
        target_id: String,
    },
    Escape,
    EndTurn,
    ForceEndTurn,
    ToggleDoor {
        position: Position,
    },
    ToggleDebug,
    Teleport {
        position: Position,
    },
    Quit,
    Ping {
        t: f64,
    },
}

impl ParsedClientMessage {
    /// Maps an in-room command onto the intent it submits on behalf of `player_id`. Session
    /// messages (room creation, joins, bots, pings) return `None`.
    pub fn into_intent(self, player_id: &str) -> Option<Intent> {
        let player_id = player_id.to_string();
        let intent = match self {
            ParsedClientMessage::Start => Intent::StartGame { player_id },
            ParsedClientMessage::Move { target } => Intent::Move { player_id, target },
            ParsedClientMessage::Attack { target_id } => Intent::Attack {
                player_id,
                target_id,
            },
            ParsedClientMessage::Escape => Intent::Escape { player_id },
            ParsedClientMessage::EndTurn => Intent::EndTurn { player_id },
            ParsedClientMessage::ForceEndTurn => Intent::ForceEndTurn,
            ParsedClientMessage::ToggleDoor { position } => Intent::ToggleDoor {
                player_id,
                position,
            },
            ParsedClientMessage::ToggleDebug => Intent::ToggleDebug { player_id },
            ParsedClientMessage::Teleport { position } => Intent::Teleport {
                player_id,
                position,
            },
            ParsedClientMessage::Quit => Intent::PlayerQuit { player_id },
            ParsedClientMessage::CreateRoom { .. }
            | ParsedClientMessage::Join { .. }
            | ParsedClientMessage::AddVirtual { .. }
            | ParsedClientMessage::Ping { .. } => return None,
        };
        Some(intent)
    }
}

/// Session-level replies. Room events are forwarded as their own JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "roomId")]
        room_id: String,
    },
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "mapId")]
        map_id: String,
    },
    Error {
        message: String,
    },
    Pong {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "create_room" => Some(ParsedClientMessage::CreateRoom {
            room_id: object.get("roomId")?.as_str()?.to_string(),
            map_id: object.get("mapId")?.as_str()?.to_string(),
        }),
        "join" => {
            let room_id = object.get("roomId")?.as_str()?.to_string();
            let name = match object.get("name") {
                None => String::new(),
                Some(value) => value.as_str()?.to_string(),
            };
            let bonus = parse_bonus(object)?;
            Some(ParsedClientMessage::Join {
                room_id,
                name,
                bonus,
            })
        }
        "add_virtual" => {
            let behavior = Behavior::parse(object.get("behavior")?.as_str()?)?;
            let bonus = parse_bonus(object)?;
            let name = match object.get("name") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::AddVirtual {
                behavior,
                bonus,
                name,
            })
        }
        "start" => Some(ParsedClientMessage::Start),
        "move" => Some(ParsedClientMessage::Move {
            target: parse_position(object.get("target")?)?,
        }),
        "attack" => Some(ParsedClientMessage::Attack {
            target_id: object.get("targetId")?.as_str()?.to_string(),
        }),
        "escape" => Some(ParsedClientMessage::Escape),
        "end_turn" => Some(ParsedClientMessage::EndTurn),
        "force_end_turn" => Some(ParsedClientMessage::ForceEndTurn),
        "toggle_door" => Some(ParsedClientMessage::ToggleDoor {
            position: parse_position(object.get("position")?)?,
        }),
        "toggle_debug" => Some(ParsedClientMessage::ToggleDebug),
        "teleport" => Some(ParsedClientMessage::Teleport {
            position: parse_position(object.get("position")?)?,
        }),
        "quit" => Some(ParsedClientMessage::Quit),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

/// Missing bonus defaults to life; an unknown one rejects the message.
fn parse_bonus(object: &Map<String, Value>) -> Option<StatBonus> {
    match object.get("bonus") {
        None => Some(StatBonus::Life),
        Some(value) => StatBonus::parse(value.as_str()?),
    }
}

fn parse_position(value: &Value) -> Option<Position> {
    let object = value.as_object()?;
    let row = parse_coordinate(object.get("row")?)?;
    let col = parse_coordinate(object.get("col")?)?;
    Some(Position::new(row, col))
}

fn parse_coordinate(value: &Value) -> Option<i32> {
    let number = value.as_i64()?;
    i32::try_from(number).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_create_room_and_join() {
        assert_eq!(
            parse_client_message(r#"{"type":"create_room","roomId":"r1","mapId":"arena"}"#),
            Some(ParsedClientMessage::CreateRoom {
                room_id: "r1".to_string(),
                map_id: "arena".to_string(),
            })
        );
        assert_eq!(
            parse_client_message(r#"{"type":"join","roomId":"r1","name":"Ann","bonus":"speed"}"#),
            Some(ParsedClientMessage::Join {
                room_id: "r1".to_string(),
                name: "Ann".to_string(),
                bonus: StatBonus::Speed,
            })
        );
    }

    #[test]
    fn join_defaults_bonus_but_rejects_unknown_one() {
        let parsed = parse_client_message(r#"{"type":"join","roomId":"r1"}"#);
        assert!(matches!(
            parsed,
            Some(ParsedClientMessage::Join {
                bonus: StatBonus::Life,
                ..
            })
        ));
        assert!(parse_client_message(r#"{"type":"join","roomId":"r1","bonus":"luck"}"#).is_none());
    }

    #[test]
    fn parse_add_virtual_requires_known_behavior() {
        let parsed = parse_client_message(r#"{"type":"add_virtual","behavior":"defensive"}"#);
        assert!(matches!(
            parsed,
            Some(ParsedClientMessage::AddVirtual {
                behavior: Behavior::Defensive,
                name: None,
                ..
            })
        ));
        assert!(parse_client_message(r#"{"type":"add_virtual","behavior":"sneaky"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"add_virtual"}"#).is_none());
    }

    #[test]
    fn positions_must_be_integral() {
        let parsed = parse_client_message(r#"{"type":"move","target":{"row":2,"col":3}}"#);
        assert_eq!(
            parsed,
            Some(ParsedClientMessage::Move {
                target: Position::new(2, 3)
            })
        );
        assert!(parse_client_message(r#"{"type":"move","target":{"row":2.5,"col":3}}"#).is_none());
        assert!(parse_client_message(r#"{"type":"move","target":{"row":2}}"#).is_none());
        assert!(
            parse_client_message(r#"{"type":"toggle_door","position":{"row":4294967296,"col":0}}"#)
                .is_none()
        );
    }

    #[test]
    fn parse_ping_requires_finite_number() {
        let parsed = parse_client_message(r#"{"type":"ping","t":12.5}"#);
        assert!(matches!(parsed, Some(ParsedClientMessage::Ping { .. })));
        assert!(parse_client_message(r#"{"type":"ping","t":"soon"}"#).is_none());
    }

    #[test]
    fn unknown_or_malformed_messages_are_dropped() {
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message(r#"["move"]"#).is_none());
        assert!(parse_client_message(r#"{"type":"dance"}"#).is_none());
    }

    #[test]
    fn in_room_commands_become_intents() {
        let intent = parse_client_message(r#"{"type":"attack","targetId":"p2"}"#)
            .and_then(|message| message.into_intent("p1"));
        assert!(matches!(
            intent,
            Some(Intent::Attack { player_id, target_id }) if player_id == "p1" && target_id == "p2"
        ));

        let intent = parse_client_message(r#"{"type":"quit"}"#)
            .and_then(|message| message.into_intent("p1"));
        assert!(matches!(intent, Some(Intent::PlayerQuit { .. })));

        let session = parse_client_message(r#"{"type":"ping","t":1}"#)
            .and_then(|message| message.into_intent("p1"));
        assert!(session.is_none());
    }

    #[test]
    fn server_messages_are_tagged() {
        let json = serde_json::to_value(ServerMessage::Welcome {
            player_id: "p1".to_string(),
            room_id: "r1".to_string(),
        })
        .expect("serialize");
        assert_eq!(json["type"], "welcome");
        assert_eq!(json["playerId"], "p1");
    }
}
