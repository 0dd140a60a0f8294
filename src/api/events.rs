use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::models::ChatMessage;
use crate::utils::{pick_str, value_to_i64};

/// A raw server-to-client hub invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub event_type: String,
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    MessageReceived(ChatMessage),
    TypingStarted { room_id: i64, user_id: String, user_name: Option<String> },
    TypingStopped { room_id: i64, user_id: String },
    OnlineStatusChanged { user_id: String, is_online: bool },
    JoinedRoom { room_id: i64 },
    Error(String),
    Unknown(IncomingEvent),
}

impl HubEvent {
    /// Maps a hub invocation onto a typed event. Target names are matched
    /// case-insensitively; arguments may be one object or positional values.
    pub fn from_incoming(ev: IncomingEvent) -> Self {
        let first = ev.data.first().cloned().unwrap_or(Value::Null);
        match ev.event_type.to_ascii_lowercase().as_str() {
            "receivemessage" | "messagereceived" => match serde_json::from_value::<ChatMessage>(first) {
                Ok(message) => HubEvent::MessageReceived(message),
                Err(e) => HubEvent::Error(format!("malformed message payload: {e}")),
            },
            "usertyping" | "typingstarted" => HubEvent::TypingStarted {
                room_id: room_arg(&ev.data),
                user_id: user_arg(&ev.data),
                user_name: pick_str(&first, &["userName", "UserName", "fullName", "FullName"])
                    .map(str::to_string),
            },
            "userstoppedtyping" | "typingstopped" => HubEvent::TypingStopped {
                room_id: room_arg(&ev.data),
                user_id: user_arg(&ev.data),
            },
            "useronlinestatuschanged" | "onlinestatuschanged" => {
                let is_online = first
                    .get("isOnline")
                    .or_else(|| first.get("IsOnline"))
                    .or_else(|| ev.data.get(1))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                HubEvent::OnlineStatusChanged { user_id: user_arg(&ev.data), is_online }
            }
            "joinedroom" => HubEvent::JoinedRoom { room_id: room_arg(&ev.data) },
            "error" => HubEvent::Error(
                first
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| pick_str(&first, &["message", "Message"]).map(str::to_string))
                    .unwrap_or_else(|| first.to_string()),
            ),
            _ => HubEvent::Unknown(ev),
        }
    }
}

fn room_arg(data: &[Value]) -> i64 {
    let Some(first) = data.first() else { return 0 };
    first
        .get("roomId")
        .or_else(|| first.get("RoomId"))
        .and_then(value_to_i64)
        .or_else(|| value_to_i64(first))
        .unwrap_or_default()
}

fn user_arg(data: &[Value]) -> String {
    let Some(first) = data.first() else { return String::new() };
    if let Some(id) = first.get("userId").or_else(|| first.get("UserId")) {
        return match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    // positional form: (roomId, userId) for typing, (userId, isOnline) for presence
    let positional = if data.len() > 1 && !data[1].is_boolean() { &data[1] } else { first };
    match positional {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(target: &str, data: Vec<Value>) -> HubEvent {
        HubEvent::from_incoming(IncomingEvent { event_type: target.into(), data })
    }

    #[test]
    fn receive_message_in_either_casing() {
        let payload = json!({"id": 1, "roomId": 2, "content": "hi"});
        for target in ["ReceiveMessage", "receivemessage"] {
            match ev(target, vec![payload.clone()]) {
                HubEvent::MessageReceived(m) => assert_eq!(m.room_id, 2),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn typing_accepts_object_and_positional_forms() {
        assert_eq!(
            ev("UserTyping", vec![json!({"roomId": 4, "userId": "u1", "userName": "An"})]),
            HubEvent::TypingStarted { room_id: 4, user_id: "u1".into(), user_name: Some("An".into()) }
        );
        assert_eq!(
            ev("UserStoppedTyping", vec![json!(4), json!("u1")]),
            HubEvent::TypingStopped { room_id: 4, user_id: "u1".into() }
        );
    }

    #[test]
    fn presence_and_errors() {
        assert_eq!(
            ev("UserOnlineStatusChanged", vec![json!("u9"), json!(true)]),
            HubEvent::OnlineStatusChanged { user_id: "u9".into(), is_online: true }
        );
        assert_eq!(ev("Error", vec![json!("denied")]), HubEvent::Error("denied".into()));
        assert_eq!(ev("JoinedRoom", vec![json!({"RoomId": 3})]), HubEvent::JoinedRoom { room_id: 3 });
        assert!(matches!(ev("Whatever", vec![]), HubEvent::Unknown(_)));
    }
}
