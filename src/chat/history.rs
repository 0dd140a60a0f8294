use std::collections::HashMap;

use crate::api::error::ApiError;
use crate::api::models::{ChatMessage, ChatRoom, RoomType};

/// Result of reconciling a room's history.
#[derive(Debug)]
pub struct HistorySync {
    pub messages: Vec<ChatMessage>,
    /// Set when the REST fetch failed; `messages` then holds the cached (and live) set.
    pub error: Option<ApiError>,
}

/// Merges message lists in precedence order: a message id seen again in a later
/// source replaces the earlier copy. The result is sorted ascending by send
/// time; messages without a timestamp sort first and ties keep arrival order.
pub fn merge_messages<'a, I>(sources: I) -> Vec<ChatMessage>
where
    I: IntoIterator<Item = &'a [ChatMessage]>,
{
    let mut merged: Vec<ChatMessage> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for source in sources {
        for message in source {
            if message.id.is_empty() {
                merged.push(message.clone());
                continue;
            }
            match index.get(&message.id) {
                Some(&at) => merged[at] = message.clone(),
                None => {
                    index.insert(message.id.clone(), merged.len());
                    merged.push(message.clone());
                }
            }
        }
    }
    merged.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
    merged
}

/// The user's shared support room: the support-typed room with the highest id.
pub fn pick_support_room(rooms: &[ChatRoom]) -> Option<&ChatRoom> {
    rooms
        .iter()
        .filter(|r| r.room_type == RoomType::Support)
        .max_by_key(|r| r.id)
}
