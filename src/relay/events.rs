use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Notification;

/// Events the relay pushes to subscribers, tagged for clients by "type".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    NewLoop {
        loop_id: String,
        author_id: String,
        username: String,
        content_text: String,
        parent_loop_id: Option<String>,
        circle_id: Option<String>,
        category: Option<String>,
        created_at: DateTime<Utc>,
    },
    StreamJoined {
        stream_id: String,
        user_id: String,
        username: String,
        viewer_count: usize,
    },
    StreamLeft {
        stream_id: String,
        user_id: String,
        username: String,
        viewer_count: usize,
    },
    Chat {
        stream_id: String,
        message_id: String,
        sender_id: String,
        username: String,
        content: String,
        sent_at: DateTime<Utc>,
    },
    TypingStart {
        stream_id: String,
        user_id: String,
        username: String,
    },
    TypingStop {
        stream_id: String,
        user_id: String,
        username: String,
    },
    Gift {
        gift_id: String,
        stream_id: Option<String>,
        sender_id: String,
        sender_username: String,
        recipient_id: String,
        gift_type: String,
        coins: i64,
    },
    Notification {
        notification: Notification,
    },
    StreamEnded {
        stream_id: String,
    },
}

/// Frames a stream socket accepts from its client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Chat { content: String },
    TypingStart,
    TypingStop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags() {
        let event = RelayEvent::StreamEnded {
            stream_id: "s1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stream_ended");
        assert_eq!(json["stream_id"], "s1");
    }

    #[test]
    fn test_client_event_parsing() {
        let chat: ClientEvent = serde_json::from_str(r#"{"type":"chat","content":"hi"}"#).unwrap();
        assert!(matches!(chat, ClientEvent::Chat { content } if content == "hi"));

        let typing: ClientEvent = serde_json::from_str(r#"{"type":"typing_start"}"#).unwrap();
        assert!(matches!(typing, ClientEvent::TypingStart));

        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"explode"}"#).is_err());
    }
}
