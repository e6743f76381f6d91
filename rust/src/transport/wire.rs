//! Server JSON shapes and their normalization into [`ChatMessage`].
//!
//! The server populates `sender` either as a bare id or as an embedded user
//! object depending on the query; both collapse to a plain `sender_id` here
//! so nothing downstream branches on shape.

use serde::Deserialize;

use crate::state::{ChatMessage, MediaKind, MessageDeliveryState, MessageMedia};

#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub(crate) success: bool,
    pub(crate) data: Option<T>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

/// Documents may carry `_id`, a virtual `id`, or both. `_id` wins.
fn pick_id(object_id: Option<WireId>, id: Option<WireId>) -> Option<String> {
    object_id
        .or(id)
        .map(WireId::into_string)
        .filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireSender {
    Id(WireId),
    Populated {
        #[serde(rename = "_id", default)]
        object_id: Option<WireId>,
        #[serde(default)]
        id: Option<WireId>,
        #[serde(default, alias = "username", alias = "displayName")]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    fn to_millis(&self) -> Option<i64> {
        match self {
            WireTimestamp::Millis(ms) => Some(*ms),
            WireTimestamp::Text(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireMedia {
    pub(crate) url: String,
    #[serde(rename = "type", default)]
    pub(crate) kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessage {
    #[serde(rename = "_id", default)]
    pub(crate) object_id: Option<WireId>,
    #[serde(default)]
    pub(crate) id: Option<WireId>,
    #[serde(default)]
    pub(crate) sender: Option<WireSender>,
    #[serde(default)]
    pub(crate) sender_id: Option<WireSender>,
    #[serde(default)]
    pub(crate) sender_name: Option<String>,
    #[serde(default, alias = "text", alias = "content")]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) media: Option<WireMedia>,
    #[serde(default)]
    pub(crate) created_at: Option<WireTimestamp>,
}

fn media_kind(tag: Option<&str>, url: &str) -> Option<MediaKind> {
    let tag = tag.map(|t| t.trim().to_ascii_lowercase());
    match tag.as_deref() {
        Some("image") => return Some(MediaKind::Image),
        Some("video") => return Some(MediaKind::Video),
        Some(t) if t.starts_with("image/") => return Some(MediaKind::Image),
        Some(t) if t.starts_with("video/") => return Some(MediaKind::Video),
        _ => {}
    }
    // Untagged media: fall back to the file extension in the URL.
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or("");
    crate::core::media_kind_for_mime(crate::core::mime_type_for_extension(ext))
}

impl WireMessage {
    /// Canonical form, or `None` for a message with neither text nor media.
    pub(crate) fn into_chat_message(self) -> Option<ChatMessage> {
        let Some(id) = pick_id(self.object_id, self.id) else {
            tracing::debug!("dropping message without id");
            return None;
        };
        let (sender_id, populated_name) = match self.sender.or(self.sender_id) {
            Some(WireSender::Id(id)) => (Some(id.into_string()), None),
            Some(WireSender::Populated {
                object_id,
                id,
                name,
            }) => (pick_id(object_id, id), name),
            None => (None, None),
        };
        let Some(sender_id) = sender_id else {
            tracing::debug!(message_id = %id, "dropping message without sender");
            return None;
        };
        let sender_name = populated_name
            .or(self.sender_name)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let text = self.message.filter(|t| !t.trim().is_empty());

        let media = self.media.and_then(|m| {
            let url = m.url.trim().to_string();
            if url.is_empty() {
                return None;
            }
            match media_kind(m.kind.as_deref(), &url) {
                Some(kind) => Some(MessageMedia { url, kind }),
                None => {
                    tracing::debug!(message_id = %id, kind = ?m.kind, "unrecognized media type");
                    None
                }
            }
        });

        if text.is_none() && media.is_none() {
            tracing::debug!(message_id = %id, "dropping message without text or media");
            return None;
        }

        Some(ChatMessage {
            created_at_ms: self
                .created_at
                .as_ref()
                .and_then(WireTimestamp::to_millis)
                .unwrap_or_default(),
            id,
            sender_id,
            sender_name,
            text,
            media,
            is_mine: false,
            delivery: MessageDeliveryState::Confirmed,
        })
    }
}

/// Decode a `data` array item by item so one malformed entry does not hide
/// the rest of the history.
pub(crate) fn decode_batch(items: Vec<serde_json::Value>) -> Vec<ChatMessage> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<WireMessage>(item) {
            Ok(wire) => wire.into_chat_message(),
            Err(e) => {
                tracing::warn!(%e, "skipping malformed message");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(v: serde_json::Value) -> Option<ChatMessage> {
        serde_json::from_value::<WireMessage>(v)
            .expect("wire message")
            .into_chat_message()
    }

    #[test]
    fn sender_shapes_normalize_to_the_same_id() {
        let bare = decode(json!({
            "_id": "m1",
            "sender": "u42",
            "message": "hello",
            "createdAt": "2024-05-01T10:00:00.000Z"
        }))
        .unwrap();
        let populated = decode(json!({
            "_id": "m1",
            "sender": { "_id": "u42", "name": "Ada" },
            "message": "hello",
            "createdAt": "2024-05-01T10:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(bare.sender_id, "u42");
        assert_eq!(populated.sender_id, "u42");
        assert_eq!(bare.sender_name, None);
        assert_eq!(populated.sender_name.as_deref(), Some("Ada"));
        assert_eq!(bare.created_at_ms, 1_714_557_600_000);
    }

    #[test]
    fn accepts_field_aliases() {
        let m = decode(json!({
            "id": 7,
            "senderId": { "id": "u1", "username": "bob" },
            "text": "hey",
            "createdAt": 1700000000000i64
        }))
        .unwrap();
        assert_eq!(m.id, "7");
        assert_eq!(m.sender_id, "u1");
        assert_eq!(m.sender_name.as_deref(), Some("bob"));
        assert_eq!(m.text.as_deref(), Some("hey"));
        assert_eq!(m.created_at_ms, 1_700_000_000_000);
    }

    #[test]
    fn media_only_message_is_kept() {
        let m = decode(json!({
            "_id": "m2",
            "sender": "u1",
            "message": "",
            "media": { "url": "https://cdn.example/clip.mp4", "type": "video" }
        }))
        .unwrap();
        assert_eq!(m.text, None);
        assert_eq!(
            m.media,
            Some(MessageMedia {
                url: "https://cdn.example/clip.mp4".into(),
                kind: MediaKind::Video,
            })
        );
    }

    #[test]
    fn untagged_media_kind_comes_from_url() {
        let m = decode(json!({
            "_id": "m3",
            "sender": "u1",
            "media": { "url": "https://cdn.example/photo.JPG?size=large" }
        }))
        .unwrap();
        assert_eq!(m.media.unwrap().kind, MediaKind::Image);
    }

    #[test]
    fn empty_message_is_dropped() {
        assert!(decode(json!({ "_id": "m4", "sender": "u1", "message": "   " })).is_none());
    }

    #[test]
    fn documents_with_both_id_keys_decode() {
        let batch = decode_batch(vec![json!({
            "_id": "m1",
            "id": "m1",
            "sender": { "_id": "u1", "id": "u1", "name": "Ada" },
            "message": "hi"
        })]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "m1");
        assert_eq!(batch[0].sender_id, "u1");
        assert_eq!(batch[0].sender_name.as_deref(), Some("Ada"));

        // `_id` is preferred when the two disagree.
        let m = decode(json!({
            "_id": "object",
            "id": "virtual",
            "sender": { "_id": "u1", "id": "u9" },
            "message": "hi"
        }))
        .unwrap();
        assert_eq!(m.id, "object");
        assert_eq!(m.sender_id, "u1");
    }

    #[test]
    fn sender_object_without_id_is_dropped() {
        assert!(decode(json!({ "_id": "m1", "sender": { "name": "Ada" }, "message": "hi" })).is_none());
    }

    #[test]
    fn malformed_items_are_skipped() {
        let batch = decode_batch(vec![
            json!({ "_id": "a", "sender": "u1", "message": "one" }),
            json!({ "sender": "u1", "message": "no id" }),
            json!({ "_id": "b", "sender": "u2", "message": "two" }),
        ]);
        let ids: Vec<_> = batch.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn envelope_reports_failure_message() {
        let env: ApiEnvelope<Vec<serde_json::Value>> =
            serde_json::from_value(json!({ "success": false, "message": "Not a member" }))
                .unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
        assert_eq!(env.message.as_deref(), Some("Not a member"));
    }
}
