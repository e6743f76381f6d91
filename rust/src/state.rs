#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub viewer_id: Option<String>,
    pub busy: BusyState,
    pub current_group: Option<GroupViewState>,
    pub composer: ComposerState,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            viewer_id: None,
            busy: BusyState::idle(),
            current_group: None,
            composer: ComposerState::empty(),
            toast: None,
        }
    }
}

/// "In flight" flags for operations the view should reflect (spinners, disabled inputs).
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_messages: bool,
    pub sending_message: bool,
    pub reading_attachment: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_messages: false,
            sending_message: false,
            reading_attachment: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct GroupViewState {
    pub group_id: String,
    pub messages: Vec<ChatMessage>,
    /// False until the first successful fetch for this view.
    pub initial_load_complete: bool,
    /// Set when the initial load fails; the view should block on it.
    pub load_error: Option<String>,
}

impl GroupViewState {
    pub fn new(group_id: String) -> Self {
        Self {
            group_id,
            messages: vec![],
            initial_load_complete: false,
            load_error: None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ComposerState {
    pub draft: String,
    pub attachment: Option<StagedAttachment>,
    pub attachment_error: Option<String>,
    pub send_error: Option<String>,
}

impl ComposerState {
    pub fn empty() -> Self {
        Self {
            draft: String::new(),
            attachment: None,
            attachment_error: None,
            send_error: None,
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.draft.trim().is_empty() || self.attachment.is_some()
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct StagedAttachment {
    pub path: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub kind: MediaKind,
    /// `data:<mime>;base64,...`, filled in once the file has been read.
    pub preview_data_url: Option<String>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct MessageMedia {
    pub url: String,
    pub kind: MediaKind,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub text: Option<String>,
    pub media: Option<MessageMedia>,
    pub created_at_ms: i64,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
}

impl ChatMessage {
    /// Name to render next to the message. Own messages carry no label.
    pub fn display_sender(&self) -> Option<&str> {
        if self.is_mine {
            return None;
        }
        self.sender_name.as_deref().or(Some(self.sender_id.as_str()))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, MessageDeliveryState::Pending)
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    /// Seen in a poll batch.
    Confirmed,
    /// Appended locally after a successful send; not yet seen in a poll.
    Pending,
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(is_mine: bool, sender_name: Option<&str>) -> ChatMessage {
        ChatMessage {
            id: "m1".to_string(),
            sender_id: "u1".to_string(),
            sender_name: sender_name.map(str::to_string),
            text: Some("hi".to_string()),
            media: None,
            created_at_ms: 1,
            is_mine,
            delivery: MessageDeliveryState::Confirmed,
        }
    }

    #[test]
    fn own_messages_have_no_sender_label() {
        assert_eq!(message(true, Some("Ada")).display_sender(), None);
        assert_eq!(message(false, Some("Ada")).display_sender(), Some("Ada"));
        assert_eq!(message(false, None).display_sender(), Some("u1"));
    }

    #[test]
    fn composer_submit_precondition() {
        let mut composer = ComposerState::empty();
        assert!(!composer.can_submit());
        composer.draft = "   ".to_string();
        assert!(!composer.can_submit());
        composer.draft = " hello ".to_string();
        assert!(composer.can_submit());

        composer.draft.clear();
        composer.attachment = Some(StagedAttachment {
            path: "/tmp/a.png".to_string(),
            file_name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 3,
            kind: MediaKind::Image,
            preview_data_url: None,
        });
        assert!(composer.can_submit());
    }
}
