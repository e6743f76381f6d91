use crate::error::ChatError;
use crate::state::{AppState, ChatMessage};
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// Side-effect update: the view should smoothly scroll to `message_id`.
    ScrollToLatest {
        rev: u64,
        group_id: String,
        message_id: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::ScrollToLatest { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
    /// Ends the actor loop; sent when the owning `FfiApp` is dropped.
    Shutdown,
}

#[derive(Debug)]
pub enum InternalEvent {
    // Async results. `view_token` identifies the group view that issued the request.
    MessagesFetched {
        group_id: String,
        view_token: u64,
        result: Result<Vec<ChatMessage>, ChatError>,
    },
    MessageSent {
        group_id: String,
        view_token: u64,
        result: Result<ChatMessage, ChatError>,
    },
    AttachmentPreviewReady {
        stage_token: u64,
        result: Result<String, ChatError>,
    },
}
