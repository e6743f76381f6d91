mod attachment;
mod config;
mod polling;
mod send;

use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::error::ChatError;
use crate::scroll::ScrollController;
use crate::state::{AppState, BusyState, ChatMessage, ComposerState};
use crate::store::MessageStore;
use crate::transport::{MessageTransport, SharedMessageTransport};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use attachment::{
    media_kind_for_mime, mime_type_for_extension, validate_attachment, MAX_ATTACHMENT_BYTES,
};
pub(crate) use config::{default_app_config_json, CONFIG_FILE_NAME};

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    default_transport: Arc<dyn MessageTransport>,
    transport_override: SharedMessageTransport,

    // Active group view. `None` while no group is on screen.
    store: Option<MessageStore>,
    scroll: ScrollController,
    poll_task: Option<tokio::task::JoinHandle<()>>,

    // Bumped on every open/close so late async results can be told apart.
    view_seq: u64,
    // Bumped whenever the staged attachment is replaced or dropped.
    stage_seq: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        transport_override: SharedMessageTransport,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let mut state = AppState::empty();
        state.viewer_id = config
            .viewer_id
            .as_ref()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let default_transport = config.build_transport();

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            default_transport,
            transport_override,
            store: None,
            scroll: ScrollController::default(),
            poll_task: None,
            view_seq: 0,
            stage_seq: 0,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn transport(&self) -> Arc<dyn MessageTransport> {
        let injected = match self.transport_override.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        };
        injected.unwrap_or_else(|| self.default_transport.clone())
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_current_group(&mut self) {
        self.emit_state();
    }

    fn emit_composer(&mut self) {
        self.emit_state();
    }

    fn emit_busy(&mut self) {
        // Busy flags are part of AppState; emit a full snapshot like everything else.
        self.emit_state();
    }

    fn emit_toast(&mut self) {
        self.emit_state();
    }

    /// Side-effect update asking the view to scroll to the newest message.
    fn emit_scroll_to_latest(&mut self) {
        let Some((group_id, message_id)) = self.store.as_ref().and_then(|s| {
            s.last()
                .map(|m| (s.group_id().to_string(), m.id.clone()))
        }) else {
            return;
        };
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        tracing::debug!(%group_id, %message_id, "scroll_to_latest");
        let _ = self.update_sender.send(AppUpdate::ScrollToLatest {
            rev,
            group_id,
            message_id,
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_busy();
        }
    }

    fn mark_ownership(&self, mut message: ChatMessage) -> ChatMessage {
        message.is_mine = self.state.viewer_id.as_deref() == Some(message.sender_id.as_str());
        message
    }

    /// Copy the store into the view state. Returns true when anything changed.
    fn sync_group_view(&mut self) -> bool {
        let (Some(store), Some(view)) = (self.store.as_ref(), self.state.current_group.as_mut())
        else {
            return false;
        };
        let mut changed = false;
        if view.messages.as_slice() != store.messages() {
            view.messages = store.messages().to_vec();
            changed = true;
        }
        if !view.initial_load_complete && self.scroll.is_initialized() {
            view.initial_load_complete = true;
            changed = true;
        }
        if view.initial_load_complete && view.load_error.is_some() {
            view.load_error = None;
            changed = true;
        }
        changed
    }

    fn set_viewer(&mut self, user_id: Option<String>) {
        let user_id = user_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if self.state.viewer_id == user_id {
            return;
        }
        tracing::info!(has_viewer = user_id.is_some(), "viewer changed");
        self.state.viewer_id = user_id;
        if let Some(store) = self.store.as_mut() {
            store.update_ownership(self.state.viewer_id.as_deref());
        }
        self.sync_group_view();
        self.emit_state();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries draft text and file paths.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
            // The actor loop stops on its own; dropping the core aborts polling.
            CoreMsg::Shutdown => tracing::info!("shutdown requested"),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Viewer
            AppAction::SetViewer { user_id } => self.set_viewer(user_id),

            // Group view
            AppAction::OpenGroup { group_id } => self.open_group(group_id),
            AppAction::CloseGroup => self.close_group(),

            // Composer
            AppAction::UpdateDraft { text } => {
                if self.state.composer.draft != text {
                    self.state.composer.draft = text;
                    self.emit_composer();
                }
            }
            AppAction::SelectAttachment { path, mime_type } => {
                if self.store.is_none() {
                    self.toast("Open a group first");
                    return;
                }
                self.select_attachment(path, mime_type);
            }
            AppAction::ClearAttachment => self.clear_attachment(),
            AppAction::SendMessage { text } => self.send_message(text),
            AppAction::ClearSendError => {
                if self.state.composer.send_error.is_some() {
                    self.state.composer.send_error = None;
                    self.emit_composer();
                }
            }

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_toast();
                }
            }

            // Lifecycle
            AppAction::Foregrounded => self.refresh_now(),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::MessagesFetched {
                group_id,
                view_token,
                result,
            } => self.handle_messages_fetched(group_id, view_token, result),
            InternalEvent::MessageSent {
                group_id,
                view_token,
                result,
            } => self.handle_message_sent(group_id, view_token, result),
            InternalEvent::AttachmentPreviewReady {
                stage_token,
                result,
            } => self.handle_attachment_preview_ready(stage_token, result),
        }
    }
}

impl Drop for AppCore {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

fn describe_load_error(e: &ChatError) -> String {
    match e {
        ChatError::Network(_) => format!("Could not load messages. Check your connection. ({e})"),
        _ => format!("Could not load messages: {e}"),
    }
}
