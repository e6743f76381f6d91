use tokio::time::MissedTickBehavior;

use crate::state::GroupViewState;
use crate::store::ReplaceOutcome;
use crate::transport::Page;

use super::*;

async fn fetch_once(
    transport: Arc<dyn MessageTransport>,
    tx: Sender<CoreMsg>,
    group_id: String,
    view_token: u64,
    page: Page,
) {
    let result = transport.fetch_messages(&group_id, page).await;
    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessagesFetched {
        group_id,
        view_token,
        result,
    })));
}

impl AppCore {
    pub(super) fn open_group(&mut self, group_id: String) {
        let group_id = group_id.trim().to_string();
        if group_id.is_empty() {
            self.toast("Group id is required");
            return;
        }
        if self.store.as_ref().map(|s| s.group_id()) == Some(group_id.as_str()) {
            tracing::debug!(%group_id, "group already open");
            return;
        }

        self.stop_polling();
        self.view_seq += 1;
        self.stage_seq += 1;
        let view_token = self.view_seq;

        self.store = Some(MessageStore::new(group_id.clone(), view_token));
        self.scroll.reset();
        self.state.current_group = Some(GroupViewState::new(group_id.clone()));
        self.state.composer = ComposerState::empty();
        self.state.busy = BusyState {
            loading_messages: true,
            ..BusyState::idle()
        };
        self.emit_current_group();

        self.start_polling(group_id, view_token);
    }

    pub(super) fn close_group(&mut self) {
        self.stop_polling();
        let Some(store) = self.store.take() else {
            return;
        };
        tracing::info!(group_id = store.group_id(), "group closed");

        // Late fetch and send results carry the old token and are dropped.
        self.view_seq += 1;
        self.stage_seq += 1;
        self.scroll.reset();
        self.state.current_group = None;
        self.state.composer = ComposerState::empty();
        self.state.busy = BusyState::idle();
        self.emit_state();
    }

    fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    fn start_polling(&mut self, group_id: String, view_token: u64) {
        let transport = self.transport();
        let tx = self.core_sender.clone();
        let interval = self.config.poll_interval();
        let page = self.config.page();
        tracing::info!(
            %group_id,
            view_token,
            interval_ms = interval.as_millis() as u64,
            network = self.network_enabled(),
            "polling started"
        );

        self.poll_task = Some(self.runtime.spawn(async move {
            // The first tick completes immediately, which doubles as the initial load.
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Fetches do not wait on each other; the actor sorts out stale ones.
                tokio::spawn(fetch_once(
                    transport.clone(),
                    tx.clone(),
                    group_id.clone(),
                    view_token,
                    page,
                ));
            }
        }));
    }

    /// Out-of-band fetch for the open group, e.g. when the app returns to the foreground.
    pub(super) fn refresh_now(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let group_id = store.group_id().to_string();
        let view_token = store.view_token();
        let transport = self.transport();
        let tx = self.core_sender.clone();
        let page = self.config.page();
        self.runtime
            .spawn(fetch_once(transport, tx, group_id, view_token, page));
    }

    pub(super) fn handle_messages_fetched(
        &mut self,
        group_id: String,
        view_token: u64,
        result: Result<Vec<ChatMessage>, ChatError>,
    ) {
        let active = self
            .store
            .as_ref()
            .map(|s| s.accepts(&group_id, view_token))
            .unwrap_or(false);
        if !active {
            tracing::debug!(%group_id, view_token, "discarding stale fetch result");
            return;
        }

        let batch = match result {
            Ok(batch) => batch,
            Err(e) if !self.scroll.is_initialized() => {
                tracing::warn!(%group_id, %e, "initial message load failed");
                if let Some(view) = self.state.current_group.as_mut() {
                    view.load_error = Some(describe_load_error(&e));
                }
                self.state.busy.loading_messages = false;
                self.emit_current_group();
                return;
            }
            Err(e) => {
                // Background poll failures are retried on the next tick.
                tracing::debug!(%group_id, %e, "poll failed");
                return;
            }
        };

        let batch: Vec<ChatMessage> = batch
            .into_iter()
            .map(|m| self.mark_ownership(m))
            .collect();
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let ReplaceOutcome::Applied { len } = store.replace_all(&group_id, view_token, batch)
        else {
            return;
        };

        let scroll = self.scroll.observe(len);
        let mut changed = self.sync_group_view();
        if self.state.busy.loading_messages {
            self.state.busy.loading_messages = false;
            changed = true;
        }
        if changed {
            self.emit_current_group();
        }
        if scroll {
            self.emit_scroll_to_latest();
        }
    }
}
