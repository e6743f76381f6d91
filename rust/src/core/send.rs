use crate::state::{now_millis, StagedAttachment};
use crate::transport::{OutgoingAttachment, OutgoingMessage};

use super::*;

async fn load_outgoing_attachment(staged: StagedAttachment) -> Result<OutgoingAttachment, ChatError> {
    let bytes = tokio::fs::read(&staged.path)
        .await
        .map_err(|e| ChatError::validation(format!("Cannot read file: {e}")))?;
    // The file may have changed since it was picked.
    validate_attachment(bytes.len() as u64, &staged.mime_type)?;
    Ok(OutgoingAttachment {
        file_name: staged.file_name,
        mime_type: staged.mime_type,
        bytes,
    })
}

impl AppCore {
    pub(super) fn send_message(&mut self, text: String) {
        if self.state.busy.sending_message {
            tracing::debug!("send already in flight; ignoring");
            return;
        }
        let Some(store) = self.store.as_ref() else {
            self.toast("Open a group first");
            return;
        };
        let group_id = store.group_id().to_string();
        let view_token = store.view_token();

        let candidate = ComposerState {
            draft: text.clone(),
            ..self.state.composer.clone()
        };
        if !candidate.can_submit() {
            return;
        }
        let attachment = candidate.attachment;

        self.state.composer.draft = text.clone();
        self.state.composer.send_error = None;
        self.state.busy.sending_message = true;
        self.emit_composer();

        tracing::info!(
            %group_id,
            has_text = !text.trim().is_empty(),
            has_media = attachment.is_some(),
            "sending message"
        );

        let transport = self.transport();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result: Result<ChatMessage, ChatError> = async {
                let attachment = match attachment {
                    Some(staged) => Some(load_outgoing_attachment(staged).await?),
                    None => None,
                };
                let outgoing = OutgoingMessage {
                    text: text.trim().to_string(),
                    attachment,
                };
                transport.send_message(&group_id, outgoing).await
            }
            .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessageSent {
                group_id,
                view_token,
                result,
            })));
        });
    }

    pub(super) fn handle_message_sent(
        &mut self,
        group_id: String,
        view_token: u64,
        result: Result<ChatMessage, ChatError>,
    ) {
        let active = self
            .store
            .as_ref()
            .map(|s| s.accepts(&group_id, view_token))
            .unwrap_or(false);
        if !active {
            // Closing the view already reset the composer and busy flags.
            match &result {
                Ok(m) => tracing::info!(%group_id, message_id = %m.id, "sent after view closed"),
                Err(e) => tracing::warn!(%group_id, %e, "send failed after view closed"),
            }
            return;
        }

        self.state.busy.sending_message = false;

        let mut message = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%group_id, %e, "send failed");
                // Draft and attachment stay so the user can retry.
                self.state.composer.send_error = Some(e.to_string());
                self.emit_composer();
                return;
            }
        };

        if self.state.viewer_id.is_none() {
            tracing::info!("viewer id learned from sent message");
            self.state.viewer_id = Some(message.sender_id.clone());
            if let Some(store) = self.store.as_mut() {
                store.update_ownership(self.state.viewer_id.as_deref());
            }
        }
        message.is_mine = true;
        if message.created_at_ms == 0 {
            message.created_at_ms = now_millis();
        }
        tracing::info!(%group_id, message_id = %message.id, "message sent");

        // Orphan any preview still being read for the attachment we just sent.
        self.stage_seq += 1;
        self.state.composer = ComposerState::empty();
        self.state.busy.reading_attachment = false;

        let Some(store) = self.store.as_mut() else {
            return;
        };
        let appended = store.append(message);
        let len = store.len();
        // Before the first poll lands the controller stays uninitialized, so
        // the first population still does not scroll.
        let scroll = appended && self.scroll.is_initialized() && self.scroll.observe(len);

        self.sync_group_view();
        self.emit_state();
        if scroll {
            self.emit_scroll_to_latest();
        }
    }
}
