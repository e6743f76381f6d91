use std::collections::{HashMap, HashSet};

use crate::state::{ChatMessage, MessageDeliveryState};

/// An optimistic entry missing from this many consecutive poll batches is
/// dropped and the store falls back to the server's view.
const MAX_PENDING_MISSES: u8 = 3;

/// Ordered message sequence for the group view currently on screen.
///
/// Order is arrival order: poll batches are taken in the server's order and
/// optimistic sends go to the tail. Nothing is re-sorted by timestamp.
#[derive(Debug)]
pub struct MessageStore {
    group_id: String,
    view_token: u64,
    messages: Vec<ChatMessage>,
    // message id -> polls that came back without it
    pending_misses: HashMap<String, u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Applied { len: usize },
    Stale,
}

impl MessageStore {
    pub fn new(group_id: impl Into<String>, view_token: u64) -> Self {
        Self {
            group_id: group_id.into(),
            view_token,
            messages: vec![],
            pending_misses: HashMap::new(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn view_token(&self) -> u64 {
        self.view_token
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn accepts(&self, group_id: &str, view_token: u64) -> bool {
        self.group_id == group_id && self.view_token == view_token
    }

    /// Replace the sequence with a poll batch.
    ///
    /// Results for another group (or an earlier visit to this one) are
    /// discarded. Optimistic entries the batch does not contain yet stay at
    /// the tail until `MAX_PENDING_MISSES` consecutive polls have missed them.
    pub fn replace_all(
        &mut self,
        group_id: &str,
        view_token: u64,
        batch: Vec<ChatMessage>,
    ) -> ReplaceOutcome {
        if !self.accepts(group_id, view_token) {
            return ReplaceOutcome::Stale;
        }

        let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());
        let mut next: Vec<ChatMessage> = Vec::with_capacity(batch.len());
        for mut msg in batch {
            if !seen.insert(msg.id.clone()) {
                tracing::debug!(message_id = %msg.id, "duplicate id in poll batch");
                continue;
            }
            msg.delivery = MessageDeliveryState::Confirmed;
            next.push(msg);
        }

        let previous = std::mem::take(&mut self.messages);
        for msg in previous.into_iter().filter(ChatMessage::is_pending) {
            if seen.contains(&msg.id) {
                self.pending_misses.remove(&msg.id);
                continue;
            }
            let misses = self.pending_misses.entry(msg.id.clone()).or_insert(0);
            *misses += 1;
            if *misses >= MAX_PENDING_MISSES {
                tracing::debug!(message_id = %msg.id, "dropping unconfirmed optimistic message");
                self.pending_misses.remove(&msg.id);
                continue;
            }
            next.push(msg);
        }

        self.messages = next;
        ReplaceOutcome::Applied {
            len: self.messages.len(),
        }
    }

    /// Optimistically append a server-confirmed send. Returns false when the
    /// id is already present (a poll beat us to it).
    pub fn append(&mut self, mut message: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        message.delivery = MessageDeliveryState::Pending;
        self.pending_misses.insert(message.id.clone(), 0);
        self.messages.push(message);
        true
    }

    pub fn update_ownership(&mut self, viewer_id: Option<&str>) {
        for m in &mut self.messages {
            m.is_mine = viewer_id == Some(m.sender_id.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: "u1".to_string(),
            sender_name: None,
            text: Some(format!("text {id}")),
            media: None,
            created_at_ms: 0,
            is_mine: false,
            delivery: MessageDeliveryState::Confirmed,
        }
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn replace_keeps_server_order_and_dedups() {
        let mut store = MessageStore::new("g1", 1);
        let out = store.replace_all("g1", 1, vec![msg("b"), msg("a"), msg("b"), msg("c")]);
        assert_eq!(out, ReplaceOutcome::Applied { len: 3 });
        assert_eq!(ids(&store), vec!["b", "a", "c"]);
    }

    #[test]
    fn stale_group_or_token_is_discarded() {
        let mut store = MessageStore::new("g2", 5);
        assert_eq!(
            store.replace_all("g1", 5, vec![msg("a")]),
            ReplaceOutcome::Stale
        );
        assert_eq!(
            store.replace_all("g2", 4, vec![msg("a")]),
            ReplaceOutcome::Stale
        );
        assert!(store.is_empty());
    }

    #[test]
    fn append_goes_to_tail_and_ignores_known_ids() {
        let mut store = MessageStore::new("g1", 1);
        store.replace_all("g1", 1, vec![msg("a"), msg("b")]);
        assert!(store.append(msg("c")));
        assert!(!store.append(msg("b")));
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert!(store.last().unwrap().is_pending());
    }

    #[test]
    fn poll_confirms_pending_without_duplicating() {
        let mut store = MessageStore::new("g1", 1);
        store.replace_all("g1", 1, vec![msg("a")]);
        store.append(msg("s"));

        let out = store.replace_all("g1", 1, vec![msg("a"), msg("s")]);
        assert_eq!(out, ReplaceOutcome::Applied { len: 2 });
        assert_eq!(ids(&store), vec!["a", "s"]);
        assert!(!store.last().unwrap().is_pending());
    }

    #[test]
    fn pending_survives_a_lagging_poll_then_expires() {
        let mut store = MessageStore::new("g1", 1);
        store.replace_all("g1", 1, vec![msg("a")]);
        store.append(msg("s"));

        for _ in 1..MAX_PENDING_MISSES {
            store.replace_all("g1", 1, vec![msg("a")]);
            assert_eq!(ids(&store), vec!["a", "s"]);
        }

        // The third consecutive miss drops it.
        store.replace_all("g1", 1, vec![msg("a")]);
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn pending_stays_behind_newer_server_messages() {
        let mut store = MessageStore::new("g1", 1);
        store.replace_all("g1", 1, vec![msg("a")]);
        store.append(msg("s"));
        store.replace_all("g1", 1, vec![msg("a"), msg("x")]);
        assert_eq!(ids(&store), vec!["a", "x", "s"]);
    }

    #[test]
    fn ownership_follows_viewer() {
        let mut store = MessageStore::new("g1", 1);
        let mut other = msg("b");
        other.sender_id = "u2".to_string();
        store.replace_all("g1", 1, vec![msg("a"), other]);

        store.update_ownership(Some("u2"));
        let mine: Vec<bool> = store.messages().iter().map(|m| m.is_mine).collect();
        assert_eq!(mine, vec![false, true]);

        store.update_ownership(None);
        assert!(store.messages().iter().all(|m| !m.is_mine));
    }
}
