//! Ordered, deduplicated message collection backing the chat view.
//!
//! The store is owned by the session actor, so every method takes `&mut self`
//! and none of them lock. Order is insertion order, which matches creation
//! order for everything the server hands out.

use shared::{
    expiry::message_expired,
    models::{Message, MessageId, Timestamp},
};
use std::collections::HashSet;

/// Where an incoming message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Replaced the entry with the same id.
    Replaced,
    /// Resolved a provisional entry with the same author and content.
    ResolvedProvisional,
    /// Appended as a new entry.
    Appended,
}

/// What `confirm` did with a server record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The provisional entry was replaced in place.
    Replaced,
    /// The record was already present, so nothing changed.
    AlreadyPresent,
    /// Neither entry was present and the record was appended.
    Appended,
}

/// Messages in creation order, at most one entry per id.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    entries: Vec<Message>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.id == id)
    }

    /// Appends `message` unless its id is present, in which case the existing
    /// entry is replaced in place.
    pub fn upsert(&mut self, message: Message) {
        match self.position(&message.id) {
            Some(index) => self.entries[index] = message,
            None => self.entries.push(message),
        }
    }

    /// Merges a message that did not originate from this client.
    pub fn reconcile_incoming(&mut self, message: Message) -> MergeOutcome {
        if let Some(index) = self.position(&message.id) {
            self.entries[index] = message;
            return MergeOutcome::Replaced;
        }

        let provisional = self.entries.iter().position(|entry| {
            entry.is_provisional()
                && entry.user_id == message.user_id
                && entry.content == message.content
        });
        if let Some(index) = provisional {
            self.entries[index] = message;
            return MergeOutcome::ResolvedProvisional;
        }

        self.entries.push(message);
        MergeOutcome::Appended
    }

    /// Swaps in a full snapshot when it carries at least one unknown id.
    ///
    /// Expired entries are dropped from `snapshot` first. A snapshot whose ids
    /// are all known locally leaves the store untouched, including any local
    /// entries the snapshot lacks. Returns whether the store changed.
    pub fn replace_all(&mut self, snapshot: Vec<Message>, now: Timestamp) -> bool {
        let mut fresh: Vec<Message> = snapshot
            .into_iter()
            .filter(|message| !message_expired(message, now))
            .collect();

        let known: HashSet<&MessageId> = self.entries.iter().map(|entry| &entry.id).collect();
        let has_unknown = fresh.iter().any(|message| !known.contains(&message.id));
        if !has_unknown {
            return false;
        }

        fresh.sort_by_key(|message| message.created_at);
        fresh.dedup_by(|later, earlier| later.id == earlier.id);
        self.entries = fresh;
        true
    }

    /// Removes the entry with `id`, returning it if present.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        self.position(id).map(|index| self.entries.remove(index))
    }

    /// Resolves a provisional entry with the server record for it.
    pub fn confirm(&mut self, provisional_id: &MessageId, message: Message) -> ConfirmOutcome {
        if self.position(&message.id).is_some() {
            // The feed delivered the record first and already resolved the
            // provisional entry; drop it if it is somehow still around.
            self.remove(provisional_id);
            return ConfirmOutcome::AlreadyPresent;
        }

        match self.position(provisional_id) {
            Some(index) => {
                self.entries[index] = message;
                ConfirmOutcome::Replaced
            }
            None => {
                self.entries.push(message);
                ConfirmOutcome::Appended
            }
        }
    }

    /// Drops every entry whose expiry has been reached. Returns the number removed.
    pub fn remove_expired(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|message| !message_expired(message, now));
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }
}
