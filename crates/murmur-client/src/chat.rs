//! Per-pairing text chat log.
//!
//! Append-only and session-scoped: the controller clears it on every
//! transition that abandons the current pairing, so a new partner never
//! sees earlier messages.

use chrono::{DateTime, Utc};

/// Which side of the pairing produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOrigin {
    Local,
    Remote,
}

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub id: u64,
    pub text: String,
    pub origin: ChatOrigin,
    pub sent_at: DateTime<Utc>,
}

/// Ordered message log with monotonically increasing local ids.
#[derive(Debug, Default)]
pub(crate) struct ChatLog {
    next_id: u64,
    entries: Vec<ChatEntry>,
}

impl ChatLog {
    /// Append a line and return its id.
    pub(crate) fn append(&mut self, text: impl Into<String>, origin: ChatOrigin) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(ChatEntry {
            id,
            text: text.into(),
            origin,
            sent_at: Utc::now(),
        });
        id
    }

    /// Drop all entries. Ids keep counting up so a reader can tell a
    /// fresh log's messages apart from a previous pairing's.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let mut log = ChatLog::default();
        let a = log.append("hi", ChatOrigin::Local);
        let b = log.append("hey", ChatOrigin::Remote);
        assert!(b > a);
    }

    #[test]
    fn clear_empties_but_keeps_counting() {
        let mut log = ChatLog::default();
        log.append("one", ChatOrigin::Local);
        log.append("two", ChatOrigin::Remote);
        log.clear();
        assert!(log.entries().is_empty());

        let id = log.append("three", ChatOrigin::Local);
        assert_eq!(id, 2);
    }

    #[test]
    fn preserves_order_and_origin() {
        let mut log = ChatLog::default();
        log.append("a", ChatOrigin::Local);
        log.append("b", ChatOrigin::Remote);
        let entries = log.entries();
        assert_eq!(entries[0].text, "a");
        assert_eq!(entries[0].origin, ChatOrigin::Local);
        assert_eq!(entries[1].text, "b");
        assert_eq!(entries[1].origin, ChatOrigin::Remote);
    }
}
