//! Per-slot queue timeline
//!
//! Each slot owns a timeline; only the Master's is session-visible. On a slot
//! swap the outgoing Master's timeline is re-parented onto the incoming slot:
//!
//! ```text
//! Old Master:   [h1, h2, CURRENT, f1, INCOMING, f3]
//!                              │
//!                              ▼  plan_swap(INCOMING)
//! New Master:   [h1, h2, CURRENT, INCOMING, f1, f3]
//!               └─── history ──┘  ^current  └ future ┘
//! ```

use crate::types::{QueueEntry, RepeatMode};
use rand::seq::SliceRandom;
use rand::thread_rng;

/// Ordered entries with a cursor, plus the repeat/shuffle flags that travel
/// with them across swaps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueTimeline {
    entries: Vec<QueueEntry>,
    current: Option<usize>,
    repeat: RepeatMode,
    shuffle: bool,
}

impl QueueTimeline {
    /// Timeline positioned at `index` (clamped to the last entry)
    pub fn new(entries: Vec<QueueEntry>, index: usize) -> Self {
        let current = if entries.is_empty() {
            None
        } else {
            Some(index.min(entries.len() - 1))
        };
        Self {
            entries,
            current,
            repeat: RepeatMode::Off,
            shuffle: false,
        }
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_entry(&self) -> Option<&QueueEntry> {
        self.current.and_then(|index| self.entries.get(index))
    }

    /// Entries before the current one
    pub fn history(&self) -> &[QueueEntry] {
        match self.current {
            Some(index) => &self.entries[..index],
            None => &[],
        }
    }

    /// Entries after the current one
    pub fn upcoming(&self) -> &[QueueEntry] {
        match self.current {
            Some(index) => &self.entries[index + 1..],
            None => &[],
        }
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Enable or disable shuffle
    ///
    /// Enabling randomizes the upcoming entries (Fisher-Yates); history and
    /// the current entry keep their positions. Disabling keeps the order.
    pub fn set_shuffle(&mut self, enabled: bool) {
        if enabled && !self.shuffle {
            if let Some(index) = self.current {
                self.entries[index + 1..].shuffle(&mut thread_rng());
            }
        }
        self.shuffle = enabled;
    }

    /// Entry that plays after the current one
    pub fn next_entry(&self) -> Option<&QueueEntry> {
        let index = self.current?;
        match self.repeat {
            RepeatMode::One => self.entries.get(index),
            RepeatMode::All if index + 1 >= self.entries.len() => self.entries.first(),
            _ => self.entries.get(index + 1),
        }
    }

    /// Entry that played before the current one
    pub fn previous_entry(&self) -> Option<&QueueEntry> {
        let index = self.current?;
        match self.repeat {
            RepeatMode::One => self.entries.get(index),
            RepeatMode::All if index == 0 => self.entries.last(),
            _ => index.checked_sub(1).and_then(|prev| self.entries.get(prev)),
        }
    }

    /// Move the cursor to the next entry
    pub fn advance(&mut self) -> Option<&QueueEntry> {
        let index = self.current?;
        let next = match self.repeat {
            RepeatMode::One => index,
            RepeatMode::All if index + 1 >= self.entries.len() => 0,
            _ if index + 1 < self.entries.len() => index + 1,
            _ => return None,
        };
        self.current = Some(next);
        self.entries.get(next)
    }

    /// Move the cursor to the previous entry
    pub fn retreat(&mut self) -> Option<&QueueEntry> {
        let index = self.current?;
        let previous = match self.repeat {
            RepeatMode::One => index,
            RepeatMode::All if index == 0 => self.entries.len() - 1,
            _ => index.checked_sub(1)?,
        };
        self.current = Some(previous);
        self.entries.get(previous)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }

    /// Timeline for the slot that is about to become Master with `incoming`
    ///
    /// - History: everything up to and including the current entry, minus
    ///   the current entry when `incoming` is that same media (repeat into
    ///   itself)
    /// - Future: everything after the current entry, minus the first entry
    ///   matching `incoming` (the incoming slot already holds it)
    /// - Repeat and shuffle flags are carried over
    ///
    /// Under `RepeatMode::All`, an incoming entry found only in the history
    /// is a wrap-around: the order is kept and the cursor moves back to it.
    pub fn plan_swap(&self, incoming: &QueueEntry) -> QueueTimeline {
        let Some(index) = self.current else {
            return self.carry_flags(vec![incoming.clone()], 0);
        };

        if self.entries[index].id == incoming.id {
            let mut entries = self.entries[..index].to_vec();
            let current = entries.len();
            entries.push(self.entries[index].clone());
            entries.extend_from_slice(&self.entries[index + 1..]);
            return self.carry_flags(entries, current);
        }

        let mut future = self.entries[index + 1..].to_vec();
        let incoming = match future.iter().position(|entry| entry.id == incoming.id) {
            Some(position) => future.remove(position),
            None => {
                if self.repeat == RepeatMode::All {
                    if let Some(position) =
                        self.history().iter().position(|entry| entry.id == incoming.id)
                    {
                        return self.carry_flags(self.entries.clone(), position);
                    }
                }
                incoming.clone()
            }
        };

        let mut entries = self.entries[..=index].to_vec();
        let current = entries.len();
        entries.push(incoming);
        entries.extend(future);
        self.carry_flags(entries, current)
    }

    fn carry_flags(&self, entries: Vec<QueueEntry>, current: usize) -> QueueTimeline {
        QueueTimeline {
            entries,
            current: Some(current),
            repeat: self.repeat,
            shuffle: self.shuffle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segue_core::MediaReference;

    fn entry(name: &str) -> QueueEntry {
        QueueEntry::from_reference(MediaReference::local(format!("/music/{name}.mp3")))
    }

    fn ids(timeline: &QueueTimeline) -> Vec<String> {
        timeline
            .entries()
            .iter()
            .map(|entry| {
                entry
                    .id
                    .as_str()
                    .trim_start_matches("/music/")
                    .trim_end_matches(".mp3")
                    .to_string()
            })
            .collect()
    }

    fn timeline(names: &[&str], index: usize) -> QueueTimeline {
        QueueTimeline::new(names.iter().map(|name| entry(name)).collect(), index)
    }

    #[test]
    fn test_new_clamps_index() {
        let queue = timeline(&["a", "b"], 9);
        assert_eq!(queue.current_index(), Some(1));
        assert_eq!(QueueTimeline::new(Vec::new(), 0).current_index(), None);
    }

    #[test]
    fn test_history_and_upcoming() {
        let queue = timeline(&["a", "b", "c", "d"], 1);
        assert_eq!(queue.history().len(), 1);
        assert_eq!(queue.current_entry(), Some(&entry("b")));
        assert_eq!(queue.upcoming().len(), 2);
    }

    #[test]
    fn test_plan_swap_moves_incoming_out_of_future() {
        let queue = timeline(&["h", "cur", "f1", "next", "f3"], 1);
        let planned = queue.plan_swap(&entry("next"));

        assert_eq!(ids(&planned), ["h", "cur", "next", "f1", "f3"]);
        assert_eq!(planned.current_entry(), Some(&entry("next")));
        assert_eq!(planned.history().len(), 2);
    }

    #[test]
    fn test_plan_swap_keeps_queue_metadata_for_incoming() {
        let mut entries = vec![entry("cur"), entry("next").with_title("Next", "Artist")];
        entries.push(entry("after"));
        let queue = QueueTimeline::new(entries, 0);

        let planned = queue.plan_swap(&entry("next"));
        assert_eq!(
            planned.current_entry().and_then(|e| e.title.as_deref()),
            Some("Next")
        );
    }

    #[test]
    fn test_plan_swap_only_removes_first_match() {
        let queue = timeline(&["cur", "x", "next", "next"], 0);
        let planned = queue.plan_swap(&entry("next"));
        assert_eq!(ids(&planned), ["cur", "next", "x", "next"]);
    }

    #[test]
    fn test_plan_swap_repeat_into_itself() {
        let mut queue = timeline(&["h", "cur", "f"], 1);
        queue.set_repeat(RepeatMode::One);

        let planned = queue.plan_swap(&entry("cur"));
        assert_eq!(ids(&planned), ["h", "cur", "f"]);
        assert_eq!(planned.current_index(), Some(1));
        assert_eq!(planned.repeat(), RepeatMode::One);
    }

    #[test]
    fn test_plan_swap_unknown_incoming_is_inserted() {
        let queue = timeline(&["a", "cur", "b"], 1);
        let planned = queue.plan_swap(&entry("other"));
        assert_eq!(ids(&planned), ["a", "cur", "other", "b"]);
        assert_eq!(planned.current_index(), Some(2));
    }

    #[test]
    fn test_plan_swap_repeat_all_wraps() {
        let mut queue = timeline(&["a", "b", "c"], 2);
        queue.set_repeat(RepeatMode::All);

        let planned = queue.plan_swap(&entry("a"));
        assert_eq!(ids(&planned), ["a", "b", "c"]);
        assert_eq!(planned.current_index(), Some(0));
    }

    #[test]
    fn test_plan_swap_on_empty_master() {
        let planned = QueueTimeline::default().plan_swap(&entry("first"));
        assert_eq!(ids(&planned), ["first"]);
        assert_eq!(planned.current_index(), Some(0));
    }

    #[test]
    fn test_plan_swap_carries_flags() {
        let mut queue = timeline(&["a", "b"], 0);
        queue.set_repeat(RepeatMode::All);
        queue.set_shuffle(true);

        let planned = queue.plan_swap(&entry("b"));
        assert_eq!(planned.repeat(), RepeatMode::All);
        assert!(planned.shuffle());
    }

    #[test]
    fn test_next_entry_respects_repeat() {
        let mut queue = timeline(&["a", "b"], 1);
        assert_eq!(queue.next_entry(), None);

        queue.set_repeat(RepeatMode::All);
        assert_eq!(queue.next_entry(), Some(&entry("a")));

        queue.set_repeat(RepeatMode::One);
        assert_eq!(queue.next_entry(), Some(&entry("b")));
    }

    #[test]
    fn test_previous_entry_respects_repeat() {
        let mut queue = timeline(&["a", "b"], 0);
        assert_eq!(queue.previous_entry(), None);

        queue.set_repeat(RepeatMode::All);
        assert_eq!(queue.previous_entry(), Some(&entry("b")));
    }

    #[test]
    fn test_advance_and_retreat() {
        let mut queue = timeline(&["a", "b", "c"], 0);
        assert_eq!(queue.advance(), Some(&entry("b")));
        assert_eq!(queue.advance(), Some(&entry("c")));
        assert_eq!(queue.advance(), None);
        assert_eq!(queue.current_index(), Some(2));

        assert_eq!(queue.retreat(), Some(&entry("b")));
    }

    #[test]
    fn test_shuffle_keeps_history_and_current() {
        let names: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut queue = timeline(&refs, 5);

        queue.set_shuffle(true);

        assert!(queue.shuffle());
        assert_eq!(queue.len(), 20);
        assert_eq!(queue.current_entry(), Some(&entry("t5")));
        assert_eq!(ids(&queue)[..5], ["t0", "t1", "t2", "t3", "t4"]);

        let mut upcoming = ids(&queue)[6..].to_vec();
        upcoming.sort();
        let mut expected: Vec<String> = (6..20).map(|i| format!("t{i}")).collect();
        expected.sort();
        assert_eq!(upcoming, expected);
    }
}
