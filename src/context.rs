//! Rolling translation context.

use std::collections::VecDeque;

/// Keeps the most recent clip translations within a character budget.
///
/// Outputs are retained first-in first-out. After each addition the oldest
/// entries are dropped while the total length exceeds `max_length`, but the
/// newest entry is always kept, even when it alone is over budget.
///
/// ```
/// use signpipe::ContextTracker;
///
/// let mut tracker = ContextTracker::new(10);
/// assert_eq!(tracker.current_context(), None);
///
/// tracker.add_next_output("hello");
/// tracker.add_next_output("world");
/// assert_eq!(tracker.current_context().as_deref(), Some("hello world"));
///
/// tracker.add_next_output("again");
/// assert_eq!(tracker.current_context().as_deref(), Some("world again"));
/// ```
#[derive(Debug, Clone)]
pub struct ContextTracker {
    max_length: usize,
    entries: VecDeque<String>,
    total_length: usize,
}

impl ContextTracker {
    /// An empty tracker with a budget of `max_length` characters.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            entries: VecDeque::new(),
            total_length: 0,
        }
    }

    /// Append the translation of the latest clip.
    pub fn add_next_output(&mut self, output: impl Into<String>) {
        let output = output.into();
        self.total_length += output.chars().count();
        self.entries.push_back(output);

        while self.total_length > self.max_length && self.entries.len() > 1 {
            if let Some(oldest) = self.entries.pop_front() {
                self.total_length -= oldest.chars().count();
            }
        }
    }

    /// The retained outputs joined with single spaces, or `None` before the
    /// first output.
    pub fn current_context(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.entries.iter().map(String::as_str).collect::<Vec<_>>().join(" "))
    }

    /// Total characters retained, not counting separators.
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    /// Number of retained outputs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` before the first output.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_stays_within_bound() {
        let mut tracker = ContextTracker::new(20);
        for length in [3, 7, 11, 2, 9, 5, 20, 1] {
            tracker.add_next_output("x".repeat(length));
            assert!(tracker.total_length() <= 20);
        }
    }

    #[test]
    fn oversized_entry_is_kept_alone() {
        let mut tracker = ContextTracker::new(5);
        tracker.add_next_output("abc");
        tracker.add_next_output("abcdefghij");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.current_context().as_deref(), Some("abcdefghij"));

        tracker.add_next_output("xy");
        assert_eq!(tracker.current_context().as_deref(), Some("xy"));
    }

    #[test]
    fn length_counts_characters() {
        let mut tracker = ContextTracker::new(4);
        tracker.add_next_output("žžžž");
        tracker.add_next_output("");
        assert_eq!(tracker.total_length(), 4);
        assert_eq!(tracker.len(), 2);
    }
}
