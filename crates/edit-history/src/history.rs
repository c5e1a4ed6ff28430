//! The undo/redo state machine for one content item.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use montage_edit_model::EditState;

/// Result of an undo or redo.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryMove {
    /// The pointer moved; this snapshot is now current.
    Moved(EditState),
    /// Already at the floor (undo) or the cap (redo); nothing changed.
    AtBoundary,
}

impl HistoryMove {
    pub fn snapshot(&self) -> Option<&EditState> {
        match self {
            HistoryMove::Moved(state) => Some(state),
            HistoryMove::AtBoundary => None,
        }
    }
}

/// Read-only view of a history, as served to the editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub snapshots: Vec<EditState>,
    /// -1 when the history is empty.
    pub current_index: i64,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Bounded snapshot sequence with a current-position pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditHistory {
    snapshots: VecDeque<EditState>,
    current: Option<usize>,
    capacity: usize,
}

impl EditHistory {
    /// Create an empty history keeping at most `capacity` snapshots (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: None,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn current(&self) -> Option<&EditState> {
        self.current.and_then(|i| self.snapshots.get(i))
    }

    pub fn current_index(&self) -> i64 {
        self.current.map(|i| i as i64).unwrap_or(-1)
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.current, Some(i) if i > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.current, Some(i) if i + 1 < self.snapshots.len())
    }

    /// Record a new snapshot, discarding any redo branch first.
    pub fn append(&mut self, state: EditState) {
        let keep = self.current.map(|i| i + 1).unwrap_or(0);
        self.snapshots.truncate(keep);
        self.snapshots.push_back(state);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
        self.current = Some(self.snapshots.len() - 1);
    }

    pub fn undo(&mut self) -> HistoryMove {
        match self.current {
            Some(i) if i > 0 => {
                self.current = Some(i - 1);
                self.moved_to(i - 1)
            }
            _ => HistoryMove::AtBoundary,
        }
    }

    pub fn redo(&mut self) -> HistoryMove {
        match self.current {
            Some(i) if i + 1 < self.snapshots.len() => {
                self.current = Some(i + 1);
                self.moved_to(i + 1)
            }
            _ => HistoryMove::AtBoundary,
        }
    }

    fn moved_to(&self, index: usize) -> HistoryMove {
        self.snapshots
            .get(index)
            .cloned()
            .map(HistoryMove::Moved)
            .unwrap_or(HistoryMove::AtBoundary)
    }

    /// Back to the initial empty state.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = None;
    }

    /// Change the bound, evicting the oldest snapshots if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
            self.current = self.current.map(|i| i.saturating_sub(1));
        }
    }

    /// Repair a pointer that does not fit the sequence (e.g. a hand-edited file).
    pub fn normalize(&mut self) {
        self.current = match (self.current, self.snapshots.len()) {
            (_, 0) => None,
            (Some(i), len) if i < len => Some(i),
            (_, len) => Some(len - 1),
        };
        self.set_capacity(self.capacity);
    }

    pub fn view(&self) -> HistoryView {
        HistoryView {
            snapshots: self.snapshots.iter().cloned().collect(),
            current_index: self.current_index(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;

    fn snap(n: i64) -> EditState {
        EditState::capture(json!({ "n": n }), Utc::now())
    }

    fn value(state: &EditState) -> i64 {
        state.state["n"].as_i64().unwrap()
    }

    #[test]
    fn test_initial_state() {
        let history = EditHistory::new(10);
        assert_eq!(history.current_index(), -1);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        let view = history.view();
        assert!(view.snapshots.is_empty());
        assert_eq!(view.current_index, -1);
    }

    #[test]
    fn test_undo_after_append_returns_prior() {
        let mut history = EditHistory::new(10);
        history.append(snap(1));
        history.append(snap(2));
        let HistoryMove::Moved(prior) = history.undo() else {
            panic!("expected move");
        };
        assert_eq!(value(&prior), 1);
        let HistoryMove::Moved(back) = history.redo() else {
            panic!("expected move");
        };
        assert_eq!(value(&back), 2);
    }

    #[test]
    fn test_undo_on_single_snapshot_is_noop() {
        let mut history = EditHistory::new(10);
        history.append(snap(1));
        assert_eq!(history.undo(), HistoryMove::AtBoundary);
        assert_eq!(history.current_index(), 0);
    }

    #[test]
    fn test_undo_and_redo_on_empty_are_noops() {
        let mut history = EditHistory::new(10);
        assert_eq!(history.undo(), HistoryMove::AtBoundary);
        assert_eq!(history.redo(), HistoryMove::AtBoundary);
        assert_eq!(history.current_index(), -1);
    }

    #[test]
    fn test_append_after_undo_truncates() {
        let mut history = EditHistory::new(10);
        for n in 1..=5 {
            history.append(snap(n));
        }
        history.undo();
        history.undo();
        assert_eq!(history.current_index(), 2);
        history.append(snap(99));
        assert_eq!(history.len(), 4);
        assert_eq!(history.current_index(), 3);
        assert!(!history.can_redo());
        assert_eq!(value(history.current().unwrap()), 99);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = EditHistory::new(3);
        for n in 1..=5 {
            history.append(snap(n));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.current_index(), 2);
        let values: Vec<_> = history.view().snapshots.iter().map(value).collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn test_shrinking_capacity_shifts_pointer() {
        let mut history = EditHistory::new(5);
        for n in 1..=5 {
            history.append(snap(n));
        }
        history.undo();
        history.set_capacity(2);
        assert_eq!(history.len(), 2);
        assert_eq!(value(history.current().unwrap()), 4);
    }

    #[test]
    fn test_clear() {
        let mut history = EditHistory::new(5);
        history.append(snap(1));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.current_index(), -1);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Append,
        Undo,
        Redo,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![Just(Step::Append), Just(Step::Undo), Just(Step::Redo)]
    }

    proptest! {
        #[test]
        fn prop_pointer_stays_in_bounds(capacity in 1usize..8, steps in prop::collection::vec(step(), 0..60)) {
            let mut history = EditHistory::new(capacity);
            let mut next = 0;
            for step in steps {
                match step {
                    Step::Append => {
                        let before = history.current_index();
                        next += 1;
                        history.append(snap(next));
                        let expected_len = ((before + 2) as usize).min(capacity);
                        prop_assert_eq!(history.len(), expected_len);
                        prop_assert_eq!(history.current_index(), history.len() as i64 - 1);
                        prop_assert_eq!(value(history.current().unwrap()), next);
                    }
                    Step::Undo => {
                        let before = history.current_index();
                        let moved = history.undo();
                        match moved {
                            HistoryMove::Moved(_) => prop_assert_eq!(history.current_index(), before - 1),
                            HistoryMove::AtBoundary => prop_assert_eq!(history.current_index(), before),
                        }
                    }
                    Step::Redo => {
                        let before = history.current_index();
                        let moved = history.redo();
                        match moved {
                            HistoryMove::Moved(_) => prop_assert_eq!(history.current_index(), before + 1),
                            HistoryMove::AtBoundary => prop_assert_eq!(history.current_index(), before),
                        }
                    }
                }
                prop_assert!(history.len() <= capacity);
                if history.is_empty() {
                    prop_assert_eq!(history.current_index(), -1);
                } else {
                    prop_assert!(history.current_index() >= 0);
                    prop_assert!((history.current_index() as usize) < history.len());
                }
            }
        }

        #[test]
        fn prop_undo_then_redo_round_trips(count in 2i64..10) {
            let mut history = EditHistory::new(16);
            for n in 1..=count {
                history.append(snap(n));
            }
            let before = history.current().cloned().unwrap();
            prop_assert!(history.undo().snapshot().is_some());
            let HistoryMove::Moved(after) = history.redo() else {
                panic!("redo should move after an undo");
            };
            prop_assert_eq!(after.id, before.id);
        }
    }
}
