use std::collections::BTreeSet;
use std::rc::Rc;

use backstop_core::graph::{Derived, State, Tracker};
use backstop_core::model::{ActionBatch, ScanStatus};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchSide {
    Add,
    Remove,
}

impl BatchSide {
    pub fn label(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Add => Self::Remove,
            Self::Remove => Self::Add,
        }
    }

    fn of(self, batch: &ActionBatch) -> &[String] {
        match self {
            Self::Add => &batch.add,
            Self::Remove => &batch.remove,
        }
    }
}

/// Paths the user chose to act on, per side of the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub add: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

impl Selection {
    /// Every proposed addition selected, no removal selected.
    pub fn seeded(batch: &ActionBatch) -> Self {
        Self {
            add: batch.add.iter().cloned().collect(),
            remove: BTreeSet::new(),
        }
    }

    pub fn side(&self, side: BatchSide) -> &BTreeSet<String> {
        match side {
            BatchSide::Add => &self.add,
            BatchSide::Remove => &self.remove,
        }
    }

    fn side_mut(&mut self, side: BatchSide) -> &mut BTreeSet<String> {
        match side {
            BatchSide::Add => &mut self.add,
            BatchSide::Remove => &mut self.remove,
        }
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn to_batch(&self) -> ActionBatch {
        ActionBatch {
            add: self.add.iter().cloned().collect(),
            remove: self.remove.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub path: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleRows {
    pub rows: Vec<VisibleRow>,
    pub total_matches: usize,
    /// Set to the full match count when it exceeds the display cap.
    pub truncated: Option<usize>,
}

pub struct SelectionModel {
    batch: Derived<ActionBatch>,
    selection: State<Selection>,
    seeded_from: Tracker,
}

impl SelectionModel {
    pub(crate) fn new(status: &State<ScanStatus>) -> Self {
        let source = status.clone();
        let batch = Derived::memoized(
            "action_batch",
            vec![status.dependency()],
            move || match source.get().as_ref() {
                ScanStatus::Result(batch) => batch.clone(),
                _ => ActionBatch::default(),
            },
            |next, previous| next == previous,
        );

        Self {
            batch,
            selection: State::new("selection", Selection::default()),
            seeded_from: Tracker::new(),
        }
    }

    /// Reseeds the selection when the batch moved since it was last seeded.
    /// The status writer calls this after every write so that a batch which
    /// passes through empty and back is seen as a fresh result.
    pub(crate) fn sync(&self) {
        if self.seeded_from.changed(&self.batch) {
            let batch = self.batch.get();
            debug!(
                add = batch.add.len(),
                remove = batch.remove.len(),
                "selection reseeded"
            );
            self.selection.set(Selection::seeded(&batch));
        }
    }

    pub fn action_batch(&self) -> Rc<ActionBatch> {
        self.batch.get()
    }

    pub fn selection(&self) -> Rc<Selection> {
        self.sync();
        self.selection.get()
    }

    pub fn selected_count(&self) -> usize {
        self.selection().len()
    }

    pub fn is_selected(&self, side: BatchSide, path: &str) -> bool {
        self.selection().side(side).contains(path)
    }

    /// Flips one path. Paths outside the current batch are ignored.
    pub fn toggle(&self, side: BatchSide, path: &str) -> bool {
        self.sync();
        if !side.of(&self.batch.get()).iter().any(|item| item == path) {
            debug!(side = side.label(), path, "ignoring toggle outside batch");
            return false;
        }

        self.selection.update(|selection| {
            let set = selection.side_mut(side);
            if !set.remove(path) {
                set.insert(path.to_string());
            }
        });
        true
    }

    pub fn select_all(&self, side: BatchSide) {
        self.sync();
        let all: BTreeSet<String> = side.of(&self.batch.get()).iter().cloned().collect();
        self.selection.update(|selection| *selection.side_mut(side) = all);
    }

    pub fn select_none(&self, side: BatchSide) {
        self.sync();
        self.selection
            .update(|selection| selection.side_mut(side).clear());
    }

    /// Selects the whole side unless it is already fully selected, in which
    /// case the side is cleared.
    pub fn toggle_all(&self, side: BatchSide) {
        let selected = self.selection().side(side).len();
        let available = side.of(&self.batch.get()).len();
        if selected == available {
            self.select_none(side);
        } else {
            self.select_all(side);
        }
    }

    /// Rows of one side whose path contains `filter` (case-insensitive), at
    /// most `cap` of them.
    pub fn visible(&self, side: BatchSide, filter: &str, cap: usize) -> VisibleRows {
        let selection = self.selection();
        let batch = self.batch.get();
        let needle = filter.trim().to_lowercase();

        let matches: Vec<&String> = side
            .of(&batch)
            .iter()
            .filter(|path| needle.is_empty() || path.to_lowercase().contains(&needle))
            .collect();
        let total_matches = matches.len();

        let rows = matches
            .into_iter()
            .take(cap)
            .map(|path| VisibleRow {
                path: path.clone(),
                selected: selection.side(side).contains(path.as_str()),
            })
            .collect();

        VisibleRows {
            rows,
            total_matches,
            truncated: (total_matches > cap).then_some(total_matches),
        }
    }
}
