//! Sequences of actions and the deduplicating sequence table.
//!
//! A sequence is the ordered run of actions an agent performed at one level
//! between two "interesting" moments (a goal or an indeterminate action).
//! Closed sequences become the memory entries of the next level up, so two
//! sequences with the same actions in the same order must share one id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{ActionId, ActionTable};

/// Stable index of a sequence in its [`SequenceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceId(pub usize);

/// An ordered list of actions at one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub level: usize,
    pub actions: Vec<ActionId>,
}

impl Sequence {
    pub fn new(level: usize, actions: Vec<ActionId>) -> Self {
        Self { level, actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn first(&self) -> Option<ActionId> {
        self.actions.first().copied()
    }

    pub fn last(&self) -> Option<ActionId> {
        self.actions.last().copied()
    }

    /// `true` when any action in the sequence reaches a goal.
    pub fn contains_goal(&self, actions: &ActionTable) -> bool {
        self.actions
            .iter()
            .filter_map(|id| actions.get(*id))
            .any(|a| a.contains_goal)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} {{", self.level)?;
        for (i, id) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", id.0)?;
        }
        f.write_str("}")
    }
}

/// Every distinct sequence seen so far, across all levels.
#[derive(Debug, Clone, Default)]
pub struct SequenceTable {
    sequences: Vec<Sequence>,
}

impl SequenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn get(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SequenceId, &Sequence)> {
        self.sequences
            .iter()
            .enumerate()
            .map(|(i, s)| (SequenceId(i), s))
    }

    /// Find a stored sequence structurally equal to `seq`.
    ///
    /// With `ignore_self` set, that entry is skipped, which lets a caller ask
    /// whether a stored sequence has a duplicate elsewhere in the table.
    pub fn contains_sequence(
        &self,
        seq: &Sequence,
        ignore_self: Option<SequenceId>,
    ) -> Option<SequenceId> {
        self.iter()
            .filter(|(id, _)| Some(*id) != ignore_self)
            .find(|(_, s)| *s == seq)
            .map(|(id, _)| id)
    }

    /// Store `seq` unless an equal sequence already exists; either way return
    /// the id of the stored copy.
    pub fn add(&mut self, seq: Sequence) -> SequenceId {
        if let Some(id) = self.contains_sequence(&seq, None) {
            return id;
        }
        self.sequences.push(seq);
        SequenceId(self.sequences.len() - 1)
    }

    pub fn clear(&mut self) {
        self.sequences.clear();
    }
}
