//! Induced actions and indeterminate cousin groups.
//!
//! An [`Action`] is a rule "when memory looks like this pattern and this
//! command is issued, this outcome follows", induced at some abstraction
//! level.  When the same pattern has been seen to lead to different
//! outcomes, every hypothesis is kept: the actions are flagged
//! indeterminate and joined into one [`CousinGroup`] that owns a single
//! shared frequency counter.
//!
//! Actions never hold references to each other or to memory.  They carry
//! indices, and cousins carry a [`CousinGroupId`] into the group table owned
//! by [`ActionTable`].

use std::fmt;

use serde::{Deserialize, Serialize};
use strider_types::Command;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Stable index of an action in its [`ActionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub usize);

/// Stable index of a cousin group in its [`ActionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CousinGroupId(pub usize);

/// Where an action leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Index of the resulting entry in the action's level memory.
    Observed(usize),
    /// The outcome has not been observed yet.
    Pending,
}

/// Cousin membership.  Determinate actions are explicitly `Solitary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cousins {
    Solitary,
    Group(CousinGroupId),
}

// ─────────────────────────────────────────────────────────────────────────────
// Action
// ─────────────────────────────────────────────────────────────────────────────

/// An induced (pattern → command → outcome) rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub level: usize,
    /// Index into the level memory where the LHS ends.
    pub index: usize,
    /// Number of memory entries in the LHS.
    pub length: usize,
    /// Command issued at the end of the LHS.  Only level-0 actions carry one;
    /// higher levels execute their LHS sequence instead.
    pub cmd: Option<Command>,
    /// Number of times this action has matched memory.
    pub freq: u32,
    pub outcome: Outcome,
    pub is_indeterminate: bool,
    pub cousins: Cousins,
    /// The outcome contains a goal state.
    pub contains_goal: bool,
    /// The LHS matches the state the agent is currently in.  Refreshed by the
    /// planner before each search.
    pub contains_start: bool,
}

impl Action {
    /// A fresh determinate action seen once.
    pub fn new(
        level: usize,
        index: usize,
        length: usize,
        cmd: Option<Command>,
        outcome: Outcome,
        contains_goal: bool,
    ) -> Self {
        Self {
            level,
            index,
            length,
            cmd,
            freq: 1,
            outcome,
            is_indeterminate: false,
            cousins: Cousins::Solitary,
            contains_goal,
            contains_start: false,
        }
    }

    /// First memory index covered by the LHS.
    pub fn lhs_start(&self) -> usize {
        (self.index + 1).saturating_sub(self.length)
    }

    pub fn outcome_index(&self) -> Option<usize> {
        match self.outcome {
            Outcome::Observed(i) => Some(i),
            Outcome::Pending => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} [{}..={}]", self.level, self.lhs_start(), self.index)?;
        if let Some(cmd) = self.cmd {
            write!(f, " {cmd}")?;
        }
        match self.outcome {
            Outcome::Observed(i) => write!(f, " -> {i}")?,
            Outcome::Pending => write!(f, " -> ?")?,
        }
        write!(f, " freq={}", self.freq)?;
        if self.is_indeterminate {
            f.write_str(" (indeterminate)")?;
        }
        if self.contains_goal {
            f.write_str(" *goal*")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PatternMatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Decides pattern and outcome equivalence of two actions.
///
/// The table itself knows nothing about episodes or sequences; the builder
/// supplies a matcher that reads the right level of memory.
pub trait PatternMatcher {
    /// `true` when both actions have equivalent LHS patterns and commands.
    fn same_pattern(&self, a: &Action, b: &Action) -> bool;

    /// `true` when both actions lead to equivalent outcomes.
    fn same_outcome(&self, a: &Action, b: &Action) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// CousinGroup
// ─────────────────────────────────────────────────────────────────────────────

/// All actions sharing one pattern but differing in outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CousinGroup {
    pub members: Vec<ActionId>,
    /// Number of times the shared pattern has matched, across every cousin.
    pub overall_freq: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// ActionTable
// ─────────────────────────────────────────────────────────────────────────────

/// Arena of every action at every level, plus the cousin group table.
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    actions: Vec<Action>,
    groups: Vec<CousinGroup>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &Action)> {
        self.actions.iter().enumerate().map(|(i, a)| (ActionId(i), a))
    }

    /// Ids of every action at `level`, in creation order.
    pub fn ids_at_level(&self, level: usize) -> Vec<ActionId> {
        self.iter()
            .filter(|(_, a)| a.level == level)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn count_at_level(&self, level: usize) -> usize {
        self.actions.iter().filter(|a| a.level == level).count()
    }

    /// Highest level holding at least one action.
    pub fn top_level(&self) -> Option<usize> {
        self.actions.iter().map(|a| a.level).max()
    }

    /// Insert `candidate`, or fold it into an existing identical action.
    ///
    /// Without `check_redundant` the candidate is appended as-is.  With it,
    /// an existing action at the same level with an equivalent pattern and
    /// outcome absorbs the candidate's frequency and its id is returned.  If
    /// equivalent patterns exist only with different outcomes, the candidate
    /// is appended and joins (or founds) their cousin group.
    pub fn add_action(
        &mut self,
        candidate: Action,
        check_redundant: bool,
        matcher: &impl PatternMatcher,
    ) -> ActionId {
        if !check_redundant {
            return self.push(candidate);
        }

        let mut siblings = Vec::new();
        let mut duplicate = None;
        for (id, existing) in self.iter() {
            if existing.level != candidate.level || !matcher.same_pattern(existing, &candidate) {
                continue;
            }
            if matcher.same_outcome(existing, &candidate) {
                duplicate = Some(id);
                break;
            }
            siblings.push(id);
        }
        if let Some(id) = duplicate {
            self.record_matches(id, candidate.freq);
            return id;
        }

        let id = self.push(candidate);
        if !siblings.is_empty() {
            siblings.push(id);
            self.join_cousins(&siblings);
            debug!(action = id.0, cousins = siblings.len(), "indeterminate pattern detected");
        }
        id
    }

    /// Record one more match of `id`, updating the shared counter of its
    /// cousin group.
    pub fn record_match(&mut self, id: ActionId) {
        self.record_matches(id, 1);
    }

    fn record_matches(&mut self, id: ActionId, n: u32) {
        let Some(action) = self.actions.get_mut(id.0) else {
            return;
        };
        action.freq += n;
        if let Cousins::Group(g) = action.cousins {
            self.groups[g.0].overall_freq += n;
        }
    }

    /// How often the action's pattern has matched memory, counted across all
    /// of its cousins.  Equal to `freq` for determinate actions.
    pub fn overall_freq(&self, id: ActionId) -> u32 {
        match self.get(id) {
            Some(Action {
                cousins: Cousins::Group(g),
                ..
            }) => self.groups[g.0].overall_freq,
            Some(action) => action.freq,
            None => 0,
        }
    }

    /// Share of the pattern's matches that led to this action's outcome.
    pub fn reliability(&self, id: ActionId) -> f64 {
        let overall = self.overall_freq(id);
        match self.get(id) {
            Some(action) if overall > 0 => f64::from(action.freq) / f64::from(overall),
            _ => 0.0,
        }
    }

    /// Every member of the action's cousin group (itself included), or an
    /// empty slice for determinate actions.
    pub fn cousins_of(&self, id: ActionId) -> &[ActionId] {
        match self.get(id).map(|a| a.cousins) {
            Some(Cousins::Group(g)) => &self.groups[g.0].members,
            _ => &[],
        }
    }

    pub fn group(&self, id: CousinGroupId) -> Option<&CousinGroup> {
        self.groups.get(id.0)
    }

    /// Detach `id` from its cousin group.
    ///
    /// The shared counter loses the action's frequency.  A group left with a
    /// single member dissolves and that member becomes determinate again.
    pub fn remove_cousin(&mut self, id: ActionId) {
        let Some(Cousins::Group(g)) = self.get(id).map(|a| a.cousins) else {
            return;
        };
        let freq = self.actions[id.0].freq;
        let group = &mut self.groups[g.0];
        group.members.retain(|m| *m != id);
        group.overall_freq = group.overall_freq.saturating_sub(freq);
        self.make_solitary(id);

        if self.groups[g.0].members.len() == 1 {
            let last = self.groups[g.0].members[0];
            self.groups[g.0] = CousinGroup::default();
            self.make_solitary(last);
        }
    }

    /// Set the start flag on exactly the given actions.
    pub fn mark_start_states(&mut self, starts: &[ActionId]) {
        for action in &mut self.actions {
            action.contains_start = false;
        }
        for id in starts {
            if let Some(action) = self.actions.get_mut(id.0) {
                action.contains_start = true;
            }
        }
    }

    /// Drop every action and group.
    pub fn clear(&mut self) {
        self.actions.clear();
        self.groups.clear();
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn push(&mut self, action: Action) -> ActionId {
        let id = ActionId(self.actions.len());
        self.actions.push(action);
        id
    }

    fn make_solitary(&mut self, id: ActionId) {
        let action = &mut self.actions[id.0];
        action.cousins = Cousins::Solitary;
        action.is_indeterminate = false;
    }

    /// Put every action in `ids` into one group, merging any groups they
    /// already belong to.
    fn join_cousins(&mut self, ids: &[ActionId]) {
        let target = ids.iter().find_map(|id| match self.actions[id.0].cousins {
            Cousins::Group(g) => Some(g),
            Cousins::Solitary => None,
        });
        let target = match target {
            Some(g) => g,
            None => {
                self.groups.push(CousinGroup::default());
                CousinGroupId(self.groups.len() - 1)
            }
        };

        for &id in ids {
            match self.actions[id.0].cousins {
                Cousins::Group(g) if g == target => {}
                Cousins::Group(other) => {
                    // Pattern matching is tolerant, so two groups can meet
                    // through a candidate that resembles both.
                    let absorbed = std::mem::take(&mut self.groups[other.0]);
                    for member in &absorbed.members {
                        self.actions[member.0].cousins = Cousins::Group(target);
                    }
                    let group = &mut self.groups[target.0];
                    group.members.extend(absorbed.members);
                    group.overall_freq += absorbed.overall_freq;
                }
                Cousins::Solitary => {
                    let freq = self.actions[id.0].freq;
                    let group = &mut self.groups[target.0];
                    group.members.push(id);
                    group.overall_freq += freq;
                    let action = &mut self.actions[id.0];
                    action.cousins = Cousins::Group(target);
                    action.is_indeterminate = true;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Patterns are equal when `index % 10` agrees; outcomes when the outcome
    /// index agrees.  Enough to drive the table without any memory.
    struct ModMatcher;

    impl PatternMatcher for ModMatcher {
        fn same_pattern(&self, a: &Action, b: &Action) -> bool {
            a.index % 10 == b.index % 10 && a.cmd == b.cmd
        }

        fn same_outcome(&self, a: &Action, b: &Action) -> bool {
            a.outcome == b.outcome
        }
    }

    fn action(index: usize, outcome: usize) -> Action {
        Action::new(0, index, 1, Some(Command::Forward), Outcome::Observed(outcome), false)
    }

    #[test]
    fn identical_action_merges_frequency() {
        let mut table = ActionTable::new();
        let a = table.add_action(action(1, 5), true, &ModMatcher);
        let b = table.add_action(action(11, 5), true, &ModMatcher);
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(a).unwrap().freq, 2);
        assert_eq!(table.get(a).unwrap().cousins, Cousins::Solitary);
        assert!(table.cousins_of(a).is_empty());
    }

    #[test]
    fn without_redundancy_check_duplicates_are_kept() {
        let mut table = ActionTable::new();
        table.add_action(action(1, 5), false, &ModMatcher);
        table.add_action(action(1, 5), false, &ModMatcher);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn different_outcome_forms_cousin_group() {
        let mut table = ActionTable::new();
        let a = table.add_action(action(1, 5), true, &ModMatcher);
        let b = table.add_action(action(11, 6), true, &ModMatcher);
        assert_ne!(a, b);
        assert!(table.get(a).unwrap().is_indeterminate);
        assert!(table.get(b).unwrap().is_indeterminate);
        assert_eq!(table.cousins_of(a), &[a, b]);
        assert_eq!(table.cousins_of(a), table.cousins_of(b));
        assert_eq!(table.overall_freq(a), 2);
    }

    #[test]
    fn cousins_share_one_counter() {
        let mut table = ActionTable::new();
        let a = table.add_action(action(1, 5), true, &ModMatcher);
        let b = table.add_action(action(11, 6), true, &ModMatcher);
        let c = table.add_action(action(21, 7), true, &ModMatcher);

        let before = table.overall_freq(c);
        table.record_match(a);
        assert_eq!(table.overall_freq(b), before + 1);
        assert_eq!(table.overall_freq(c), before + 1);
        assert_eq!(table.get(a).unwrap().freq, 2);
        assert_eq!(table.get(b).unwrap().freq, 1);
        assert!((table.reliability(a) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn merge_into_cousin_bumps_shared_counter() {
        let mut table = ActionTable::new();
        let a = table.add_action(action(1, 5), true, &ModMatcher);
        let b = table.add_action(action(11, 6), true, &ModMatcher);
        let again = table.add_action(action(31, 6), true, &ModMatcher);
        assert_eq!(again, b);
        assert_eq!(table.overall_freq(a), 3);
    }

    #[test]
    fn removing_a_cousin_updates_shared_state() {
        let mut table = ActionTable::new();
        let a = table.add_action(action(1, 5), true, &ModMatcher);
        let b = table.add_action(action(11, 6), true, &ModMatcher);
        let c = table.add_action(action(21, 7), true, &ModMatcher);

        table.remove_cousin(c);
        assert_eq!(table.get(c).unwrap().cousins, Cousins::Solitary);
        assert!(!table.get(c).unwrap().is_indeterminate);
        assert_eq!(table.overall_freq(a), 2);
        assert_eq!(table.cousins_of(b), &[a, b]);

        table.remove_cousin(b);
        assert_eq!(table.get(a).unwrap().cousins, Cousins::Solitary);
        assert!(!table.get(a).unwrap().is_indeterminate);
        assert_eq!(table.overall_freq(a), 1);
    }

    #[test]
    fn levels_are_tracked() {
        let mut table = ActionTable::new();
        assert_eq!(table.top_level(), None);
        table.add_action(action(1, 2), true, &ModMatcher);
        let mut high = action(0, 1);
        high.level = 2;
        high.cmd = None;
        let h = table.add_action(high, true, &ModMatcher);
        assert_eq!(table.top_level(), Some(2));
        assert_eq!(table.count_at_level(1), 0);
        assert_eq!(table.ids_at_level(2), vec![h]);
    }

    #[test]
    fn start_flags_are_replaced() {
        let mut table = ActionTable::new();
        let a = table.add_action(action(1, 2), true, &ModMatcher);
        let b = table.add_action(action(2, 3), true, &ModMatcher);
        table.mark_start_states(&[a]);
        assert!(table.get(a).unwrap().contains_start);
        table.mark_start_states(&[b]);
        assert!(!table.get(a).unwrap().contains_start);
        assert!(table.get(b).unwrap().contains_start);
    }

    #[test]
    fn display_mentions_command_and_outcome() {
        let text = action(3, 4).to_string();
        assert!(text.contains("FW"));
        assert!(text.contains("-> 4"));
    }
}
