//! Action/Sequence Builder.
//!
//! Induces a hierarchy of action models from the episode stream:
//!
//! | level | memory entries               | actions map                        |
//! |-------|------------------------------|------------------------------------|
//! | 0     | episodes                     | episode + command → next episode   |
//! | k ≥ 1 | closed level-(k-1) sequences | sequence → next sequence           |
//!
//! Each newly induced action is appended to the open sequence of its level.
//! The sequence closes when that action reaches a goal or turns out to be
//! indeterminate; the closed sequence (deduplicated) becomes the newest entry
//! of the next level's memory, and the last two entries there induce a new
//! action one level up.  The climb is a bounded loop that stops at
//! `max_level_depth`.

use strider_types::{Command, SensorValue};
use tracing::debug;

use crate::action::{Action, ActionId, ActionTable, Outcome, PatternMatcher};
use crate::episodic::{EpisodeStore, compare_episodes, compare_sensors};
use crate::sequence::{Sequence, SequenceId, SequenceTable};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables of the induction process.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    /// Minimum number of equal sensor fields for two episodes to match.
    pub num_to_match: usize,
    /// Number of episodes in a level-0 LHS.  Higher levels always use one
    /// memory entry.
    pub lhs_len: usize,
    /// Number of levels in the hierarchy, level 0 included.
    pub max_level_depth: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            num_to_match: 8,
            lhs_len: 1,
            max_level_depth: 4,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LevelMemory – pattern matching over every level's memory
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of the memory at every level, used to compare actions.
pub struct LevelMemory<'a> {
    store: &'a EpisodeStore,
    /// `memory[k - 1]` holds the entries of level `k`.
    memory: &'a [Vec<SequenceId>],
    num_to_match: usize,
}

impl LevelMemory<'_> {
    fn sequence_at(&self, level: usize, index: usize) -> Option<SequenceId> {
        self.memory.get(level.checked_sub(1)?)?.get(index).copied()
    }

    /// Do entries `i` and `j` of `level` memory match?
    fn entries_match(&self, level: usize, i: usize, j: usize, compare_command: bool) -> bool {
        if level == 0 {
            match (self.store.get(i), self.store.get(j)) {
                (Some(a), Some(b)) => compare_episodes(a, b, compare_command) >= self.num_to_match,
                _ => false,
            }
        } else {
            let a = self.sequence_at(level, i);
            a.is_some() && a == self.sequence_at(level, j)
        }
    }
}

impl PatternMatcher for LevelMemory<'_> {
    fn same_pattern(&self, a: &Action, b: &Action) -> bool {
        if a.level != b.level || a.length != b.length || a.cmd != b.cmd {
            return false;
        }
        (0..a.length).all(|back| {
            match (a.index.checked_sub(back), b.index.checked_sub(back)) {
                (Some(i), Some(j)) => self.entries_match(a.level, i, j, true),
                _ => false,
            }
        })
    }

    fn same_outcome(&self, a: &Action, b: &Action) -> bool {
        match (a.outcome, b.outcome) {
            (Outcome::Observed(i), Outcome::Observed(j)) => self.entries_match(a.level, i, j, false),
            (Outcome::Pending, Outcome::Pending) => true,
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModelBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of every learned model: actions, sequences and higher-level memory.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    config: BuilderConfig,
    actions: ActionTable,
    sequences: SequenceTable,
    /// `memory[k - 1]` holds the entries of level `k`.
    memory: Vec<Vec<SequenceId>>,
    /// Open (not yet closed) sequence of each level.
    current: Vec<Vec<ActionId>>,
    /// Number of episodes whose incoming transition has been learned.
    learned: usize,
}

impl ModelBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        let depth = config.max_level_depth.max(1);
        Self {
            config,
            actions: ActionTable::new(),
            sequences: SequenceTable::new(),
            memory: vec![Vec::new(); depth - 1],
            current: vec![Vec::new(); depth],
            learned: 1,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    pub fn sequences(&self) -> &SequenceTable {
        &self.sequences
    }

    /// Number of entries in the memory of `level`.
    pub fn memory_len(&self, store: &EpisodeStore, level: usize) -> usize {
        match level {
            0 => store.len(),
            k => self.memory.get(k - 1).map_or(0, Vec::len),
        }
    }

    /// The open sequence at `level`.
    pub fn open_sequence(&self, level: usize) -> &[ActionId] {
        self.current.get(level).map_or(&[], Vec::as_slice)
    }

    /// Learn every transition appended to `store` since the last call.
    ///
    /// Returns the ids of the actions induced or reinforced, lowest level
    /// first.
    pub fn update(&mut self, store: &EpisodeStore) -> Vec<ActionId> {
        let mut touched = Vec::new();
        while self.learned < store.len() {
            let outcome = self.learned;
            self.learned += 1;
            touched.extend(self.learn_transition(store, outcome));
        }
        touched
    }

    /// Drop every action, sequence and higher-level entry.
    ///
    /// Episodes are untouched; learning resumes with the next transition
    /// appended to the store.
    pub fn reset(&mut self) {
        self.actions.clear();
        self.sequences.clear();
        self.memory.iter_mut().for_each(Vec::clear);
        self.current.iter_mut().for_each(Vec::clear);
        debug!("learned models reset");
    }

    fn learn_transition(&mut self, store: &EpisodeStore, outcome: usize) -> Vec<ActionId> {
        let (Some(prev), Some(next)) = (store.get(outcome - 1), store.get(outcome)) else {
            return Vec::new();
        };
        let length = self.config.lhs_len.clamp(1, outcome);
        let candidate = Action::new(
            0,
            outcome - 1,
            length,
            Some(prev.cmd),
            Outcome::Observed(outcome),
            store.episode_contains_reward(next),
        );
        let matcher = LevelMemory {
            store,
            memory: &self.memory,
            num_to_match: self.config.num_to_match,
        };
        let id = self.actions.add_action(candidate, true, &matcher);
        self.escalate(store, id)
    }

    /// Append `id` to its level's open sequence and climb while sequences
    /// close.
    fn escalate(&mut self, store: &EpisodeStore, mut id: ActionId) -> Vec<ActionId> {
        let mut touched = vec![id];
        let mut level = 0;
        loop {
            self.current[level].push(id);
            let closes = self
                .actions
                .get(id)
                .is_some_and(|a| a.contains_goal || a.is_indeterminate);
            if !closes {
                break;
            }

            let closed = std::mem::take(&mut self.current[level]);
            let seq_id = self.sequences.add(Sequence::new(level, closed));
            if level + 1 >= self.current.len() {
                break;
            }

            let entries = &mut self.memory[level];
            entries.push(seq_id);
            if entries.len() < 2 {
                break;
            }
            let outcome = entries.len() - 1;
            let contains_goal = self
                .sequences
                .get(seq_id)
                .is_some_and(|s| s.contains_goal(&self.actions));
            let candidate = Action::new(
                level + 1,
                outcome - 1,
                1,
                None,
                Outcome::Observed(outcome),
                contains_goal,
            );
            let matcher = LevelMemory {
                store,
                memory: &self.memory,
                num_to_match: self.config.num_to_match,
            };
            id = self.actions.add_action(candidate, true, &matcher);
            debug!(level = level + 1, action = id.0, sequence = seq_id.0, "sequence escalated");
            touched.push(id);
            level += 1;
        }
        touched
    }

    // ── structural queries ───────────────────────────────────────────────────

    /// Memory entry of a higher-level action's LHS.
    pub fn lhs_sequence(&self, id: ActionId) -> Option<SequenceId> {
        let action = self.actions.get(id)?;
        self.memory.get(action.level.checked_sub(1)?)?.get(action.index).copied()
    }

    /// Memory entry a higher-level action leads to.
    pub fn outcome_sequence(&self, id: ActionId) -> Option<SequenceId> {
        let action = self.actions.get(id)?;
        let outcome = action.outcome_index()?;
        self.memory.get(action.level.checked_sub(1)?)?.get(outcome).copied()
    }

    /// The level-0 action that starts executing `id`.
    pub fn first_primitive(&self, mut id: ActionId) -> Option<ActionId> {
        for _ in 0..self.current.len() {
            let action = self.actions.get(id)?;
            if action.level == 0 {
                return Some(id);
            }
            let seq = self.sequences.get(self.lhs_sequence(id)?)?;
            id = seq.first()?;
        }
        None
    }

    /// The command that starts executing `id`.
    pub fn first_command(&self, id: ActionId) -> Option<Command> {
        self.first_primitive(id)
            .and_then(|p| self.actions.get(p))
            .and_then(|a| a.cmd)
    }

    /// Does executing `from` land where `to` can be executed?
    pub fn leads_to(&self, store: &EpisodeStore, from: ActionId, to: ActionId) -> bool {
        let (Some(a), Some(b)) = (self.actions.get(from), self.actions.get(to)) else {
            return false;
        };
        let Some(outcome) = a.outcome_index() else {
            return false;
        };
        if a.level != b.level {
            return false;
        }
        if a.level == 0 {
            match (store.get(outcome), store.get(b.index)) {
                (Some(x), Some(y)) => {
                    compare_sensors(&x.sensors, &y.sensors) >= self.config.num_to_match
                }
                _ => false,
            }
        } else {
            let Some(entries) = self.memory.get(a.level - 1) else {
                return false;
            };
            entries.get(outcome).is_some() && entries.get(outcome) == entries.get(b.index)
        }
    }

    /// How well a level-0 action's LHS matches the live situation.
    ///
    /// The final LHS entry is compared with `current` (sensors only) and the
    /// count of equal fields returned.  Earlier LHS entries must match the
    /// most recent episodes of `store`, command included, or the result is 0.
    pub fn primitive_match(
        &self,
        store: &EpisodeStore,
        id: ActionId,
        current: &[SensorValue],
    ) -> usize {
        let Some(action) = self.actions.get(id).filter(|a| a.level == 0) else {
            return 0;
        };
        let Some(last) = store.get(action.index) else {
            return 0;
        };
        let history = store.recent(action.length - 1);
        if history.len() + 1 < action.length {
            return 0;
        }
        for (back, seen) in history.iter().rev().enumerate() {
            let lhs = action.index.checked_sub(back + 1).and_then(|i| store.get(i));
            match lhs {
                Some(lhs) if compare_episodes(lhs, seen, true) >= self.config.num_to_match => {}
                _ => return 0,
            }
        }
        compare_sensors(&last.sensors, current)
    }

    /// `true` when executing `id` can begin from `current`.
    pub fn is_start(&self, store: &EpisodeStore, id: ActionId, current: &[SensorValue]) -> bool {
        self.first_primitive(id)
            .is_some_and(|p| self.primitive_match(store, p, current) >= self.config.num_to_match)
    }

    /// Refresh every action's start flag against `current`.
    pub fn mark_start_states(&mut self, store: &EpisodeStore, current: &[SensorValue]) {
        let starts: Vec<ActionId> = self
            .actions
            .iter()
            .map(|(id, _)| id)
            .filter(|id| self.is_start(store, *id, current))
            .collect();
        self.actions.mark_start_states(&starts);
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
