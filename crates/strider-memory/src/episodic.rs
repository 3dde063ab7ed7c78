//! Episode Store & Comparator.
//!
//! The store is the append-only ground truth every higher level is induced
//! from.  Episodes are addressed by their ordinal, which doubles as their
//! index, so references held by actions and sequences stay valid as the
//! store grows.
//!
//! # Matching
//!
//! Two episodes *match* when at least `num_to_match` of their sensor fields
//! are equal (and, when asked, their commands agree).  A threshold rather than
//! exact equality lets noisy sensor streams still induce stable actions.
//!
//! # Example
//!
//! ```rust
//! use strider_memory::episodic::{EpisodeStore, compare_episodes};
//! use strider_types::{Command, SensorSchema, int_sensors};
//!
//! let mut store = EpisodeStore::new(SensorSchema::new(3));
//! let a = store.add_episode(int_sensors(&[0, 0, 0]), Command::Forward).unwrap();
//! let b = store.add_episode(int_sensors(&[0, 0, 0]), Command::Forward).unwrap();
//!
//! assert_eq!(compare_episodes(store.get(a).unwrap(), store.get(b).unwrap(), true), 3);
//! ```

use strider_types::{Command, Episode, SensorSchema, SensorValue, StriderError};
use tracing::trace;

// ─────────────────────────────────────────────────────────────────────────────
// Comparator
// ─────────────────────────────────────────────────────────────────────────────

/// Count the positions at which two sensor vectors hold equal values.
pub fn compare_sensors(a: &[SensorValue], b: &[SensorValue]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x == y).count()
}

/// Count matching sensor fields of two episodes.
///
/// With `compare_command` set, episodes issued different commands share
/// nothing and the count is `0`.
pub fn compare_episodes(e1: &Episode, e2: &Episode, compare_command: bool) -> usize {
    if compare_command && e1.cmd != e2.cmd {
        return 0;
    }
    compare_sensors(&e1.sensors, &e2.sensors)
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodeStore
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only episodic memory for one agent.
#[derive(Debug, Clone)]
pub struct EpisodeStore {
    schema: SensorSchema,
    episodes: Vec<Episode>,
}

impl EpisodeStore {
    pub fn new(schema: SensorSchema) -> Self {
        Self {
            schema,
            episodes: Vec::new(),
        }
    }

    pub fn schema(&self) -> &SensorSchema {
        &self.schema
    }

    /// Append a new episode and return its ordinal.
    ///
    /// # Errors
    ///
    /// [`StriderError::InvalidArgument`] when `sensors` does not have exactly
    /// `num_sensors` fields.  Nothing is appended in that case.
    pub fn add_episode(
        &mut self,
        sensors: Vec<SensorValue>,
        cmd: Command,
    ) -> Result<usize, StriderError> {
        self.schema.validate(&sensors)?;
        let now = self.episodes.len();
        let episode = Episode::new(sensors, cmd, now);
        trace!(episode = %episode, "episode appended");
        self.episodes.push(episode);
        Ok(now)
    }

    pub fn get(&self, index: usize) -> Option<&Episode> {
        self.episodes.get(index)
    }

    pub fn last(&self) -> Option<&Episode> {
        self.episodes.last()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Episode> {
        self.episodes.iter()
    }

    /// The most recent `n` episodes, oldest first.
    pub fn recent(&self, n: usize) -> &[Episode] {
        let start = self.episodes.len().saturating_sub(n);
        &self.episodes[start..]
    }

    // ── reward queries ───────────────────────────────────────────────────────

    /// `true` when `sensors` satisfies the reward predicate.
    pub fn sensors_contain_reward(&self, sensors: &[SensorValue]) -> bool {
        sensors
            .get(self.schema.reward_field)
            .is_some_and(SensorValue::is_truthy)
    }

    /// `true` when the episode is a goal state.
    pub fn episode_contains_reward(&self, episode: &Episode) -> bool {
        self.sensors_contain_reward(&episode.sensors)
    }

    /// Reward carried by the episode, `0` when it is not a goal state.
    pub fn get_reward(&self, episode: &Episode) -> i64 {
        match episode.sensors.get(self.schema.reward_field) {
            Some(v) if v.is_truthy() => v.as_int().max(1),
            _ => 0,
        }
    }

    /// Score reported by the robot, falling back to the reward when the
    /// schema has no score field.
    pub fn get_score(&self, episode: &Episode) -> i64 {
        match self.schema.score_field {
            Some(field) => episode.sensors.get(field).map_or(0, SensorValue::as_int),
            None => self.get_reward(episode),
        }
    }

    /// Index of the most recent goal episode, if any.
    pub fn last_reward(&self) -> Option<usize> {
        self.episodes
            .iter()
            .rposition(|e| self.episode_contains_reward(e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
