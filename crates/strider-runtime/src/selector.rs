//! Reactive command scoring.
//!
//! When no scripted step is available every known action is scored against
//! the live sensors and the recent history:
//!
//! ```text
//! score = (matches / num_sensors) × discount^distance-to-goal × freq / overall_freq
//! ```
//!
//! Actions with no path to a goal score zero, so among them only the match
//! count separates candidates.  Higher-level actions are scored through the level-0 action that starts
//! them.  Each selectable command keeps its best candidate; the winner is
//! picked by score, then match count, then lower level, and exact ties are
//! broken by the agent's seeded generator.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use strider_memory::{ActionId, EpisodeStore, ModelBuilder};
use strider_types::{Command, SensorValue};

use crate::plan::{Hop, goal_distances};

/// Inputs of the scoring formula that come from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreParams {
    pub discount: f64,
    /// Goals further away than this many steps earn nothing.
    pub max_route_len: usize,
}

/// Best evidence found for one command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub score: f64,
    pub matches: usize,
    pub level: usize,
    pub action: ActionId,
}

/// Order candidates: higher score, then more matches, then lower level.
pub(crate) fn rank(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then(a.matches.cmp(&b.matches))
        .then(b.level.cmp(&a.level))
}

/// Best candidate per selectable command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    entries: [Option<CandidateScore>; Command::SELECTABLE.len()],
}

impl ScoreTable {
    fn slot(cmd: Command) -> Option<usize> {
        Command::SELECTABLE.iter().position(|c| *c == cmd)
    }

    /// Keep `candidate` for `cmd` if it beats the current entry.
    pub fn offer(&mut self, cmd: Command, candidate: CandidateScore) {
        let Some(slot) = Self::slot(cmd) else {
            return;
        };
        let entry = &mut self.entries[slot];
        if entry.is_none_or(|best| rank(&candidate, &best) == Ordering::Greater) {
            *entry = Some(candidate);
        }
    }

    pub fn get(&self, cmd: Command) -> Option<&CandidateScore> {
        self.entries[Self::slot(cmd)?].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Command, &CandidateScore)> {
        Command::SELECTABLE
            .iter()
            .zip(&self.entries)
            .filter_map(|(cmd, entry)| entry.as_ref().map(|c| (*cmd, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }
}

/// Score every known action against `current`.
pub fn generate_score_table(
    builder: &ModelBuilder,
    store: &EpisodeStore,
    current: &[SensorValue],
    params: ScoreParams,
) -> ScoreTable {
    let mut table = ScoreTable::default();
    let Some(top) = builder.actions().top_level() else {
        return table;
    };
    let distances: Vec<HashMap<ActionId, Hop>> = (0..=top)
        .map(|level| goal_distances(builder, store, level))
        .collect();
    let num_sensors = store.schema().num_sensors.max(1) as f64;

    for (id, action) in builder.actions().iter() {
        let Some(primitive) = builder.first_primitive(id) else {
            continue;
        };
        let Some(cmd) = builder.actions().get(primitive).and_then(|a| a.cmd) else {
            continue;
        };
        let matches = builder.primitive_match(store, primitive, current);
        if matches == 0 {
            continue;
        }
        // No path to a goal within the route bound: no downstream reward.
        let reward = distances[action.level]
            .get(&id)
            .filter(|hop| hop.dist <= params.max_route_len)
            .map_or(0.0, |hop| {
                params.discount.powi(i32::try_from(hop.dist).unwrap_or(i32::MAX))
            });
        let score = matches as f64 / num_sensors * reward * builder.actions().reliability(id);
        table.offer(
            cmd,
            CandidateScore {
                score,
                matches,
                level: action.level,
                action: id,
            },
        );
    }
    table
}

/// Pick the best command in `table`, breaking exact ties at random.
///
/// Returns `None` when the table is empty.
pub fn find_top_match<R: Rng>(
    table: &ScoreTable,
    rng: &mut R,
) -> Option<(Command, CandidateScore)> {
    let best = table.iter().map(|(_, c)| *c).max_by(rank)?;
    let tied: Vec<(Command, CandidateScore)> = table
        .iter()
        .filter(|(_, c)| rank(c, &best) == Ordering::Equal)
        .map(|(cmd, c)| (cmd, *c))
        .collect();
    tied.choose(rng).copied()
}

/// A uniformly random selectable command.
pub fn random_command<R: Rng>(rng: &mut R) -> Command {
    Command::SELECTABLE[rng.gen_range(0..Command::SELECTABLE.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use strider_memory::BuilderConfig;
    use strider_types::{SensorSchema, int_sensors};

    const PARAMS: ScoreParams = ScoreParams {
        discount: 0.9,
        max_route_len: 15,
    };

    fn learn(pairs: &[([i64; 3], Command)]) -> (ModelBuilder, EpisodeStore) {
        let mut store = EpisodeStore::new(SensorSchema::new(3));
        for (sensors, cmd) in pairs {
            store.add_episode(int_sensors(sensors), *cmd).unwrap();
        }
        let mut builder = ModelBuilder::new(BuilderConfig {
            num_to_match: 3,
            lhs_len: 1,
            max_level_depth: 1,
        });
        builder.update(&store);
        (builder, store)
    }

    fn candidate(score: f64, matches: usize, level: usize) -> CandidateScore {
        CandidateScore {
            score,
            matches,
            level,
            action: ActionId(0),
        }
    }

    #[test]
    fn ranking_order() {
        assert_eq!(rank(&candidate(0.9, 1, 0), &candidate(0.5, 3, 0)), Ordering::Greater);
        assert_eq!(rank(&candidate(0.5, 3, 2), &candidate(0.5, 2, 0)), Ordering::Greater);
        assert_eq!(rank(&candidate(0.5, 3, 0), &candidate(0.5, 3, 1)), Ordering::Greater);
        assert_eq!(rank(&candidate(0.5, 3, 1), &candidate(0.5, 3, 1)), Ordering::Equal);
    }

    #[test]
    fn table_keeps_best_per_command() {
        let mut table = ScoreTable::default();
        table.offer(Command::Left, candidate(0.2, 1, 0));
        table.offer(Command::Left, candidate(0.7, 2, 0));
        table.offer(Command::Left, candidate(0.4, 3, 0));
        table.offer(Command::Song, candidate(1.0, 3, 0));
        assert_eq!(table.get(Command::Left).unwrap().score, 0.7);
        assert!(table.get(Command::Song).is_none());
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn empty_models_give_no_match() {
        let (builder, store) = learn(&[]);
        let table = generate_score_table(&builder, &store, &int_sensors(&[0, 0, 0]), PARAMS);
        assert!(table.is_empty());
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(find_top_match(&table, &mut rng), None);
    }

    #[test]
    fn goal_reaching_command_wins() {
        // From [0,0,0]: Right leads to the goal, Left leads to a dead end.
        let (builder, store) = learn(&[
            ([0, 0, 0], Command::Right),
            ([1, 0, 0], Command::Left),
            ([0, 0, 0], Command::Left),
            ([0, 1, 1], Command::Left),
        ]);
        let table = generate_score_table(&builder, &store, &int_sensors(&[0, 0, 0]), PARAMS);
        let right = table.get(Command::Right).unwrap();
        let left = table.get(Command::Left).unwrap();
        assert!(right.score > left.score);

        let mut rng = SmallRng::seed_from_u64(7);
        let (cmd, best) = find_top_match(&table, &mut rng).unwrap();
        assert_eq!(cmd, Command::Right);
        assert_eq!(best.matches, 3);
    }

    #[test]
    fn goal_beats_dead_end_without_discount() {
        // Right reaches the goal, Left only ever led to a dead end.
        let (builder, store) = learn(&[
            ([0, 0, 0], Command::Right),
            ([1, 0, 0], Command::Blink),
            ([0, 0, 0], Command::Left),
            ([0, 1, 1], Command::Blink),
        ]);
        let params = ScoreParams {
            discount: 1.0,
            max_route_len: 15,
        };
        let table = generate_score_table(&builder, &store, &int_sensors(&[0, 0, 0]), params);
        let right = table.get(Command::Right).unwrap();
        let left = table.get(Command::Left).unwrap();
        assert_eq!(right.score, 1.0);
        assert_eq!(left.score, 0.0);
        assert_eq!(rank(right, left), Ordering::Greater);

        let (cmd, _) = find_top_match(&table, &mut SmallRng::seed_from_u64(0)).unwrap();
        assert_eq!(cmd, Command::Right);
    }

    #[test]
    fn without_any_goal_the_best_match_still_wins() {
        let (builder, store) = learn(&[
            ([0, 0, 0], Command::Left),
            ([0, 1, 0], Command::Right),
            ([0, 1, 1], Command::Left),
        ]);
        let table = generate_score_table(&builder, &store, &int_sensors(&[0, 1, 0]), PARAMS);
        assert!(table.iter().all(|(_, c)| c.score == 0.0));
        let (cmd, best) = find_top_match(&table, &mut SmallRng::seed_from_u64(0)).unwrap();
        assert_eq!(cmd, Command::Right);
        assert_eq!(best.matches, 3);
    }

    #[test]
    fn partial_matches_score_lower() {
        let (builder, store) = learn(&[([0, 0, 0], Command::Blink), ([1, 0, 0], Command::Blink)]);
        let exact = generate_score_table(&builder, &store, &int_sensors(&[0, 0, 0]), PARAMS);
        let near = generate_score_table(&builder, &store, &int_sensors(&[0, 0, 1]), PARAMS);
        let exact = exact.get(Command::Blink).unwrap();
        let near = near.get(Command::Blink).unwrap();
        assert_eq!(exact.matches, 3);
        assert_eq!(near.matches, 2);
        assert!(exact.score > near.score);
    }

    #[test]
    fn exact_ties_are_broken_by_the_seed() {
        let (builder, store) = learn(&[
            ([0, 0, 0], Command::Left),
            ([1, 0, 0], Command::Blink),
            ([0, 0, 0], Command::Right),
            ([1, 0, 0], Command::Blink),
        ]);
        let table = generate_score_table(&builder, &store, &int_sensors(&[0, 0, 0]), PARAMS);
        assert_eq!(
            rank(table.get(Command::Left).unwrap(), table.get(Command::Right).unwrap()),
            Ordering::Equal
        );

        let pick = |seed| find_top_match(&table, &mut SmallRng::seed_from_u64(seed)).unwrap().0;
        for seed in 0..16 {
            let cmd = pick(seed);
            assert!(cmd == Command::Left || cmd == Command::Right);
            assert_eq!(cmd, pick(seed));
        }
        let seen: std::collections::HashSet<_> = (0..64).map(pick).collect();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn random_command_is_selectable() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..50 {
            assert!(Command::SELECTABLE.contains(&random_command(&mut rng)));
        }
    }
}
