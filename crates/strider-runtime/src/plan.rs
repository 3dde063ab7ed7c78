//! Route/Plan Manager.
//!
//! A [`Plan`] holds one [`Route`] per level of the action hierarchy.  The
//! top route is the chain of actions found by [`plan_route`]; every lower
//! route spells out how to execute the action its parent route is currently
//! on.  Only the level-0 route issues commands.
//!
//! # Route states
//!
//! ```text
//!  Empty ──plan_route──▶ Active ──take_next_step──▶ Active
//!                          │                          │
//!                  mismatched sensors          last step taken
//!                          ▼                          ▼
//!                        Recalc                    Complete
//! ```
//!
//! A route in `Recalc` is never repaired; the caller plans again from
//! scratch.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use strider_memory::{ActionId, EpisodeStore, ModelBuilder, Sequence};
use strider_types::{Command, SensorValue, StriderError};
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Route
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteState {
    Empty,
    Active,
    Recalc,
    Complete,
}

/// One level's plan: the sequences to execute and a cursor into them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub level: usize,
    pub sequences: Vec<Sequence>,
    pub curr_seq_index: usize,
    pub curr_act_index: usize,
    pub needs_recalc: bool,
    /// The final action of this route reaches the goal the plan aims for.
    pub goal_terminal: bool,
}

impl Route {
    pub fn new(level: usize, sequences: Vec<Sequence>, goal_terminal: bool) -> Self {
        Self {
            level,
            sequences: sequences.into_iter().filter(|s| !s.is_empty()).collect(),
            curr_seq_index: 0,
            curr_act_index: 0,
            needs_recalc: false,
            goal_terminal,
        }
    }

    pub fn state(&self) -> RouteState {
        if self.sequences.is_empty() {
            RouteState::Empty
        } else if self.needs_recalc {
            RouteState::Recalc
        } else if self.current().is_none() {
            RouteState::Complete
        } else {
            RouteState::Active
        }
    }

    /// The action under the cursor.
    pub fn current(&self) -> Option<ActionId> {
        self.sequences
            .get(self.curr_seq_index)?
            .actions
            .get(self.curr_act_index)
            .copied()
    }

    /// `true` when the cursor is on the route's final action.
    pub fn is_last(&self) -> bool {
        self.current().is_some()
            && self.curr_seq_index + 1 == self.sequences.len()
            && self.curr_act_index + 1 == self.sequences[self.curr_seq_index].len()
    }

    /// Total number of actions in the route.
    pub fn len(&self) -> usize {
        self.sequences.iter().map(Sequence::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Move the cursor one action forward and return the new current action.
    fn advance(&mut self) -> Option<ActionId> {
        self.curr_act_index += 1;
        while let Some(seq) = self.sequences.get(self.curr_seq_index) {
            if let Some(id) = seq.actions.get(self.curr_act_index) {
                return Some(*id);
            }
            self.curr_seq_index += 1;
            self.curr_act_index = 0;
        }
        None
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route L{}:", self.level)?;
        for (s, seq) in self.sequences.iter().enumerate() {
            f.write_str(" {")?;
            for (a, id) in seq.actions.iter().enumerate() {
                if a > 0 {
                    f.write_str(",")?;
                }
                if s == self.curr_seq_index && a == self.curr_act_index {
                    write!(f, ">{}", id.0)?;
                } else {
                    write!(f, "{}", id.0)?;
                }
            }
            f.write_str("}")?;
        }
        write!(f, " [{:?}]", self.state())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Goal distances
// ─────────────────────────────────────────────────────────────────────────────

/// Shortest known way from an action to a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    /// Number of further actions needed after this one (0 for goal actions).
    pub dist: usize,
    /// The next action on the way, `None` for goal actions.
    pub next: Option<ActionId>,
}

/// Breadth-first search backwards from every goal action at `level`.
///
/// Actions missing from the result cannot reach a goal.
pub fn goal_distances(
    builder: &ModelBuilder,
    store: &EpisodeStore,
    level: usize,
) -> HashMap<ActionId, Hop> {
    let ids = builder.actions().ids_at_level(level);
    let mut hops = HashMap::new();
    let mut queue = VecDeque::new();
    for id in &ids {
        if builder.actions().get(*id).is_some_and(|a| a.contains_goal) {
            hops.insert(*id, Hop { dist: 0, next: None });
            queue.push_back(*id);
        }
    }
    while let Some(to) = queue.pop_front() {
        let dist = hops[&to].dist + 1;
        for from in &ids {
            if !hops.contains_key(from) && builder.leads_to(store, *from, to) {
                hops.insert(*from, Hop { dist, next: Some(to) });
                queue.push_back(*from);
            }
        }
    }
    hops
}

// ─────────────────────────────────────────────────────────────────────────────
// Planning
// ─────────────────────────────────────────────────────────────────────────────

/// Find a chain of actions at `level` from a start action to a goal.
fn search_level(
    builder: &ModelBuilder,
    store: &EpisodeStore,
    level: usize,
    max_route_len: usize,
) -> Result<Vec<ActionId>, StriderError> {
    let hops = goal_distances(builder, store, level);
    if hops.is_empty() {
        return Err(StriderError::NoGoalInLevel);
    }

    let start = builder
        .actions()
        .ids_at_level(level)
        .into_iter()
        .filter(|id| builder.actions().get(*id).is_some_and(|a| a.contains_start))
        .filter_map(|id| hops.get(&id).map(|hop| (hop.dist, id)))
        .min()
        .ok_or(StriderError::NoRouteToGoal { level })?;

    let len = start.0 + 1;
    if len > max_route_len {
        return Err(StriderError::RouteTooLong {
            len,
            bound: max_route_len,
        });
    }

    let mut path = vec![start.1];
    let mut cursor = hops[&start.1].next;
    while let Some(id) = cursor {
        path.push(id);
        cursor = hops.get(&id).and_then(|h| h.next);
    }
    Ok(path)
}

/// Build a plan from the current situation to the nearest known goal.
///
/// Levels are searched from the highest populated one downward; the first
/// level yielding a chain wins.
///
/// # Errors
///
/// * [`StriderError::LevelNotPopulated`] – no actions at any level.
/// * [`StriderError::NoGoalInLevel`] – no level holds a goal action.
/// * [`StriderError::NoRouteToGoal`] / [`StriderError::RouteTooLong`] – goals
///   exist but none is reachable within `max_route_len` actions.
pub fn plan_route(
    builder: &mut ModelBuilder,
    store: &EpisodeStore,
    current: &[SensorValue],
    max_route_len: usize,
) -> Result<Plan, StriderError> {
    let Some(top) = builder.actions().top_level() else {
        return Err(StriderError::LevelNotPopulated);
    };
    builder.mark_start_states(store, current);

    let mut failure = StriderError::NoGoalInLevel;
    for level in (0..=top).rev() {
        if builder.actions().count_at_level(level) == 0 {
            continue;
        }
        match search_level(builder, store, level, max_route_len) {
            Ok(path) => {
                let plan = Plan::from_path(builder, level, path);
                info!(level, steps = plan.routes[level].len(), "route planned");
                return Ok(plan);
            }
            Err(StriderError::NoGoalInLevel) => {}
            Err(err) => {
                debug!(level, error = %err, "no usable route at level");
                if failure == StriderError::NoGoalInLevel {
                    failure = err;
                }
            }
        }
    }
    Err(failure)
}

// ─────────────────────────────────────────────────────────────────────────────
// Plan
// ─────────────────────────────────────────────────────────────────────────────

/// One route per level, executed top-down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// `routes[k]` is the route at level `k`.
    routes: Vec<Route>,
}

impl Plan {
    fn from_path(builder: &ModelBuilder, level: usize, path: Vec<ActionId>) -> Self {
        let mut routes = vec![Route::default(); level + 1];
        for (k, route) in routes.iter_mut().enumerate() {
            route.level = k;
        }
        routes[level] = Route::new(level, vec![Sequence::new(level, path)], true);
        let mut plan = Self { routes };
        plan.expand_from(builder, level);
        plan
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, level: usize) -> Option<&Route> {
        self.routes.get(level)
    }

    /// State of the plan as seen from the level-0 route.
    pub fn state(&self) -> RouteState {
        if self.routes.iter().any(|r| r.needs_recalc) {
            return RouteState::Recalc;
        }
        self.routes.first().map_or(RouteState::Empty, Route::state)
    }

    pub fn is_active(&self) -> bool {
        self.state() == RouteState::Active
    }

    pub fn needs_recalc(&self) -> bool {
        self.state() == RouteState::Recalc
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// The command the next step would issue.
    pub fn peek_command(&self, builder: &ModelBuilder) -> Option<Command> {
        let id = self.routes.first()?.current()?;
        builder.actions().get(id)?.cmd
    }

    /// Check the live sensors against the LHS of the next level-0 step.
    ///
    /// A mismatch flags the route for recalculation.
    pub fn next_step_is_valid(
        &mut self,
        builder: &ModelBuilder,
        store: &EpisodeStore,
        current: &[SensorValue],
    ) -> bool {
        let Some(route) = self.routes.first_mut() else {
            return false;
        };
        let Some(id) = route.current() else {
            return false;
        };
        if route.needs_recalc {
            return false;
        }
        let matches = builder.primitive_match(store, id, current);
        if matches >= builder.config().num_to_match {
            return true;
        }
        debug!(action = id.0, matches, "live sensors diverged from route");
        route.needs_recalc = true;
        false
    }

    /// Issue the next scripted command and advance the cursor.
    ///
    /// Returns `None` when the step is not valid; the plan is then flagged for
    /// a full replan.
    pub fn take_next_step(
        &mut self,
        builder: &ModelBuilder,
        store: &EpisodeStore,
        current: &[SensorValue],
    ) -> Option<Command> {
        if !self.next_step_is_valid(builder, store, current) {
            return None;
        }
        let cmd = self.peek_command(builder)?;
        self.advance(builder);
        Some(cmd)
    }

    /// Step the level-0 cursor, climbing while routes finish.
    fn advance(&mut self, builder: &ModelBuilder) {
        let mut level = 0;
        while level < self.routes.len() {
            if self.routes[level].advance().is_some() {
                self.expand_from(builder, level);
                return;
            }
            level += 1;
        }
        info!("plan complete");
    }

    /// Rebuild every route below `level` from the actions their parents are
    /// currently on.
    fn expand_from(&mut self, builder: &ModelBuilder, level: usize) {
        for k in (1..=level).rev() {
            let parent = &self.routes[k];
            let Some(id) = parent.current() else {
                return;
            };
            let terminal = parent.goal_terminal && parent.is_last();

            let mut sequences = Vec::new();
            let lhs = builder.lhs_sequence(id);
            let outcome = terminal.then(|| builder.outcome_sequence(id)).flatten();
            for seq_id in lhs.into_iter().chain(outcome) {
                if let Some(seq) = builder.sequences().get(seq_id) {
                    sequences.push(seq.clone());
                }
            }

            let child = Route::new(k - 1, sequences, terminal);
            if child.is_empty() {
                debug!(level = k, action = id.0, "action has no executable sequence");
                self.routes[k].needs_recalc = true;
                return;
            }
            self.routes[k - 1] = child;
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.routes.is_empty() {
            return f.write_str("no plan");
        }
        for (i, route) in self.routes.iter().rev().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{route}")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
