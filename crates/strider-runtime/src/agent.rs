//! [`Agent`] – one decision engine instance.
//!
//! Each call to [`Agent::tick`] runs one full cycle:
//!
//! 1. **Parse** – the raw sensor string is checked against the
//!    [`SensorSchema`].  A malformed string is rejected with
//!    [`StriderError::MalformedInput`] and nothing is stored.
//! 2. **Choose** – the configured [`SelectionPolicy`] either takes the next
//!    step of the active plan or falls back to reactive scoring.
//! 3. **Append** – the sensors and the chosen command become a new episode.
//! 4. **Learn** – the builder induces actions from the new transition.
//!
//! All state is owned by the agent value; several agents in one process are
//! fully independent.
//!
//! # Example
//!
//! ```rust
//! use strider_runtime::agent::{Agent, AgentConfig};
//! use strider_types::{Command, SensorSchema, int_sensors};
//!
//! let mut agent = Agent::new(AgentConfig {
//!     schema: SensorSchema::new(3),
//!     num_to_match: 3,
//!     ..AgentConfig::default()
//! })
//! .unwrap();
//!
//! for _ in 0..3 {
//!     agent.observe(int_sensors(&[0, 0, 0]), Command::Forward).unwrap();
//!     agent.observe(int_sensors(&[1, 0, 0]), Command::Forward).unwrap();
//! }
//! assert_eq!(agent.tick("0 0 0").unwrap(), Command::Forward.code());
//! ```

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use strider_memory::{BuilderConfig, EpisodeJournal, EpisodeStore, ModelBuilder};
use strider_types::{Command, SensorSchema, SensorValue, StriderError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::plan::{Plan, plan_route};
use crate::selector::{ScoreParams, find_top_match, generate_score_table, random_command};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Exploration chance never decays below this many percent.
const RANDOM_CHANCE_FLOOR: u32 = 10;

/// Percentage points removed from the exploration chance per goal reached.
const RANDOM_CHANCE_STEP: u32 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How a scripted plan and reactive scoring are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Follow the plan while its steps stay valid.
    #[default]
    PlanFirst,
    /// Re-score every tick and abandon the plan when a reactive choice beats
    /// the scripted command by at least `drift_margin`.
    DriftAware,
}

/// Configuration bundle for [`Agent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub schema: SensorSchema,
    /// Minimum number of equal sensor fields for two episodes to match.
    pub num_to_match: usize,
    /// Episodes in a level-0 action's LHS.
    pub lhs_len: usize,
    /// Levels in the action hierarchy, level 0 included.
    pub max_level_depth: usize,
    /// Longest chain of actions a route may contain.
    pub max_route_len: usize,
    /// Per-step discount applied to downstream reward when scoring.
    pub discount: f64,
    pub policy: SelectionPolicy,
    pub drift_margin: f64,
    /// Seed for tie-breaking and exploration.
    pub seed: u64,
    /// Initial exploration chance in percent.
    pub initial_random_chance: u32,
    /// Optional path to a SQLite episode journal.
    /// If `None`, episodes are kept in memory only.
    pub journal_path: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            schema: SensorSchema::default(),
            num_to_match: 8,
            lhs_len: 1,
            max_level_depth: 4,
            max_route_len: 15,
            discount: 1.0,
            policy: SelectionPolicy::PlanFirst,
            drift_margin: 0.25,
            seed: 0,
            initial_random_chance: 0,
            journal_path: None,
        }
    }
}

impl AgentConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), StriderError> {
        let n = self.schema.num_sensors;
        let invalid = |msg: String| Err(StriderError::InvalidArgument(msg));
        if n == 0 {
            return invalid("num_sensors must be at least 1".into());
        }
        if self.num_to_match == 0 || self.num_to_match > n {
            return invalid(format!("num_to_match must be in 1..={n}, got {}", self.num_to_match));
        }
        if self.schema.reward_field >= n {
            return invalid(format!("reward_field {} out of range", self.schema.reward_field));
        }
        if self.schema.score_field.is_some_and(|f| f >= n) {
            return invalid("score_field out of range".into());
        }
        if self.lhs_len == 0 || self.max_level_depth == 0 || self.max_route_len == 0 {
            return invalid("lhs_len, max_level_depth and max_route_len must be positive".into());
        }
        if !(self.discount > 0.0 && self.discount <= 1.0) {
            return invalid(format!("discount must be in (0, 1], got {}", self.discount));
        }
        if !(self.drift_margin >= 0.0) {
            return invalid(format!("drift_margin must be non-negative, got {}", self.drift_margin));
        }
        if self.initial_random_chance > 100 {
            return invalid("initial_random_chance is a percentage".into());
        }
        Ok(())
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            num_to_match: self.num_to_match,
            lhs_len: self.lhs_len,
            max_level_depth: self.max_level_depth,
        }
    }

    fn score_params(&self) -> ScoreParams {
        ScoreParams {
            discount: self.discount,
            max_route_len: self.max_route_len,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick results
// ─────────────────────────────────────────────────────────────────────────────

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionSource {
    /// Next step of the active plan.
    Plan,
    /// Best reactive score.
    Reactive,
    /// Random exploration.
    Explore,
    /// Nothing matched; a random command was issued.
    Fallback,
}

/// Outcome of one [`Agent::tick_report`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Ordinal of the episode stored for this tick.
    pub now: usize,
    pub cmd: Command,
    pub source: DecisionSource,
    /// The sensors of this tick satisfied the reward predicate.
    pub goal: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Episodic memory, learned models, the current plan and the seeded
/// generator of one robot.
pub struct Agent {
    id: Uuid,
    config: AgentConfig,
    store: EpisodeStore,
    builder: ModelBuilder,
    plan: Plan,
    rng: SmallRng,
    random_chance: u32,
    journal: Option<EpisodeJournal>,
}

impl Agent {
    /// Construct a new [`Agent`] from the supplied configuration.
    ///
    /// # Errors
    ///
    /// [`StriderError::InvalidArgument`] for an unusable configuration and
    /// [`StriderError::Journal`] when the configured journal cannot be opened.
    pub fn new(config: AgentConfig) -> Result<Self, StriderError> {
        config.validate()?;
        let journal = match &config.journal_path {
            Some(path) => {
                info!("opening episode journal at: {}", path);
                let journal = EpisodeJournal::open(path).map_err(|e| {
                    StriderError::Journal(format!("failed to open journal at {path}: {e}"))
                })?;
                Some(journal)
            }
            None => None,
        };
        Ok(Self {
            id: Uuid::new_v4(),
            store: EpisodeStore::new(config.schema.clone()),
            builder: ModelBuilder::new(config.builder_config()),
            plan: Plan::default(),
            rng: SmallRng::seed_from_u64(config.seed),
            random_chance: config.initial_random_chance,
            journal,
            config,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &EpisodeStore {
        &self.store
    }

    pub fn builder(&self) -> &ModelBuilder {
        &self.builder
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn journal(&self) -> Option<&EpisodeJournal> {
        self.journal.as_ref()
    }

    /// Current exploration chance in percent.
    pub fn random_chance(&self) -> u32 {
        self.random_chance
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Process one raw sensor string and return the command code to send.
    pub fn tick(&mut self, raw: &str) -> Result<i32, StriderError> {
        self.tick_report(raw).map(|report| report.cmd.code())
    }

    /// [`tick`][Self::tick], returning everything known about the decision.
    pub fn tick_report(&mut self, raw: &str) -> Result<TickReport, StriderError> {
        let sensors = self.config.schema.parse(raw).inspect_err(|e| {
            warn!(raw, error = %e, "sensor string rejected");
        })?;

        let (cmd, source) = self.choose_command(&sensors);
        let now = self.append(sensors, cmd)?;
        let goal = self
            .store
            .get(now)
            .is_some_and(|ep| self.store.episode_contains_reward(ep));
        if goal {
            self.on_goal(now);
        }

        debug!(now, cmd = %cmd, source = ?source, "tick");
        Ok(TickReport {
            now,
            cmd,
            source,
            goal,
        })
    }

    /// Store an episode and learn from it without choosing a command.
    ///
    /// Used to seed an agent with recorded experience.
    pub fn observe(&mut self, sensors: Vec<SensorValue>, cmd: Command) -> Result<usize, StriderError> {
        self.append(sensors, cmd)
    }

    /// Forget every action, sequence and plan.  Episodes are kept.
    pub fn reset_models(&mut self) {
        self.builder.reset();
        self.plan.clear();
        info!(agent = %self.id, "learned models reset");
    }

    fn append(&mut self, sensors: Vec<SensorValue>, cmd: Command) -> Result<usize, StriderError> {
        let now = self.store.add_episode(sensors, cmd)?;
        if let (Some(journal), Some(episode)) = (&self.journal, self.store.get(now)) {
            if let Err(e) = journal.append(&self.id.to_string(), episode) {
                warn!(now, error = %e, "failed to journal episode");
            }
        }
        let touched = self.builder.update(&self.store);
        debug!(now, actions = touched.len(), "models updated");
        Ok(now)
    }

    fn on_goal(&mut self, now: usize) {
        if self.random_chance > RANDOM_CHANCE_FLOOR {
            self.random_chance = self
                .random_chance
                .saturating_sub(RANDOM_CHANCE_STEP)
                .max(RANDOM_CHANCE_FLOOR);
        }
        info!(now, random_chance = self.random_chance, "goal reached");
    }

    // -------------------------------------------------------------------------
    // Command selection
    // -------------------------------------------------------------------------

    /// Pick the command for `current` with the configured policy.
    pub fn choose_command(&mut self, current: &[SensorValue]) -> (Command, DecisionSource) {
        match self.config.policy {
            SelectionPolicy::PlanFirst => self.set_command(current),
            SelectionPolicy::DriftAware => self.set_command2(current),
        }
    }

    /// Plan-first selection: a valid scripted step always wins.
    pub fn set_command(&mut self, current: &[SensorValue]) -> (Command, DecisionSource) {
        self.ensure_plan(current);
        match self.plan.take_next_step(&self.builder, &self.store, current) {
            Some(cmd) => (cmd, DecisionSource::Plan),
            None => self.reactive(current),
        }
    }

    /// Drift-aware selection: the scripted step is compared with the best
    /// reactive choice and loses when it trails by at least `drift_margin`.
    pub fn set_command2(&mut self, current: &[SensorValue]) -> (Command, DecisionSource) {
        self.ensure_plan(current);
        let Some(scripted) = self.plan.peek_command(&self.builder) else {
            return self.reactive(current);
        };

        let table = generate_score_table(
            &self.builder,
            &self.store,
            current,
            self.config.score_params(),
        );
        if let Some((best, top)) = find_top_match(&table, &mut self.rng) {
            let scripted_score = table.get(scripted).map_or(0.0, |c| c.score);
            if best != scripted && top.score - scripted_score >= self.config.drift_margin {
                debug!(
                    scripted = %scripted,
                    reactive = %best,
                    margin = top.score - scripted_score,
                    "plan abandoned for reactive choice"
                );
                self.plan.clear();
                return (best, DecisionSource::Reactive);
            }
        }

        match self.plan.take_next_step(&self.builder, &self.store, current) {
            Some(cmd) => (cmd, DecisionSource::Plan),
            None => self.reactive(current),
        }
    }

    /// Replan unless the current plan's next step is still valid.
    fn ensure_plan(&mut self, current: &[SensorValue]) {
        if self.plan.is_active()
            && self
                .plan
                .next_step_is_valid(&self.builder, &self.store, current)
        {
            return;
        }
        match plan_route(
            &mut self.builder,
            &self.store,
            current,
            self.config.max_route_len,
        ) {
            Ok(plan) => self.plan = plan,
            Err(e) => {
                debug!(error = %e, "no plan, falling back to reactive selection");
                self.plan.clear();
            }
        }
    }

    fn reactive(&mut self, current: &[SensorValue]) -> (Command, DecisionSource) {
        if self.random_chance > 0 && self.rng.gen_range(0..100) < self.random_chance {
            return (random_command(&mut self.rng), DecisionSource::Explore);
        }
        let table = generate_score_table(
            &self.builder,
            &self.store,
            current,
            self.config.score_params(),
        );
        match find_top_match(&table, &mut self.rng) {
            Some((cmd, _)) => (cmd, DecisionSource::Reactive),
            None => (random_command(&mut self.rng), DecisionSource::Fallback),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
