//! `strider-types` – shared vocabulary of the Strider workspace.
//!
//! Episodes, sensor values, command codes, bus events and the error types
//! that cross crate boundaries.

pub mod command;
pub mod sensor;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use command::{Command, interpret_command, interpret_command_short};
pub use sensor::{SensorSchema, SensorValue, int_sensors, interpret_sensors_short};

/// One observed transition: what the robot sensed, what it was told to do
/// next, and when.
///
/// Episodes are immutable once created.  Higher-level structures refer to
/// them by their ordinal (`now`), which is also their index in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub sensors: Vec<SensorValue>,
    pub cmd: Command,
    /// Monotonically increasing ordinal assigned by the episode store.
    pub now: usize,
    pub observed_at: DateTime<Utc>,
}

impl Episode {
    pub fn new(sensors: Vec<SensorValue>, cmd: Command, now: usize) -> Self {
        Self {
            sensors,
            cmd,
            now,
            observed_at: Utc::now(),
        }
    }
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}",
            self.now,
            interpret_sensors_short(&self.sensors),
            self.cmd
        )
    }
}

/// Unified event wrapper for the supervisor's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "strider-runtime::supervisor"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A command was chosen for the tick with ordinal `now`.
    Decision {
        agent_id: Uuid,
        now: usize,
        code: i32,
        /// `true` when the command came from an active plan.
        scripted: bool,
    },
    /// The episode with ordinal `now` satisfied the reward predicate.
    GoalReached { agent_id: Uuid, now: usize },
    /// A sensor string was rejected and nothing was appended.
    MalformedInput { raw: String, reason: String },
    /// The transport failed to deliver or accept data.
    TransportFault { message: String },
}

/// Failures reported by a robot transport.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport I/O error: {0}")]
    Io(String),
    #[error("robot rejected command code {0}")]
    Rejected(i32),
}

/// Global error type of the decision engine.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StriderError {
    /// The sensor string does not match the schema.  Never recovered by
    /// guessing values.
    #[error("Malformed sensor input: {0}")]
    MalformedInput(String),

    #[error("No goal-containing action at any level")]
    NoGoalInLevel,

    #[error("No level has any actions yet")]
    LevelNotPopulated,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Route of {len} steps exceeds the bound of {bound}")]
    RouteTooLong { len: usize, bound: usize },

    #[error("No start state leads to a goal at level {level}")]
    NoRouteToGoal { level: usize },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Episode journal error: {0}")]
    Journal(String),

    #[error("Event bus error: {0}")]
    Channel(String),
}

impl StriderError {
    /// `true` for planning failures that the selector recovers from by
    /// falling back to reactive scoring.
    pub fn is_recoverable_planning(&self) -> bool {
        matches!(
            self,
            StriderError::NoGoalInLevel
                | StriderError::LevelNotPopulated
                | StriderError::RouteTooLong { .. }
                | StriderError::NoRouteToGoal { .. }
        )
    }
}
