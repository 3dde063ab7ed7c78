//! `strider-runtime` – The decision loop.
//!
//! # Modules
//!
//! - [`agent`] – [`Agent`][agent::Agent]: one decision engine instance.
//!   [`Agent::tick`][agent::Agent::tick] turns a raw sensor string into a
//!   command code, learning from every transition it sees.
//! - [`plan`] – [`Plan`][plan::Plan] and [`plan_route`][plan::plan_route]:
//!   multi-level routes toward known goals and their execution cursor.
//! - [`selector`] – reactive scoring used whenever no scripted step applies.
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: pumps a
//!   [`RobotTransport`][strider_middleware::RobotTransport] through an agent
//!   and publishes decisions on the event bus.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod agent;
pub mod plan;
pub mod selector;
pub mod supervisor;
pub mod telemetry;

pub use agent::{Agent, AgentConfig, DecisionSource, SelectionPolicy, TickReport};
pub use plan::{Plan, Route, RouteState, plan_route};
pub use selector::{ScoreTable, find_top_match, generate_score_table};
pub use supervisor::{RunSummary, StopReason, Supervisor};
pub use telemetry::{TracerProviderGuard, init_tracing};
