//! `strider-memory` – What the agent remembers and what it learns from it.
//!
//! # Modules
//!
//! - [`episodic`] – [`EpisodeStore`][episodic::EpisodeStore]: the append-only
//!   episode log and the threshold comparator used by every matching step.
//! - [`journal`] – [`EpisodeJournal`][journal::EpisodeJournal]: an optional
//!   SQLite archive of observed episodes for offline inspection.
//! - [`action`] – [`ActionTable`][action::ActionTable]: induced actions and
//!   their indeterminate cousin groups.
//! - [`sequence`] – [`SequenceTable`][sequence::SequenceTable]: deduplicated
//!   sequences of actions.
//! - [`builder`] – [`ModelBuilder`][builder::ModelBuilder]: induces the action
//!   hierarchy from the episode stream.

pub mod action;
pub mod builder;
pub mod episodic;
pub mod journal;
pub mod sequence;

pub use action::{Action, ActionId, ActionTable, Cousins, Outcome};
pub use builder::{BuilderConfig, ModelBuilder};
pub use episodic::{EpisodeStore, compare_episodes, compare_sensors};
pub use journal::{EpisodeJournal, JournalError};
pub use sequence::{Sequence, SequenceId, SequenceTable};
