//! `strider-middleware` – Everything between the decision engine and a robot.
//!
//! # Modules
//!
//! - [`transport`] – the [`RobotTransport`] seam plus a stream/channel
//!   backed implementation.
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`sim`] – [`SimTransport`], a headless corridor world.

pub mod bus;
pub mod sim;
pub mod transport;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use sim::SimTransport;
pub use transport::{RobotTransport, StreamTransport};
