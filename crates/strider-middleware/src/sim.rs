//! Headless corridor world for running the full stack without a robot.
//!
//! The robot lives in a one-dimensional corridor of `length` cells with an
//! IR beacon at the east end.  Each sensor string carries:
//!
//! | field | meaning |
//! |---|---|
//! | 0 | beacon reached (the reward field) |
//! | 1 | the last forward move bumped into a wall |
//! | 2 | facing east |
//! | 3.. | position, binary, most significant bit first |
//!
//! `Forward` moves one cell along the heading, `Left` and `Right` turn the
//! robot around, every other command leaves it in place.  After the beacon
//! has been reported the next command returns the robot to its start cell.
//!
//! # Example
//!
//! ```rust
//! use strider_middleware::sim::SimTransport;
//!
//! let sim = SimTransport::new(4).starting_at(1);
//! assert_eq!(sim.num_sensors(), 5);
//! assert_eq!(sim.sensor_string(), "0 0 1 0 1");
//! ```

use async_trait::async_trait;
use strider_types::{Command, TransportError};
use tracing::debug;

use crate::transport::RobotTransport;

/// Simulated robot in a corridor.
#[derive(Debug, Clone)]
pub struct SimTransport {
    length: usize,
    start: usize,
    position: usize,
    facing_east: bool,
    bumped: bool,
    tick_limit: Option<usize>,
    ticks: usize,
    goals_reached: usize,
}

impl SimTransport {
    /// A corridor of `length` cells (at least two), starting at the west end
    /// facing east.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(2),
            start: 0,
            position: 0,
            facing_east: true,
            bumped: false,
            tick_limit: None,
            ticks: 0,
            goals_reached: 0,
        }
    }

    /// Start (and restart after each goal) at `cell`.
    pub fn starting_at(mut self, cell: usize) -> Self {
        self.start = cell.min(self.length - 2);
        self.position = self.start;
        self
    }

    /// Report [`TransportError::Closed`] after `ticks` sensor strings.
    pub fn with_tick_limit(mut self, ticks: usize) -> Self {
        self.tick_limit = Some(ticks);
        self
    }

    fn position_bits(&self) -> usize {
        (usize::BITS - (self.length - 1).leading_zeros()) as usize
    }

    /// Fields per sensor string.
    pub fn num_sensors(&self) -> usize {
        3 + self.position_bits()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn goals_reached(&self) -> usize {
        self.goals_reached
    }

    fn at_beacon(&self) -> bool {
        self.position == self.length - 1
    }

    /// Current sensor values.
    pub fn sensors(&self) -> Vec<i64> {
        let mut values = vec![
            i64::from(self.at_beacon()),
            i64::from(self.bumped),
            i64::from(self.facing_east),
        ];
        let bits = self.position_bits();
        for bit in (0..bits).rev() {
            values.push(((self.position >> bit) & 1) as i64);
        }
        values
    }

    /// Current sensors as the space-separated line a robot would send.
    pub fn sensor_string(&self) -> String {
        self.sensors()
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Apply one command to the world.
    pub fn apply(&mut self, cmd: Command) {
        if self.at_beacon() {
            self.goals_reached += 1;
            self.position = self.start;
            self.facing_east = true;
            self.bumped = false;
            debug!(goals = self.goals_reached, "beacon reached, robot reset");
            return;
        }
        self.bumped = false;
        match cmd {
            Command::Forward => {
                let next = if self.facing_east {
                    self.position.checked_add(1).filter(|p| *p < self.length)
                } else {
                    self.position.checked_sub(1)
                };
                match next {
                    Some(p) => self.position = p,
                    None => self.bumped = true,
                }
            }
            Command::Left | Command::Right => self.facing_east = !self.facing_east,
            _ => {}
        }
    }
}

#[async_trait]
impl RobotTransport for SimTransport {
    async fn receive_sensor_string(&mut self) -> Result<String, TransportError> {
        if self.tick_limit.is_some_and(|limit| self.ticks >= limit) {
            return Err(TransportError::Closed);
        }
        self.ticks += 1;
        Ok(self.sensor_string())
    }

    async fn send_command(&mut self, code: i32) -> Result<(), TransportError> {
        let cmd = Command::from_code(code).ok_or(TransportError::Rejected(code))?;
        self.apply(cmd);
        Ok(())
    }
}
