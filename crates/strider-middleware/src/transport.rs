//! The robot transport seam.
//!
//! The decision engine never opens sockets.  It consumes sensor strings and
//! hands back command codes through a [`RobotTransport`]; whoever owns the
//! connection (a TCP connector, a serial link, the simulator) implements it.
//!
//! - [`RobotTransport`] – the trait every transport must implement.
//! - [`StreamTransport`] – adapts any `Stream` of sensor lines plus an
//!   `mpsc` command sink, which is how byte-level connectors usually plug in.
//! - [`SimTransport`][crate::sim::SimTransport] – a headless corridor world.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use strider_types::TransportError;
use tokio::sync::mpsc;
use tracing::trace;

/// Two-way link to one robot.
///
/// # Contract
///
/// * `receive_sensor_string` – waits for the next raw sensor line.  Returns
///   [`TransportError::Closed`] once no further data will ever arrive.
/// * `send_command` – transmits one command code.  A robot that refuses a
///   code reports [`TransportError::Rejected`].
#[async_trait]
pub trait RobotTransport: Send {
    async fn receive_sensor_string(&mut self) -> Result<String, TransportError>;

    async fn send_command(&mut self, code: i32) -> Result<(), TransportError>;
}

/// Transport over a stream of sensor lines and a channel of command codes.
pub struct StreamTransport<S> {
    sensors: S,
    commands: mpsc::UnboundedSender<i32>,
}

impl<S> StreamTransport<S>
where
    S: Stream<Item = String> + Unpin + Send,
{
    pub fn new(sensors: S, commands: mpsc::UnboundedSender<i32>) -> Self {
        Self { sensors, commands }
    }
}

#[async_trait]
impl<S> RobotTransport for StreamTransport<S>
where
    S: Stream<Item = String> + Unpin + Send,
{
    async fn receive_sensor_string(&mut self) -> Result<String, TransportError> {
        let line = self.sensors.next().await.ok_or(TransportError::Closed)?;
        trace!(%line, "sensor line received");
        Ok(line)
    }

    async fn send_command(&mut self, code: i32) -> Result<(), TransportError> {
        self.commands
            .send(code)
            .map_err(|_| TransportError::Closed)
    }
}
