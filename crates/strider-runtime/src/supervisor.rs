//! [`Supervisor`] – drives an [`Agent`] from a [`RobotTransport`].
//!
//! Each iteration waits for a sensor string, runs one [`Agent::tick`], sends
//! the resulting command back and publishes what happened on the
//! [`EventBus`].  Transport I/O is awaited between ticks only; the tick itself
//! is synchronous.
//!
//! Malformed sensor strings are logged, published on the faults lane and
//! skipped without sending anything.  The loop stops when the transport
//! reports [`TransportError::Closed`], the shutdown flag is raised, or the
//! tick or goal limit is reached.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use strider_middleware::{EventBus, RobotTransport};
use strider_types::{Event, EventPayload, StriderError, TransportError};
use tracing::{info, trace, warn};

use crate::agent::{Agent, DecisionSource};

const SOURCE: &str = "strider-runtime::supervisor";

/// Why [`Supervisor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TickLimit,
    /// The requested number of goals was found.
    GoalLimit,
    Shutdown,
    TransportClosed,
}

/// Counters collected over one [`Supervisor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Sensor strings received.
    pub ticks: usize,
    /// Commands sent.
    pub decisions: usize,
    /// Commands that came from a plan.
    pub scripted: usize,
    pub malformed: usize,
    pub goals: usize,
    pub stopped_by: StopReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            ticks: 0,
            decisions: 0,
            scripted: 0,
            malformed: 0,
            goals: 0,
            stopped_by: StopReason::TickLimit,
        }
    }
}

/// Owns one agent and the transport to its robot.
pub struct Supervisor<T> {
    agent: Agent,
    transport: T,
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
}

impl<T: RobotTransport> Supervisor<T> {
    pub fn new(agent: Agent, transport: T, bus: EventBus) -> Self {
        Self {
            agent,
            transport,
            bus,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`run`][Self::run] before the next tick once set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn into_parts(self) -> (Agent, T) {
        (self.agent, self.transport)
    }

    /// Pump sensor strings through the agent until stopped.
    ///
    /// `max_ticks` bounds the sensor strings received and `max_goals` the
    /// goals found; `None` leaves that side unbounded.
    ///
    /// # Errors
    ///
    /// Transport failures other than [`TransportError::Closed`] end the run
    /// with [`StriderError::Transport`] after a fault event is published.
    pub async fn run(
        &mut self,
        max_ticks: Option<usize>,
        max_goals: Option<usize>,
    ) -> Result<RunSummary, StriderError> {
        let mut summary = RunSummary::new();
        let agent_id = self.agent.id();
        info!(agent = %agent_id, ?max_ticks, ?max_goals, "supervisor started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                summary.stopped_by = StopReason::Shutdown;
                break;
            }
            if max_goals.is_some_and(|limit| summary.goals >= limit) {
                summary.stopped_by = StopReason::GoalLimit;
                break;
            }
            if max_ticks.is_some_and(|limit| summary.ticks >= limit) {
                summary.stopped_by = StopReason::TickLimit;
                break;
            }

            let raw = match self.transport.receive_sensor_string().await {
                Ok(raw) => raw,
                Err(TransportError::Closed) => {
                    summary.stopped_by = StopReason::TransportClosed;
                    break;
                }
                Err(e) => return Err(self.fault(e)),
            };
            summary.ticks += 1;

            let report = match self.agent.tick_report(&raw) {
                Ok(report) => report,
                Err(StriderError::MalformedInput(reason)) => {
                    summary.malformed += 1;
                    self.publish(EventPayload::MalformedInput { raw, reason });
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.transport.send_command(report.cmd.code()).await {
                Ok(()) => {}
                Err(TransportError::Closed) => {
                    summary.stopped_by = StopReason::TransportClosed;
                    break;
                }
                Err(e) => return Err(self.fault(e)),
            }

            let scripted = report.source == DecisionSource::Plan;
            summary.decisions += 1;
            summary.scripted += usize::from(scripted);
            self.publish(EventPayload::Decision {
                agent_id,
                now: report.now,
                code: report.cmd.code(),
                scripted,
            });
            if report.goal {
                summary.goals += 1;
                self.publish(EventPayload::GoalReached {
                    agent_id,
                    now: report.now,
                });
            }
        }

        info!(
            ticks = summary.ticks,
            goals = summary.goals,
            stopped_by = ?summary.stopped_by,
            "supervisor stopped"
        );
        Ok(summary)
    }

    fn publish(&self, payload: EventPayload) {
        if let Err(e) = self.bus.publish(Event::new(SOURCE, payload)) {
            trace!(error = %e, "event dropped");
        }
    }

    fn fault(&self, err: TransportError) -> StriderError {
        warn!(error = %err, "transport failure");
        self.publish(EventPayload::TransportFault {
            message: err.to_string(),
        });
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use strider_middleware::{SimTransport, Topic};
    use strider_types::{Command, SensorSchema, int_sensors};

    /// Replays canned sensor lines and records every command sent.
    struct ScriptedTransport {
        lines: VecDeque<Result<String, TransportError>>,
        sent: Vec<i32>,
    }

    impl ScriptedTransport {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| Ok(l.to_string())).collect(),
                sent: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl RobotTransport for ScriptedTransport {
        async fn receive_sensor_string(&mut self) -> Result<String, TransportError> {
            self.lines.pop_front().unwrap_or(Err(TransportError::Closed))
        }

        async fn send_command(&mut self, code: i32) -> Result<(), TransportError> {
            self.sent.push(code);
            Ok(())
        }
    }

    fn agent3() -> Agent {
        Agent::new(AgentConfig {
            schema: SensorSchema::new(3),
            num_to_match: 3,
            ..AgentConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn runs_until_transport_closes() -> Result<(), Box<dyn std::error::Error>> {
        let transport = ScriptedTransport::new(&["0 0 0", "1 0 0", "0 0 0"]);
        let mut supervisor = Supervisor::new(agent3(), transport, EventBus::default());
        let summary = supervisor.run(None, None).await?;

        assert_eq!(summary.stopped_by, StopReason::TransportClosed);
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.decisions, 3);
        assert_eq!(summary.goals, 1);
        assert_eq!(supervisor.transport().sent.len(), 3);
        assert_eq!(supervisor.agent().store().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut faults = bus.subscribe_to(Topic::Faults);
        let transport = ScriptedTransport::new(&["0 0 0", "0 0", "1 0 0"]);
        let mut supervisor = Supervisor::new(agent3(), transport, bus);
        let summary = supervisor.run(None, None).await?;

        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.decisions, 2);
        assert_eq!(supervisor.transport().sent.len(), 2);
        assert_eq!(supervisor.agent().store().len(), 2);

        let event = faults.recv().await?;
        assert!(matches!(event.payload, EventPayload::MalformedInput { ref raw, .. } if raw == "0 0"));
        Ok(())
    }

    #[tokio::test]
    async fn decisions_are_published() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut decisions = bus.subscribe_to(Topic::Decisions);
        let transport = ScriptedTransport::new(&["0 1 0"]);
        let mut supervisor = Supervisor::new(agent3(), transport, bus);
        supervisor.run(None, None).await?;

        let event = decisions.recv().await?;
        match event.payload {
            EventPayload::Decision { agent_id, now, code, .. } => {
                assert_eq!(agent_id, supervisor.agent().id());
                assert_eq!(now, 0);
                assert_eq!(supervisor.transport().sent, vec![code]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn transport_errors_end_the_run() {
        let mut transport = ScriptedTransport::new(&["0 0 0"]);
        transport.lines.push_back(Err(TransportError::Io("reset by peer".into())));
        let mut supervisor = Supervisor::new(agent3(), transport, EventBus::default());
        let err = supervisor.run(None, None).await.unwrap_err();
        assert!(matches!(err, StriderError::Transport(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn shutdown_flag_stops_before_the_next_tick() -> Result<(), Box<dyn std::error::Error>> {
        let transport = ScriptedTransport::new(&["0 0 0", "0 0 0"]);
        let mut supervisor = Supervisor::new(agent3(), transport, EventBus::default());
        supervisor.shutdown_handle().store(true, Ordering::SeqCst);
        let summary = supervisor.run(None, None).await?;
        assert_eq!(summary.stopped_by, StopReason::Shutdown);
        assert_eq!(summary.ticks, 0);
        Ok(())
    }

    #[tokio::test]
    async fn goal_limit_ends_the_run() -> Result<(), Box<dyn std::error::Error>> {
        let transport = ScriptedTransport::new(&["0 0 0", "1 0 0", "0 0 0", "1 0 0", "0 0 0"]);
        let mut supervisor = Supervisor::new(agent3(), transport, EventBus::default());
        let summary = supervisor.run(Some(100), Some(1)).await?;

        assert_eq!(summary.stopped_by, StopReason::GoalLimit);
        assert_eq!(summary.goals, 1);
        assert_eq!(summary.ticks, 2);
        assert_eq!(supervisor.transport().lines.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn tick_limit_wins_when_goals_are_scarce() -> Result<(), Box<dyn std::error::Error>> {
        let transport = ScriptedTransport::new(&["0 0 0", "0 1 0", "0 0 1"]);
        let mut supervisor = Supervisor::new(agent3(), transport, EventBus::default());
        let summary = supervisor.run(Some(2), Some(1)).await?;
        assert_eq!(summary.stopped_by, StopReason::TickLimit);
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.goals, 0);
        Ok(())
    }

    fn sim_agent(sim: &SimTransport, initial_random_chance: u32) -> Result<Agent, StriderError> {
        let n = sim.num_sensors();
        Agent::new(AgentConfig {
            schema: SensorSchema::new(n),
            num_to_match: n,
            seed: 11,
            initial_random_chance,
            ..AgentConfig::default()
        })
    }

    #[tokio::test]
    async fn follows_a_demonstrated_route_to_the_beacon() -> Result<(), Box<dyn std::error::Error>> {
        let sim = SimTransport::new(4);
        let mut agent = sim_agent(&sim, 0)?;

        // One recorded walk: three steps east, then the reset after the beacon.
        let mut demo = sim.clone();
        for _ in 0..2 {
            for _ in 0..4 {
                agent.observe(int_sensors(&demo.sensors()), Command::Forward)?;
                demo.apply(Command::Forward);
            }
        }
        assert_eq!(demo.position(), 0);

        let mut supervisor = Supervisor::new(agent, sim, EventBus::default());
        let summary = supervisor.run(Some(2000), None).await?;

        assert_eq!(summary.stopped_by, StopReason::TickLimit);
        assert!(summary.scripted > 0, "no scripted decisions: {summary:?}");
        // Three moves and a reset per goal is the best possible (500); a
        // random walk finds the beacon far less often.
        assert!(summary.goals >= 300, "too few goals: {summary:?}");
        Ok(())
    }

    #[tokio::test]
    async fn explores_its_way_to_the_beacon_in_the_simulator() -> Result<(), Box<dyn std::error::Error>>
    {
        let sim = SimTransport::new(4);
        let agent = sim_agent(&sim, 100)?;
        let mut supervisor = Supervisor::new(agent, sim, EventBus::default());
        let summary = supervisor.run(Some(1000), None).await?;

        assert_eq!(summary.stopped_by, StopReason::TickLimit);
        assert_eq!(summary.ticks, 1000);
        assert!(summary.goals >= 1, "never reached the beacon: {summary:?}");
        assert!(summary.scripted > 0, "never followed a plan: {summary:?}");
        assert_eq!(supervisor.transport().goals_reached(), summary.goals);
        Ok(())
    }
}
