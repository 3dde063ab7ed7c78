//! `strider-cli` – Strider Command Line Interface
//!
//! The `strider` binary runs one decision engine.  It:
//!
//! 1. Checks for `~/.strider/config.toml`; runs a short **First-Run Wizard**
//!    when the file is absent.
//! 2. Builds an [`Agent`] and its transport: the built-in corridor
//!    [`SimTransport`], or stdin/stdout lines through a [`StreamTransport`]
//!    when `transport = "stdin"`.
//! 3. Drives them through a [`Supervisor`] until the tick limit, the goal
//!    target, the end of the transport, or **Ctrl-C**.
//! 4. Prints a summary of decisions and goals.
//!
//! In stdin mode stdout carries nothing but command codes; the banner,
//! wizard and summary are skipped and logs go to stderr.

mod config;

use colored::Colorize;
use futures_util::stream;
use std::sync::atomic::Ordering;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};

use strider_middleware::{EventBus, SimTransport, StreamTransport, Topic};
use strider_runtime::{Agent, RunSummary, StopReason, Supervisor, init_tracing};
use strider_types::{EventPayload, SensorSchema, StriderError};

use config::TransportKind;

fn main() {
    // Keep the guard alive so pending spans are flushed on exit.
    let _telemetry = init_tracing("strider");

    let loaded = config::load();
    let piped = match &loaded {
        Ok(Some(cfg)) => cfg.transport == TransportKind::Stdin,
        _ => config::from_env().transport == TransportKind::Stdin,
    };

    let cfg = if piped {
        match loaded {
            Ok(Some(cfg)) => cfg,
            Ok(None) => config::from_env(),
            Err(e) => {
                warn!(error = %e, "config unreadable, using defaults");
                config::from_env()
            }
        }
    } else {
        print_banner();
        match loaded {
            Ok(None) => run_first_run_wizard(),
            Ok(Some(cfg)) => {
                println!(
                    "  Config loaded from {}",
                    config::config_path().display().to_string().bold()
                );
                cfg
            }
            Err(e) => {
                println!("{}: {}", "Config error".red(), e);
                println!("  Using default configuration.");
                config::from_env()
            }
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start Tokio runtime".red(), e);
            std::process::exit(1);
        }
    };

    let code = match cfg.transport {
        TransportKind::Sim => runtime.block_on(run(cfg)),
        TransportKind::Stdin => runtime.block_on(run_piped(cfg)),
    };
    std::process::exit(code);
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: config::Config) -> i32 {
    let sim = SimTransport::new(cfg.corridor_length);
    let num_sensors = sim.num_sensors();

    let mut agent_cfg = cfg.agent;
    agent_cfg.schema = SensorSchema::new(num_sensors);
    if agent_cfg.num_to_match > num_sensors {
        warn!(
            configured = agent_cfg.num_to_match,
            num_sensors, "num_to_match exceeds the simulator's sensor count; clamping"
        );
        agent_cfg.num_to_match = num_sensors;
    }

    let agent = match Agent::new(agent_cfg) {
        Ok(agent) => agent,
        Err(e) => {
            println!("{}: {}", "Invalid agent configuration".red(), e);
            return 2;
        }
    };

    println!();
    println!(
        "  Corridor of {} cells, {} sensors, policy {:?}, seed {}",
        cfg.corridor_length.to_string().bold(),
        num_sensors,
        agent.config().policy,
        agent.config().seed
    );
    match (cfg.max_ticks, cfg.max_goals) {
        (Some(ticks), Some(goals)) => println!(
            "  Running for up to {} ticks or {} goals.  Ctrl-C to stop early.\n",
            ticks, goals
        ),
        (Some(ticks), None) => println!("  Running for up to {} ticks.  Ctrl-C to stop early.\n", ticks),
        (None, Some(goals)) => println!("  Running until {} goals.  Ctrl-C to stop early.\n", goals),
        (None, None) => println!("  Running until Ctrl-C.\n"),
    }

    let bus = EventBus::default();
    let goal_printer = spawn_goal_printer(&bus);
    let mut supervisor = Supervisor::new(agent, sim, bus);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = supervisor.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current tick …".yellow().bold());
        shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will stop the process abruptly");
    }

    let result = supervisor.run(cfg.max_ticks, cfg.max_goals).await;
    goal_printer.abort();

    match result {
        Ok(summary) => {
            print_summary(&summary, supervisor.transport());
            info!(agent = %supervisor.agent().id(), "run finished");
            0
        }
        Err(e) => {
            println!("{}: {}", "Run aborted".red().bold(), e);
            1
        }
    }
}

/// Serve a robot over stdin/stdout until stdin closes or a limit is hit.
async fn run_piped(cfg: config::Config) -> i32 {
    let agent = match Agent::new(cfg.agent) {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("{}: {}", "Invalid agent configuration".red(), e);
            return 2;
        }
    };

    let input = BufReader::new(tokio::io::stdin());
    let (result, _) =
        serve_lines(agent, input, tokio::io::stdout(), cfg.max_ticks, cfg.max_goals).await;

    match result {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                goals = summary.goals,
                malformed = summary.malformed,
                stopped_by = ?summary.stopped_by,
                "piped run finished"
            );
            0
        }
        Err(e) => {
            eprintln!("{}: {}", "Run aborted".red().bold(), e);
            1
        }
    }
}

/// Drive `agent` with one sensor string per `input` line, writing one
/// command code per line to `output`.  Malformed lines get no reply.
///
/// Returns the run result and the writer.
async fn serve_lines<R, W>(
    agent: Agent,
    input: R,
    mut output: W,
    max_ticks: Option<usize>,
    max_goals: Option<usize>,
) -> (Result<RunSummary, StriderError>, W)
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin,
{
    let sensors = Box::pin(stream::unfold(input.lines(), |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to read sensor line");
                None
            }
        }
    }));
    let (tx, mut rx) = mpsc::unbounded_channel::<i32>();
    let mut supervisor = Supervisor::new(agent, StreamTransport::new(sensors, tx), EventBus::default());

    let drive = async move {
        let result = supervisor.run(max_ticks, max_goals).await;
        // Dropping the transport closes the command channel.
        drop(supervisor);
        result
    };
    let write = async {
        while let Some(code) = rx.recv().await {
            if let Err(e) = output.write_all(format!("{code}\n").as_bytes()).await {
                warn!(error = %e, "failed to write command code");
                break;
            }
            output.flush().await.ok();
        }
    };
    let (result, ()) = tokio::join!(drive, write);
    (result, output)
}

/// Print a line for every goal event until aborted.
fn spawn_goal_printer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut goals = bus.subscribe_to(Topic::Goals);
    tokio::spawn(async move {
        loop {
            match goals.recv().await {
                Ok(event) => {
                    if let EventPayload::GoalReached { now, .. } = event.payload {
                        println!("  {} beacon reached at tick {}", "★".yellow().bold(), now);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "goal printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Strider First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Strider.\n");

    let mut cfg = config::Config::default();

    let len_str = prompt_line(
        &format!("  Corridor length in cells [{}]: ", cfg.corridor_length),
        &cfg.corridor_length.to_string(),
    );
    if let Ok(len) = len_str.trim().parse::<usize>() {
        cfg.corridor_length = len;
    }

    println!("  Which selection policy would you like to use?");
    println!("    1) plan_first   (default, follow plans while they hold)");
    println!("    2) drift_aware  (re-score every tick)");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.agent.policy = match choice.trim() {
        "2" => strider_runtime::SelectionPolicy::DriftAware,
        other => config::parse_policy(other).unwrap_or_default(),
    };

    let seed_str = prompt_line(
        &format!("  Random seed [{}]: ", cfg.agent.seed),
        &cfg.agent.seed.to_string(),
    );
    if let Ok(seed) = seed_str.trim().parse::<u64>() {
        cfg.agent.seed = seed;
    }

    config::apply_env_overrides(&mut cfg);

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____ __       _     __         "#.bold().cyan());
    println!("{}", r#"  / ___// /______(_)___/ /__  _____"#.bold().cyan());
    println!("{}", r#"  \__ \/ __/ ___/ / __  / _ \/ ___/"#.bold().cyan());
    println!("{}", r#" ___/ / /_/ /  / / /_/ /  __/ /    "#.bold().cyan());
    println!("{}", r#"/____/\__/_/  /_/\__,_/\___/_/     "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Strider".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Hierarchical model-based robot planner");
    println!();
}

fn print_summary(summary: &RunSummary, sim: &SimTransport) {
    let stopped = match summary.stopped_by {
        StopReason::TickLimit => "tick limit".normal(),
        StopReason::GoalLimit => "goal target".green(),
        StopReason::Shutdown => "Ctrl-C".yellow(),
        StopReason::TransportClosed => "transport closed".yellow(),
    };
    println!();
    println!("  {}", "Run summary".bold().underline());
    println!("    ticks      {}", summary.ticks);
    println!(
        "    decisions  {} ({} scripted)",
        summary.decisions,
        summary.scripted.to_string().cyan()
    );
    if summary.malformed > 0 {
        println!("    malformed  {}", summary.malformed.to_string().red());
    }
    println!("    goals      {}", summary.goals.to_string().green().bold());
    println!("    final cell {} ({} beacon visits)", sim.position(), sim.goals_reached());
    println!("    stopped by {}", stopped);
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
