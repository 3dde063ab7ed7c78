//! Configuration Vault – reads/writes `~/.strider/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use strider_runtime::{AgentConfig, SelectionPolicy};

/// Where sensor strings come from and command codes go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The built-in corridor simulator.
    #[default]
    Sim,
    /// One sensor string per stdin line, one command code per stdout line.
    Stdin,
}

impl TransportKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "sim" => Some(Self::Sim),
            "stdin" => Some(Self::Stdin),
            _ => None,
        }
    }
}

/// Persisted user configuration stored in `~/.strider/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportKind,

    /// Cells in the simulated corridor, beacon cell included.
    #[serde(default = "default_corridor_length")]
    pub corridor_length: usize,

    /// Stop after this many ticks.  Runs until Ctrl-C when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<usize>,

    /// Stop once the beacon has been found this many times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_goals: Option<usize>,

    /// Decision engine settings.  With the simulator the sensor schema is
    /// derived from the corridor and any `schema` table here is ignored.
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_corridor_length() -> usize {
    6
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            corridor_length: default_corridor_length(),
            max_ticks: Some(2_000),
            max_goals: Some(50),
            agent: AgentConfig {
                initial_random_chance: 30,
                ..AgentConfig::default()
            },
        }
    }
}

/// Return the path to `~/.strider/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".strider").join("config.toml")
}

/// Load the config from disk and apply `STRIDER_*` overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config from a specific path, file contents only.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Defaults with `STRIDER_*` overrides applied, for when no file is usable.
pub fn from_env() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

/// Parse a policy name as written in the config file.
pub fn parse_policy(name: &str) -> Option<SelectionPolicy> {
    match name.trim() {
        "plan_first" => Some(SelectionPolicy::PlanFirst),
        "drift_aware" => Some(SelectionPolicy::DriftAware),
        _ => None,
    }
}

/// Apply `STRIDER_*` environment variable overrides to `cfg`.
///
/// Values that fail to parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `STRIDER_TRANSPORT` | `transport` (`sim` / `stdin`) |
/// | `STRIDER_CORRIDOR_LENGTH` | `corridor_length` |
/// | `STRIDER_MAX_TICKS` | `max_ticks` |
/// | `STRIDER_MAX_GOALS` | `max_goals` |
/// | `STRIDER_SEED` | `agent.seed` |
/// | `STRIDER_POLICY` | `agent.policy` (`plan_first` / `drift_aware`) |
/// | `STRIDER_RANDOM_CHANCE` | `agent.initial_random_chance` |
/// | `STRIDER_JOURNAL` | `agent.journal_path` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STRIDER_TRANSPORT")
        && let Some(kind) = TransportKind::parse(&v) {
            cfg.transport = kind;
        }
    if let Ok(v) = std::env::var("STRIDER_CORRIDOR_LENGTH")
        && let Ok(len) = v.parse::<usize>() {
            cfg.corridor_length = len;
        }
    if let Ok(v) = std::env::var("STRIDER_MAX_TICKS")
        && let Ok(ticks) = v.parse::<usize>() {
            cfg.max_ticks = Some(ticks);
        }
    if let Ok(v) = std::env::var("STRIDER_MAX_GOALS")
        && let Ok(goals) = v.parse::<usize>() {
            cfg.max_goals = Some(goals);
        }
    if let Ok(v) = std::env::var("STRIDER_SEED")
        && let Ok(seed) = v.parse::<u64>() {
            cfg.agent.seed = seed;
        }
    if let Ok(v) = std::env::var("STRIDER_POLICY")
        && let Some(policy) = parse_policy(&v) {
            cfg.agent.policy = policy;
        }
    if let Ok(v) = std::env::var("STRIDER_RANDOM_CHANCE")
        && let Ok(chance) = v.parse::<u32>() {
            cfg.agent.initial_random_chance = chance;
        }
    if let Ok(v) = std::env::var("STRIDER_JOURNAL") {
        cfg.agent.journal_path = (!v.is_empty()).then_some(v);
    }
}

/// Save the config to disk, creating `~/.strider/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.transport, TransportKind::Sim);
        assert_eq!(loaded.corridor_length, 6);
        assert_eq!(loaded.max_ticks, Some(2_000));
        assert_eq!(loaded.max_goals, Some(50));
        assert_eq!(loaded.agent.num_to_match, cfg.agent.num_to_match);
        assert_eq!(loaded.agent.policy, SelectionPolicy::PlanFirst);
        assert_eq!(loaded.agent.journal_path, None);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "corridor_length = 9\n\n[agent]\npolicy = \"drift_aware\"\nseed = 42\n")
            .expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.corridor_length, 9);
        assert_eq!(loaded.max_ticks, None);
        assert_eq!(loaded.max_goals, None);
        assert_eq!(loaded.agent.policy, SelectionPolicy::DriftAware);
        assert_eq!(loaded.agent.seed, 42);
        assert_eq!(loaded.agent.max_route_len, AgentConfig::default().max_route_len);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "corridor_length = \"long\"").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_strider_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".strider"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn policy_names() {
        assert_eq!(parse_policy("plan_first"), Some(SelectionPolicy::PlanFirst));
        assert_eq!(parse_policy(" drift_aware\n"), Some(SelectionPolicy::DriftAware));
        assert_eq!(parse_policy("greedy"), None);
    }

    // Each test below owns one variable, so they can run in parallel.

    #[test]
    fn apply_env_overrides_changes_seed() {
        // SAFETY: no other test reads or writes STRIDER_SEED.
        unsafe { std::env::set_var("STRIDER_SEED", "99") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.agent.seed, 99);
        unsafe { std::env::remove_var("STRIDER_SEED") };
    }

    #[test]
    fn apply_env_overrides_changes_policy() {
        // SAFETY: no other test reads or writes STRIDER_POLICY.
        unsafe { std::env::set_var("STRIDER_POLICY", "drift_aware") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.agent.policy, SelectionPolicy::DriftAware);
        unsafe { std::env::remove_var("STRIDER_POLICY") };
    }

    #[test]
    fn transport_names() {
        assert_eq!(TransportKind::parse("stdin"), Some(TransportKind::Stdin));
        assert_eq!(TransportKind::parse("sim\n"), Some(TransportKind::Sim));
        assert_eq!(TransportKind::parse("tcp"), None);

        let cfg: Config = toml::from_str("transport = \"stdin\"\n").expect("parse");
        assert_eq!(cfg.transport, TransportKind::Stdin);
        assert_eq!(cfg.agent, AgentConfig::default());
    }

    #[test]
    fn apply_env_overrides_changes_transport() {
        // SAFETY: no other test reads or writes STRIDER_TRANSPORT.
        unsafe { std::env::set_var("STRIDER_TRANSPORT", "stdin") };
        let cfg = from_env();
        assert_eq!(cfg.transport, TransportKind::Stdin);
        unsafe { std::env::remove_var("STRIDER_TRANSPORT") };
    }

    #[test]
    fn apply_env_overrides_changes_goal_target() {
        // SAFETY: no other test reads or writes STRIDER_MAX_GOALS.
        unsafe { std::env::set_var("STRIDER_MAX_GOALS", "7") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.max_goals, Some(7));
        unsafe { std::env::remove_var("STRIDER_MAX_GOALS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_ticks() {
        // SAFETY: no other test reads or writes STRIDER_MAX_TICKS.
        unsafe { std::env::set_var("STRIDER_MAX_TICKS", "forever") };
        let mut cfg = Config::default();
        let original = cfg.max_ticks;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.max_ticks, original);
        unsafe { std::env::remove_var("STRIDER_MAX_TICKS") };
    }

    #[test]
    fn apply_env_overrides_sets_journal() {
        // SAFETY: no other test reads or writes STRIDER_JOURNAL.
        unsafe { std::env::set_var("STRIDER_JOURNAL", "/tmp/strider.db") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.agent.journal_path.as_deref(), Some("/tmp/strider.db"));
        unsafe { std::env::remove_var("STRIDER_JOURNAL") };
    }
}
