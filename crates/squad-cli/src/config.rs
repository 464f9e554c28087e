//! Configuration file management for squad.
//!
//! Provides a TOML config file at `~/.config/squad/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.
//!
//! Session ids discovered during a dispatch are written back with
//! `toml_edit` so the user's comments and formatting survive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use squad_core::harness::DEFAULT_PROGRAM;
use squad_core::roster::{self, DEFAULT_ROSTER};
use squad_core::{AgentIdentity, CodexCli};

/// Env var overriding the config file location.
pub const CONFIG_ENV: &str = "SQUAD_CONFIG";
/// Env var overriding `[bridge].timeout_sec`.
pub const TIMEOUT_ENV: &str = "SQUAD_TIMEOUT_SEC";
/// Env var overriding `[runtime].program`.
pub const PROGRAM_ENV: &str = "SQUAD_PROGRAM";

/// Lower bound applied to any configured dispatch timeout.
pub const MIN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {}; run `squad init` to create one", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config file at {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse config file at {} as a TOML document", .path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },
    #[error("unknown agent id: {0} (expected one of pm, fe, be, qa)")]
    UnknownAgent(String),
}

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Upper bound on roster size; never below the default roster.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            max_agents: default_max_agents(),
        }
    }
}

fn default_app_name() -> String {
    "squad".to_string()
}

fn default_max_agents() -> usize {
    DEFAULT_ROSTER.len()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSection {
    /// Nominal per-agent timeout in seconds.
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    /// Informational; the runtime always retries a timed-out agent once.
    #[serde(default = "default_retry")]
    pub retry: u32,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            timeout_sec: default_timeout_sec(),
            retry: default_retry(),
        }
    }
}

fn default_timeout_sec() -> u64 {
    90
}

fn default_retry() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default = "default_program")]
    pub program: String,
    /// Script passed to `program` as its first argument, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<PathBuf>,
    /// Fallback working directory; defaults to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            entry: None,
            project_root: None,
        }
    }
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

/// One `[[agents]]` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub role_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub cli_params: String,
    #[serde(default)]
    pub extra_params: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub session_id: String,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_enabled() -> bool {
    true
}

impl AgentEntry {
    pub fn from_identity(agent: &AgentIdentity, session_id: impl Into<String>) -> Self {
        Self {
            id: agent.id.clone(),
            role: agent.role.clone(),
            role_prompt: agent.role_prompt.clone(),
            temperature: agent.temperature,
            cli_params: agent.cli_params.clone(),
            extra_params: agent.extra_params.clone(),
            enabled: agent.enabled,
            session_id: session_id.into(),
        }
    }

    pub fn to_identity(&self) -> AgentIdentity {
        AgentIdentity {
            id: self.id.clone(),
            role: self.role.clone(),
            role_prompt: self.role_prompt.clone(),
            temperature: self.temperature,
            cli_params: self.cli_params.clone(),
            extra_params: self.extra_params.clone(),
            enabled: self.enabled,
        }
    }
}

impl ConfigFile {
    /// A config listing the default roster, as written by `squad init`.
    pub fn with_default_roster() -> Self {
        Self {
            agents: roster::default_agents()
                .iter()
                .map(|a| AgentEntry::from_identity(a, ""))
                .collect(),
            ..Self::default()
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the squad config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/squad` or `~/.config/squad`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("squad");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("squad")
}

/// Return the default path to the squad config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// The config file to use: `--config` > `SQUAD_CONFIG` > default path.
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => config_path(),
    }
}

/// The run log lives beside the config file.
pub fn run_log_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("logs")
        .join("run.log")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

fn load_document(path: &Path) -> Result<toml_edit::DocumentMut> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    };
    let doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|source| ConfigError::Document {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(doc)
}

/// The `[[agents]]` table for `agent_id`, appended if missing.
fn agent_table<'a>(
    doc: &'a mut toml_edit::DocumentMut,
    agent_id: &str,
) -> Result<&'a mut toml_edit::Table> {
    if !doc.contains_key("agents") {
        doc.insert(
            "agents",
            toml_edit::Item::ArrayOfTables(toml_edit::ArrayOfTables::new()),
        );
    }
    let agents = doc
        .get_mut("agents")
        .and_then(|item| item.as_array_of_tables_mut())
        .context("`agents` in config file is not an array of tables")?;

    let pos = agents
        .iter()
        .position(|t| t.get("id").and_then(|v| v.as_str()).map(str::trim) == Some(agent_id));
    let pos = match pos {
        Some(pos) => pos,
        None => {
            let mut table = toml_edit::Table::new();
            table.insert("id", toml_edit::value(agent_id));
            agents.push(table);
            agents.len() - 1
        }
    };
    agents
        .get_mut(pos)
        .context("agent table vanished while editing config")
}

/// Write newly discovered session ids into the config file.
///
/// Only agents without a stored session are touched. A missing config file
/// is created from the default roster first. Returns how many ids were
/// written.
pub fn persist_sessions(path: &Path, sessions: &HashMap<String, String>) -> Result<usize> {
    if sessions.is_empty() {
        return Ok(0);
    }
    if !path.exists() {
        save_config(path, &ConfigFile::with_default_roster())?;
    }

    let mut doc = load_document(path)?;
    let mut ids: Vec<&String> = sessions.keys().collect();
    ids.sort();

    let mut written = 0;
    for agent_id in ids {
        let session_id = &sessions[agent_id];
        let table = agent_table(&mut doc, agent_id)?;
        let existing = table
            .get("session_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if existing.trim().is_empty() {
            table.insert("session_id", toml_edit::value(session_id.as_str()));
            written += 1;
        }
    }

    if written > 0 {
        std::fs::write(path, doc.to_string())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(written)
}

/// Set `enabled` for one agent, preserving the rest of the file.
pub fn set_enabled(path: &Path, agent_id: &str, enabled: bool) -> Result<()> {
    if roster::preset(agent_id).is_none() {
        bail!(ConfigError::UnknownAgent(agent_id.to_string()));
    }
    let mut doc = load_document(path)?;
    agent_table(&mut doc, agent_id)?.insert("enabled", toml_edit::value(enabled));
    std::fs::write(path, doc.to_string())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct SquadConfig {
    pub config_path: PathBuf,
    pub app_name: String,
    /// Merged roster in fixed order.
    pub agents: Vec<AgentIdentity>,
    /// Stored `(agent_id, session_id)` pairs.
    pub sessions: Vec<(String, String)>,
    pub timeout: Duration,
    pub cli: CodexCli,
    pub project_root: PathBuf,
}

impl SquadConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Config path: `cli_config` > `SQUAD_CONFIG` > `~/.config/squad/config.toml`
    /// - Timeout: `cli_timeout` > `SQUAD_TIMEOUT_SEC` > `[bridge].timeout_sec` > 90, clamped to >= 30s
    /// - Program: `SQUAD_PROGRAM` > `[runtime].program` > `codex`
    ///
    /// A missing config file resolves to defaults; a malformed one is an error.
    pub fn resolve(cli_config: Option<&Path>, cli_timeout: Option<u64>) -> Result<Self> {
        let config_path = resolve_config_path(cli_config);
        let file = match load_config(&config_path) {
            Ok(file) => file,
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!(path = %config_path.display(), "no config file, using defaults");
                ConfigFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        let timeout_secs = if let Some(secs) = cli_timeout {
            secs
        } else if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            raw.trim()
                .parse()
                .with_context(|| format!("{TIMEOUT_ENV} is not a number of seconds: {raw:?}"))?
        } else {
            file.bridge.timeout_sec
        };
        let timeout = Duration::from_secs(timeout_secs.max(MIN_TIMEOUT_SECS));
        tracing::debug!(
            timeout_secs = timeout.as_secs(),
            retry = file.bridge.retry,
            "resolved bridge settings"
        );

        let program = match std::env::var(PROGRAM_ENV) {
            Ok(p) if !p.trim().is_empty() => p,
            _ => file.runtime.program.clone(),
        };
        let cli = match &file.runtime.entry {
            Some(entry) => CodexCli::with_entry(program, entry),
            None => CodexCli::new(program),
        };

        let project_root = match &file.runtime.project_root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("failed to determine current directory")?,
        };

        let sessions = file
            .agents
            .iter()
            .map(|a| (a.id.trim().to_string(), a.session_id.trim().to_string()))
            .filter(|(id, sid)| !id.is_empty() && !sid.is_empty())
            .collect();
        let agents = roster::merge_roster(
            file.agents.iter().map(AgentEntry::to_identity).collect(),
            file.app.max_agents,
        );

        Ok(Self {
            config_path,
            app_name: file.app.name.clone(),
            agents,
            sessions,
            timeout,
            cli,
            project_root,
        })
    }

    pub fn run_log_path(&self) -> PathBuf {
        run_log_path(&self.config_path)
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
