mod agents_cmd;
mod config;
mod dispatch_cmd;
mod logs_cmd;
#[cfg(test)]
mod test_util;

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use config::SquadConfig;
use dispatch_cmd::DispatchArgs;
use logs_cmd::LevelFilter;

#[derive(Parser)]
#[command(name = "squad", about = "Dispatch one task to a team of CLI coding agents")]
struct Cli {
    /// Config file path (overrides SQUAD_CONFIG env var)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a squad config file with the default roster
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// List agents with their state and session
    Agents,
    /// Enable an agent
    Enable {
        /// Agent ID (pm, fe, be, qa)
        id: String,
    },
    /// Disable (stop) an agent
    Disable {
        /// Agent ID (pm, fe, be, qa)
        id: String,
    },
    /// Send a task to the enabled agents and wait for their replies
    Dispatch {
        /// Task text
        text: String,
        /// Only dispatch to these agents (repeatable)
        #[arg(long = "to", value_name = "ID")]
        to: Vec<String>,
        /// Working directory for the agents (falls back to the project root)
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Timeout per agent in seconds (minimum 30)
        #[arg(long)]
        timeout: Option<u64>,
        /// Print results as JSON instead of streaming progress
        #[arg(long)]
        json: bool,
    },
    /// Show the run log
    Logs {
        /// Which entries to show
        #[arg(long, value_enum, default_value_t = LevelFilter::All)]
        level: LevelFilter,
        /// Only show the last N entries
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Execute the `squad init` command: write config file.
fn cmd_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    config::save_config(path, &config::ConfigFile::with_default_roster())?;

    println!("Config written to {}", path.display());
    println!("  agents = pm, fe, be, qa");
    println!("  runtime.program = {}", squad_core::harness::DEFAULT_PROGRAM);
    println!();
    println!("Next: run `squad dispatch \"<task>\"` to send a task to every enabled agent.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Init { force } => {
            cmd_init(&config_path, force)?;
        }
        Commands::Agents => {
            let resolved = SquadConfig::resolve(cli.config.as_deref(), None)?;
            agents_cmd::run_agents(&resolved)?;
        }
        Commands::Enable { id } => {
            agents_cmd::run_set_enabled(&config_path, &id, true)?;
        }
        Commands::Disable { id } => {
            agents_cmd::run_set_enabled(&config_path, &id, false)?;
        }
        Commands::Dispatch {
            text,
            to,
            cwd,
            timeout,
            json,
        } => {
            let resolved = SquadConfig::resolve(cli.config.as_deref(), timeout)?;
            let all_done =
                dispatch_cmd::run_dispatch(resolved, DispatchArgs { text, to, cwd, json }).await?;
            if !all_done {
                std::process::exit(1);
            }
        }
        Commands::Logs { level, tail } => {
            logs_cmd::run_logs(&config::run_log_path(&config_path), level, tail)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "squad", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_dispatch_with_targets() {
        let cli = Cli::try_parse_from([
            "squad", "dispatch", "fix the bug", "--to", "be", "--to", "qa", "--timeout", "60",
        ])
        .unwrap();
        match cli.command {
            Commands::Dispatch { text, to, timeout, cwd, json } => {
                assert_eq!(text, "fix the bug");
                assert_eq!(to, vec!["be", "qa"]);
                assert_eq!(timeout, Some(60));
                assert!(cwd.is_none());
                assert!(!json);
            }
            _ => panic!("expected dispatch"),
        }
    }

    #[test]
    fn parse_logs_level() {
        let cli = Cli::try_parse_from(["squad", "logs", "--level", "error", "--tail", "20"]).unwrap();
        match cli.command {
            Commands::Logs { level, tail } => {
                assert_eq!(level, LevelFilter::Error);
                assert_eq!(tail, Some(20));
            }
            _ => panic!("expected logs"),
        }
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        cmd_init(&path, false).unwrap();
        assert!(cmd_init(&path, false).is_err());
        cmd_init(&path, true).unwrap();
    }
}
