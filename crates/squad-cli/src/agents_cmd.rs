//! `squad agents`, `squad enable` and `squad disable`.

use std::path::Path;

use anyhow::Result;

use squad_core::{AgentIdentity, AgentStatus, SessionStore};

use crate::config::{self, SquadConfig};

/// State shown for an agent outside a dispatch.
fn roster_state(agent: &AgentIdentity) -> AgentStatus {
    if agent.enabled {
        AgentStatus::Idle
    } else {
        AgentStatus::Stopped
    }
}

/// Print the roster with each agent's state and session.
pub fn run_agents(config: &SquadConfig) -> Result<()> {
    let sessions = SessionStore::from_pairs(config.sessions.iter().cloned());

    println!("{} ({})", config.app_name, config.config_path.display());
    println!();
    println!("{:<4} {:<18} {:<8} SESSION", "ID", "ROLE", "STATE");
    for agent in &config.agents {
        let state = roster_state(agent);
        println!(
            "{:<4} {:<18} {:<8} {}",
            agent.id,
            agent.role,
            state.as_str(),
            sessions.session_for(&agent.id)
        );
    }
    Ok(())
}

/// Toggle one agent in the config file.
pub fn run_set_enabled(config_path: &Path, agent_id: &str, enabled: bool) -> Result<()> {
    config::set_enabled(config_path, agent_id.trim(), enabled)?;
    let verb = if enabled { "enabled" } else { "disabled" };
    println!("Agent {} {verb}.", agent_id.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_agents_are_stopped() {
        let mut agent = AgentIdentity::new("qa", "QA Agent");
        assert_eq!(roster_state(&agent), AgentStatus::Idle);
        agent.enabled = false;
        assert_eq!(roster_state(&agent), AgentStatus::Stopped);
    }
}
