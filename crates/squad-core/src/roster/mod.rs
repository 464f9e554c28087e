//! Default agent roster and merging of configured agents onto it.
//!
//! The team is a small fixed roster (`pm`, `fe`, `be`, `qa`). Configuration
//! may override any field of a default agent but cannot add new ids; the
//! roster order is always the default order.

use crate::agent::AgentIdentity;

/// A built-in roster entry.
#[derive(Debug, Clone, Copy)]
pub struct RosterPreset {
    pub id: &'static str,
    pub role: &'static str,
    pub role_prompt: &'static str,
}

/// The fixed roster, in display and dispatch order.
pub const DEFAULT_ROSTER: [RosterPreset; 4] = [
    RosterPreset {
        id: "pm",
        role: "PM Agent",
        role_prompt: "You are the project manager. Lead with the conclusion, then the plan; focus on \
                      task breakdown, priorities, milestones, risks and rollback options.",
    },
    RosterPreset {
        id: "fe",
        role: "Frontend Agent",
        role_prompt: "You are the frontend engineer, responsible for interaction, state management and \
                      usability; favour readable, operable, responsive UIs with clear error messages.",
    },
    RosterPreset {
        id: "be",
        role: "Backend Agent",
        role_prompt: "You are the backend engineer, responsible for APIs, data models and stability; \
                      favour idempotency, clear error boundaries, observability and compatibility.",
    },
    RosterPreset {
        id: "qa",
        role: "QA Agent",
        role_prompt: "You are the test engineer, responsible for test design and regression checks; \
                      cover the main flow, edge cases, failure paths and acceptance criteria.",
    },
];

/// Look up a preset by agent id.
pub fn preset(id: &str) -> Option<&'static RosterPreset> {
    DEFAULT_ROSTER.iter().find(|p| p.id == id)
}

impl RosterPreset {
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(self.id, self.role).with_role_prompt(self.role_prompt)
    }
}

/// The default roster as identities.
pub fn default_agents() -> Vec<AgentIdentity> {
    DEFAULT_ROSTER.iter().map(RosterPreset::identity).collect()
}

/// Merge configured agents onto the default roster.
///
/// Configured entries replace the matching default but inherit its role
/// label and role prompt when those are blank. Entries with blank or unknown
/// ids are dropped. `max_agents > 0` truncates the roster, but never below
/// the size of the default roster.
pub fn merge_roster(configured: Vec<AgentIdentity>, max_agents: usize) -> Vec<AgentIdentity> {
    let mut configured = configured;
    for agent in &mut configured {
        agent.id = agent.id.trim().to_string();
    }

    for agent in &configured {
        if agent.id.is_empty() {
            tracing::warn!("ignoring configured agent with a blank id");
        } else if preset(&agent.id).is_none() {
            tracing::warn!(agent_id = %agent.id, "ignoring configured agent outside the fixed roster");
        }
    }

    let mut roster: Vec<AgentIdentity> = DEFAULT_ROSTER
        .iter()
        .map(|preset| {
            match configured.iter().rposition(|a| a.id == preset.id) {
                Some(pos) => {
                    let mut agent = configured.remove(pos);
                    if agent.role.trim().is_empty() {
                        agent.role = preset.role.to_string();
                    }
                    if agent.role_prompt.trim().is_empty() {
                        agent.role_prompt = preset.role_prompt.to_string();
                    }
                    agent
                }
                None => preset.identity(),
            }
        })
        .collect();

    if max_agents > 0 {
        roster.truncate(max_agents.max(DEFAULT_ROSTER.len()));
    }
    roster
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_order() {
        let ids: Vec<String> = default_agents().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["pm", "fe", "be", "qa"]);
    }

    #[test]
    fn every_preset_has_a_prompt() {
        for preset in &DEFAULT_ROSTER {
            assert!(!preset.role_prompt.is_empty(), "{} has no prompt", preset.id);
        }
    }

    #[test]
    fn merge_fills_blank_fields_from_defaults() {
        let mut be = AgentIdentity::new("be", "");
        be.temperature = 0.2;
        be.enabled = false;

        let roster = merge_roster(vec![be], 0);
        assert_eq!(roster.len(), 4);

        let be = &roster[2];
        assert_eq!(be.id, "be");
        assert_eq!(be.role, "Backend Agent");
        assert_eq!(be.role_prompt, preset("be").unwrap().role_prompt);
        assert_eq!(be.temperature, 0.2);
        assert!(!be.enabled);
    }

    #[test]
    fn merge_keeps_configured_values() {
        let fe = AgentIdentity::new("fe", "UI Specialist").with_role_prompt("pixels only");
        let roster = merge_roster(vec![fe], 0);
        assert_eq!(roster[1].role, "UI Specialist");
        assert_eq!(roster[1].role_prompt, "pixels only");
    }

    #[test]
    fn merge_drops_unknown_and_blank_ids() {
        let roster = merge_roster(
            vec![AgentIdentity::new("ops", "Ops"), AgentIdentity::new("  ", "Nobody")],
            0,
        );
        let ids: Vec<&str> = roster.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["pm", "fe", "be", "qa"]);
    }

    #[test]
    fn merge_trims_ids() {
        let roster = merge_roster(vec![AgentIdentity::new(" qa ", "Tester")], 0);
        assert_eq!(roster[3].role, "Tester");
    }

    #[test]
    fn max_agents_never_truncates_below_default_roster() {
        assert_eq!(merge_roster(vec![], 2).len(), 4);
        assert_eq!(merge_roster(vec![], 10).len(), 4);
    }
}
