//! Prompt construction and the working-directory question heuristic.
//!
//! Prompts are pure functions of their inputs: identical inputs produce
//! byte-identical output. The working-directory sentence is emitted
//! verbatim so the executor can check replies against the exact path.

use std::path::Path;

use crate::agent::AgentIdentity;

/// The behavioural rules appended to every prompt, in order.
pub const ANSWER_RULES: [&str; 6] = [
    "Answer directly, without pleasantries.",
    "If asked about the working directory, output the full path above verbatim.",
    "Keep the output concise and explicit.",
    "If information is insufficient, first give the smallest actionable plan, then state what is missing.",
    "When changes are involved, prefer steps or commands that can be applied directly.",
    "Never fabricate files, command output or external facts that do not exist.",
];

/// Lowercase tokens that mark a question about the working directory.
const PATH_KEYWORDS: [&str; 5] = ["path", "cwd", "directory", "路径", "目录"];

/// Build the instruction string sent to the agent CLI.
pub fn build_prompt(agent: &AgentIdentity, user_text: &str, working_dir: &Path) -> String {
    let mut prompt = format!(
        "You are {id}, role: {role}.\n\
         Role requirements: {instructions}\n\
         {working_dir_line}\n\
         Answer rules:\n",
        id = agent.id.to_uppercase(),
        role = agent.role,
        instructions = agent.instructions(),
        working_dir_line = working_dir_statement(working_dir),
    );
    for (i, rule) in ANSWER_RULES.iter().enumerate() {
        prompt.push_str(&format!("{}) {rule}\n", i + 1));
    }
    prompt.push_str("User message: ");
    prompt.push_str(user_text);
    prompt
}

/// The fixed sentence restating the working directory.
pub fn working_dir_statement(working_dir: &Path) -> String {
    format!(
        "The current working directory is fixed as: {}",
        working_dir.display()
    )
}

/// Canonical reply used when a path question got an evasive answer.
pub fn canonical_path_reply(working_dir: &Path) -> String {
    format!("current working directory is: {}", working_dir.display())
}

/// Whether `text` looks like a question about the working directory.
pub fn is_path_question(text: &str) -> bool {
    let lower = text.to_lowercase();
    PATH_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Apply the path-question contract to a final reply.
///
/// If the user asked about the working directory and `reply` does not
/// contain the exact path, the reply is replaced with the canonical
/// statement; otherwise it is returned unchanged.
pub fn enforce_path_answer(user_text: &str, reply: String, working_dir: &Path) -> String {
    let path = working_dir.display().to_string();
    if is_path_question(user_text) && !reply.contains(&path) {
        canonical_path_reply(working_dir)
    } else {
        reply
    }
}
