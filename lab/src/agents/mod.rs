//! Role agents: thin, stateless wrappers that turn one role operation into a
//! prompt, a model call and a post-processed answer.

use anyhow::Result;
use tracing::debug;

use crate::io::llm::LlmSession;
use crate::io::operator::{Operator, is_affirmative};
use crate::io::prompt::PromptBuilder;

pub mod browsing;
pub mod code_executor;
pub mod code_reviewer;
pub mod code_writer;
pub mod critic;
pub mod research;

/// Model access shared by every agent of a run.
#[derive(Clone, Copy)]
pub struct AgentContext<'a> {
    pub llm: &'a LlmSession<'a>,
    pub prompts: &'a PromptBuilder,
}

/// Blocking approval loop for a model-generated artifact.
///
/// `y`/`yes` approves; `n`/`no` asks what should change; any other text is
/// taken as the requested change. Each change regenerates the artifact via
/// `revise(current, request)`. There is no iteration limit.
pub(crate) fn approve_with_revisions<F>(
    operator: &dyn Operator,
    heading: &str,
    initial: String,
    mut revise: F,
) -> Result<String>
where
    F: FnMut(&str, &str) -> Result<String>,
{
    let mut current = initial;
    let mut revisions = 0u32;
    loop {
        operator.present(heading, &current);
        let answer = operator.ask("Approve? (y/n, or describe the changes you want)")?;
        if is_affirmative(&answer) {
            debug!(heading, revisions, "approved");
            return Ok(current);
        }
        let request = if matches!(answer.trim().to_lowercase().as_str(), "n" | "no") {
            operator.ask("What should change?")?
        } else {
            answer
        };
        if request.trim().is_empty() {
            continue;
        }
        current = revise(&current, request.trim())?;
        revisions += 1;
    }
}
