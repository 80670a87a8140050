//! Research agent: drafts and improves the written report.

use anyhow::Result;
use tracing::instrument;

use crate::agents::AgentContext;
use crate::core::clean::clean_report;
use crate::core::types::Plan;
use crate::io::llm::Role;

pub struct ResearchAgent<'a> {
    ctx: AgentContext<'a>,
}

impl<'a> ResearchAgent<'a> {
    pub fn new(ctx: AgentContext<'a>) -> Self {
        Self { ctx }
    }

    #[instrument(skip_all)]
    pub fn draft(&self, sources: &str, topic: &str, plan: Option<&Plan>) -> Result<String> {
        let prompt = self.ctx.prompts.research_draft(topic, sources, plan)?;
        let raw = self.ctx.llm.complete(Role::Research, &prompt)?;
        Ok(clean_report(&raw))
    }

    #[instrument(skip_all)]
    pub fn improve(&self, draft: &str, feedback: &str, plan: Option<&Plan>) -> Result<String> {
        let prompt = self.ctx.prompts.research_improve(draft, feedback, plan)?;
        let raw = self.ctx.llm.complete(Role::Research, &prompt)?;
        Ok(clean_report(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::Temperatures;
    use crate::io::llm::LlmSession;
    use crate::io::prompt::PromptBuilder;
    use crate::test_support::ScriptedGateway;

    #[test]
    fn reports_are_cleaned() {
        let gateway =
            ScriptedGateway::new(|_| "<think>hmm</think>\n# Abstract\nFindings.\n---\n".to_string());
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let agent = ResearchAgent::new(AgentContext { llm: &llm, prompts: &prompts });

        assert_eq!(agent.draft("src", "topic", None).expect("draft"), "Abstract\nFindings.");
        assert_eq!(
            agent.improve("Abstract\nOld.", "cite more", None).expect("improve"),
            "Abstract\nFindings."
        );
        let requests = gateway.requests();
        assert!(requests[1].prompt.contains("cite more"));
        assert!(requests[1].prompt.contains("Abstract\nOld."));
    }
}
