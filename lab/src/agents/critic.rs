//! Critic agent: independent critiques and the per-round summary.

use anyhow::Result;
use tracing::instrument;

use crate::agents::AgentContext;
use crate::io::llm::Role;

pub struct CriticAgent<'a> {
    ctx: AgentContext<'a>,
}

impl<'a> CriticAgent<'a> {
    pub fn new(ctx: AgentContext<'a>) -> Self {
        Self { ctx }
    }

    #[instrument(skip_all)]
    pub fn review_document(&self, document: &str, sources: &str) -> Result<String> {
        let prompt = self.ctx.prompts.critique_document(document, sources)?;
        Ok(self.ctx.llm.complete(Role::Critique, &prompt)?.trim().to_string())
    }

    #[instrument(skip_all)]
    pub fn review_code_execution(&self, code: &str, execution: &str) -> Result<String> {
        let prompt = self.ctx.prompts.critique_code(code, execution)?;
        Ok(self.ctx.llm.complete(Role::Critique, &prompt)?.trim().to_string())
    }

    /// Fold both critiques (either may be empty) into one operator message.
    #[instrument(skip_all)]
    pub fn summarize(&self, document_feedback: &str, code_feedback: &str) -> Result<String> {
        let prompt = self
            .ctx
            .prompts
            .critique_summary(document_feedback, code_feedback)?;
        Ok(self.ctx.llm.complete(Role::Critique, &prompt)?.trim().to_string())
    }
}
