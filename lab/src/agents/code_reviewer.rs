//! Code reviewer agent: actionable feedback on a program and its execution.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::agents::AgentContext;
use crate::core::types::ExecutionResult;
use crate::io::llm::Role;

pub struct CodeReviewerAgent<'a> {
    ctx: AgentContext<'a>,
    /// Failed runs get an analysis call before the fix call.
    two_stage: bool,
}

impl<'a> CodeReviewerAgent<'a> {
    pub fn new(ctx: AgentContext<'a>, two_stage: bool) -> Self {
        Self { ctx, two_stage }
    }

    #[instrument(skip_all, fields(success = result.is_success(), two_stage = self.two_stage))]
    pub fn review(&self, code: &str, result: &ExecutionResult) -> Result<String> {
        let execution = result.render();
        if result.is_success() {
            let prompt = self.ctx.prompts.review_success(code, &execution)?;
            return Ok(self.ctx.llm.complete(Role::Review, &prompt)?.trim().to_string());
        }

        let prompt = self.ctx.prompts.review_analysis(code, &execution)?;
        let analysis = self.ctx.llm.complete(Role::Review, &prompt)?;
        if !self.two_stage {
            return Ok(analysis.trim().to_string());
        }
        debug!(analysis_bytes = analysis.len(), "analysis done, requesting fix");
        let prompt = self.ctx.prompts.review_fix(code, &execution, &analysis)?;
        Ok(self.ctx.llm.complete(Role::Review, &prompt)?.trim().to_string())
    }
}
