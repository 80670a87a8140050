//! Code writer agent: creates and improves the run's program.

use anyhow::Result;
use tracing::{info, instrument};

use crate::agents::{AgentContext, approve_with_revisions};
use crate::core::extract::extract_code;
use crate::core::types::Plan;
use crate::io::llm::Role;
use crate::io::operator::Operator;

pub struct CodeWriterAgent<'a> {
    ctx: AgentContext<'a>,
    /// Two-phase create: coding plan, operator approval, then code.
    plan_approval: bool,
}

impl<'a> CodeWriterAgent<'a> {
    pub fn new(ctx: AgentContext<'a>, plan_approval: bool) -> Self {
        Self { ctx, plan_approval }
    }

    /// Write the first version of the program.
    #[instrument(skip_all, fields(plan_approval = self.plan_approval))]
    pub fn create(
        &self,
        sources: &str,
        topic: &str,
        plan: Option<&Plan>,
        operator: &dyn Operator,
    ) -> Result<String> {
        let code_plan = if self.plan_approval {
            Some(self.approved_code_plan(sources, topic, plan, operator)?)
        } else {
            None
        };
        let prompt = self
            .ctx
            .prompts
            .code_create(topic, sources, plan, code_plan.as_deref())?;
        let raw = self.ctx.llm.complete(Role::Coding, &prompt)?;
        Ok(extract_code(&raw))
    }

    #[instrument(skip_all)]
    pub fn improve(&self, code: &str, feedback: &str, plan: Option<&Plan>) -> Result<String> {
        let prompt = self.ctx.prompts.code_improve(code, feedback, plan)?;
        let raw = self.ctx.llm.complete(Role::Coding, &prompt)?;
        Ok(extract_code(&raw))
    }

    fn approved_code_plan(
        &self,
        sources: &str,
        topic: &str,
        plan: Option<&Plan>,
        operator: &dyn Operator,
    ) -> Result<String> {
        let prompt = self.ctx.prompts.code_plan(topic, sources, plan)?;
        let draft = self.ctx.llm.complete(Role::Planning, &prompt)?;
        let approved = approve_with_revisions(
            operator,
            "Coding plan",
            draft.trim().to_string(),
            |current, request| {
                let prompt = self.ctx.prompts.code_plan_revise(topic, current, request)?;
                Ok(self.ctx.llm.complete(Role::Planning, &prompt)?.trim().to_string())
            },
        )?;
        info!("coding plan approved");
        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::Temperatures;
    use crate::io::llm::LlmSession;
    use crate::io::prompt::PromptBuilder;
    use crate::test_support::{ScriptedGateway, ScriptedOperator};

    #[test]
    fn create_extracts_fenced_code() {
        let gateway = ScriptedGateway::new(|_| {
            "Here you go:\n```python\nprint('hi')\n```\nEnjoy.".to_string()
        });
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let agent = CodeWriterAgent::new(AgentContext { llm: &llm, prompts: &prompts }, false);
        let operator = ScriptedOperator::new();

        let code = agent.create("src", "topic", None, &operator).expect("create");
        assert_eq!(code, "print('hi')");
        assert_eq!(gateway.requests().len(), 1);
        assert_eq!(gateway.requests()[0].role, Role::Coding);
    }

    #[test]
    fn plan_approval_revises_then_writes_against_approved_plan() {
        let gateway = ScriptedGateway::new(|req| {
            if req.prompt.contains("Requested Changes") {
                "plan v2".to_string()
            } else if req.role == Role::Planning {
                "plan v1".to_string()
            } else {
                "print(2)".to_string()
            }
        });
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let agent = CodeWriterAgent::new(AgentContext { llm: &llm, prompts: &prompts }, true);
        let operator = ScriptedOperator::new().answer("use pandas").answer("yes");

        let code = agent.create("src", "topic", None, &operator).expect("create");
        assert_eq!(code, "print(2)");

        let requests = gateway.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].prompt.contains("use pandas"));
        assert!(requests[2].prompt.contains("plan v2"));
        assert!(operator.presented().iter().any(|(heading, body)| heading == "Coding plan" && body == "plan v2"));
    }
}
