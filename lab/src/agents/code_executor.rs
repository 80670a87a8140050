//! Code executor agent: hands code to the sandbox with a model-backed
//! package resolver.

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::agents::AgentContext;
use crate::core::diagnose::{known_package_for, sanitize_package_name};
use crate::core::types::ExecutionResult;
use crate::io::llm::Role;
use crate::io::operator::Operator;
use crate::io::sandbox::{CodeExecutor, PackageResolver};

/// Static alias table first, then (optionally) the model.
pub struct LlmPackageResolver<'a> {
    ctx: AgentContext<'a>,
    use_llm: bool,
}

impl<'a> LlmPackageResolver<'a> {
    pub fn new(ctx: AgentContext<'a>, use_llm: bool) -> Self {
        Self { ctx, use_llm }
    }
}

impl PackageResolver for LlmPackageResolver<'_> {
    fn resolve(&mut self, module: &str, stderr: &str) -> Result<String> {
        if let Some(package) = known_package_for(module) {
            return Ok(package.to_string());
        }
        if !self.use_llm {
            return Ok(module.to_string());
        }
        let prompt = self.ctx.prompts.resolve_package(module, stderr)?;
        let answer = self.ctx.llm.complete(Role::Execution, &prompt)?;
        let package = sanitize_package_name(&answer)
            .ok_or_else(|| anyhow!("model answer {:?} is not a package name", answer.trim()))?;
        debug!(module, %package, "package resolved by model");
        Ok(package)
    }
}

pub struct CodeExecutorAgent<'a> {
    ctx: AgentContext<'a>,
    executor: &'a dyn CodeExecutor,
    resolve_with_llm: bool,
}

impl<'a> CodeExecutorAgent<'a> {
    pub fn new(ctx: AgentContext<'a>, executor: &'a dyn CodeExecutor, resolve_with_llm: bool) -> Self {
        Self {
            ctx,
            executor,
            resolve_with_llm,
        }
    }

    #[instrument(skip_all)]
    pub fn execute(&self, code: &str, operator: &dyn Operator) -> Result<ExecutionResult> {
        let mut resolver = LlmPackageResolver::new(self.ctx, self.resolve_with_llm);
        self.executor.execute(code, operator, &mut resolver)
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
    fn static_table_wins_over_model() {
        let gateway = ScriptedGateway::new(|_| "wrong".to_string());
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let mut resolver = LlmPackageResolver::new(AgentContext { llm: &llm, prompts: &prompts }, true);

        assert_eq!(resolver.resolve("sklearn", "").expect("resolve"), "scikit-learn");
        assert!(gateway.requests().is_empty());
    }

    #[test]
    fn model_answer_is_sanitized() {
        let gateway = ScriptedGateway::new(|_| "`pip install biopython`".to_string());
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let mut resolver = LlmPackageResolver::new(AgentContext { llm: &llm, prompts: &prompts }, true);

        assert_eq!(resolver.resolve("Bioo", "No module named 'Bioo'").expect("resolve"), "biopython");
        assert_eq!(gateway.requests()[0].role, Role::Execution);
    }

    #[test]
    fn unusable_model_answer_is_an_error() {
        let gateway = ScriptedGateway::new(|_| "$(rm -rf)".to_string());
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let mut resolver = LlmPackageResolver::new(AgentContext { llm: &llm, prompts: &prompts }, true);

        assert!(resolver.resolve("mystery", "").is_err());
    }

    #[test]
    fn disabled_model_falls_back_to_module_name() {
        let gateway = ScriptedGateway::new(|_| "unused".to_string());
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let mut resolver = LlmPackageResolver::new(AgentContext { llm: &llm, prompts: &prompts }, false);

        assert_eq!(resolver.resolve("requests", "").expect("resolve"), "requests");
        assert!(gateway.requests().is_empty());
    }
}
