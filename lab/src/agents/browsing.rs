//! Browsing agent: turns collected material into the run's source text.

use anyhow::Result;
use tracing::{info, instrument};

use crate::agents::AgentContext;
use crate::io::llm::Role;
use crate::io::sources::SourceMaterial;

pub struct BrowsingAgent<'a> {
    ctx: AgentContext<'a>,
}

impl<'a> BrowsingAgent<'a> {
    pub fn new(ctx: AgentContext<'a>) -> Self {
        Self { ctx }
    }

    /// Concatenate the non-empty material under headings. With no material at
    /// all, ask the model for a background briefing instead.
    #[instrument(skip_all, fields(topic = %topic))]
    pub fn browse(&self, topic: &str, material: &SourceMaterial) -> Result<String> {
        let sources = concatenate_material(material);
        if !sources.is_empty() {
            return Ok(sources);
        }
        info!("no source material supplied, requesting background briefing");
        let prompt = self.ctx.prompts.browsing(topic)?;
        let briefing = self.ctx.llm.complete(Role::Browsing, &prompt)?;
        Ok(briefing.trim().to_string())
    }
}

/// Non-empty material under `PDF content:` / `Link content:` / `Local files:` headings.
pub fn concatenate_material(material: &SourceMaterial) -> String {
    [
        ("PDF content", &material.pdf_content),
        ("Link content", &material.link_content),
        ("Local files", &material.files_content),
    ]
    .into_iter()
    .filter(|(_, text)| !text.trim().is_empty())
    .map(|(heading, text)| format!("{heading}:\n{}", text.trim()))
    .collect::<Vec<_>>()
    .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::Temperatures;
    use crate::io::llm::LlmSession;
    use crate::io::prompt::PromptBuilder;
    use crate::test_support::ScriptedGateway;

    #[test]
    fn concatenates_material_without_model_call() {
        let gateway = ScriptedGateway::new(|_| "unused".to_string());
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let agent = BrowsingAgent::new(AgentContext { llm: &llm, prompts: &prompts });

        let sources = agent
            .browse(
                "t",
                &SourceMaterial {
                    pdf_content: "pdf text".to_string(),
                    link_content: String::new(),
                    files_content: "notes".to_string(),
                },
            )
            .expect("browse");
        assert_eq!(sources, "PDF content:\npdf text\n\nLocal files:\nnotes");
        assert!(gateway.requests().is_empty());
    }

    #[test]
    fn empty_material_asks_for_briefing() {
        let gateway = ScriptedGateway::new(|_| "  background  ".to_string());
        let llm = LlmSession::new(&gateway, "m", Temperatures::default());
        let prompts = PromptBuilder::new(100_000);
        let agent = BrowsingAgent::new(AgentContext { llm: &llm, prompts: &prompts });

        let sources = agent.browse("protein folding", &SourceMaterial::default()).expect("browse");
        assert_eq!(sources, "background");
        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].role, Role::Browsing);
        assert!(requests[0].prompt.contains("protein folding"));
    }
}
