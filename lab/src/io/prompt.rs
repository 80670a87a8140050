//! Prompt rendering for every role operation.
//!
//! Templates are embedded minijinja files. Each one splits its output into
//! sections with `<!-- section:KEY required|droppable -->` markers so the
//! builder can keep prompts inside the configured byte budget.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};
use regex::Regex;
use tracing::debug;

use crate::core::types::Plan;

const TEMPLATES: &[(&str, &str)] = &[
    ("browsing", include_str!("prompts/browsing.md")),
    ("plan", include_str!("prompts/plan.md")),
    ("plan_revise", include_str!("prompts/plan_revise.md")),
    ("research_draft", include_str!("prompts/research_draft.md")),
    ("research_improve", include_str!("prompts/research_improve.md")),
    ("code_plan", include_str!("prompts/code_plan.md")),
    ("code_plan_revise", include_str!("prompts/code_plan_revise.md")),
    ("code_create", include_str!("prompts/code_create.md")),
    ("code_improve", include_str!("prompts/code_improve.md")),
    ("review_analysis", include_str!("prompts/review_analysis.md")),
    ("review_fix", include_str!("prompts/review_fix.md")),
    ("review_success", include_str!("prompts/review_success.md")),
    ("critique_document", include_str!("prompts/critique_document.md")),
    ("critique_code", include_str!("prompts/critique_code.md")),
    ("critique_summary", include_str!("prompts/critique_summary.md")),
    ("quick_search", include_str!("prompts/quick_search.md")),
    ("resolve_package", include_str!("prompts/resolve_package.md")),
];

/// Section dropped before anything is truncated.
const FIRST_DROP: &str = "plan";

const TRUNCATION_MARKER: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section regex should be valid")
});

#[derive(Debug, Clone)]
struct Section {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered template output at section markers.
///
/// Text before the first marker is discarded; empty droppable sections are
/// skipped.
fn parse_sections(rendered: &str) -> Vec<Section> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let required = kind.as_str() == "required";
        let content = rendered[whole.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(Section {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[Section]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Bring `sections` within `budget` bytes: drop the plan, then truncate the
/// largest droppable sections. Required sections are never touched.
fn apply_budget(sections: &mut Vec<Section>, budget: usize) {
    if total_len(sections) <= budget {
        return;
    }

    if let Some(idx) = sections
        .iter()
        .position(|s| s.key == FIRST_DROP && !s.required)
    {
        let dropped = sections.remove(idx);
        debug!(
            section = FIRST_DROP,
            bytes_dropped = dropped.content.len(),
            "dropped section for budget"
        );
    }

    let mut candidates: Vec<usize> = (0..sections.len())
        .filter(|&i| !sections[i].required)
        .collect();
    candidates.sort_by_key(|&i| std::cmp::Reverse(sections[i].content.len()));

    for idx in candidates {
        let total = total_len(sections);
        if total <= budget {
            break;
        }
        let excess = total - budget;
        let section = &mut sections[idx];
        let before_len = section.content.len();
        let keep = before_len.saturating_sub(excess + TRUNCATION_MARKER.len());
        let cut = floor_char_boundary(&section.content, keep);
        section.content.truncate(cut);
        section.content.push_str(TRUNCATION_MARKER);
        debug!(
            section = section.key,
            before_len,
            after_len = section.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut idx = index;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn join_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn plan_text(plan: Option<&Plan>) -> Option<&str> {
    plan.and_then(|p| non_empty(p.as_str()))
}

/// Renders role prompts within a byte budget.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(name, source)
                .expect("embedded prompt templates should be valid");
        }
        Self { env, budget_bytes }
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load prompt template {name}"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render prompt template {name}"))?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(join_sections(&sections))
    }

    pub fn browsing(&self, topic: &str) -> Result<String> {
        self.render("browsing", context! { topic => topic.trim() })
    }

    pub fn plan(&self, topic: &str, sources: &str, mode: &str) -> Result<String> {
        self.render(
            "plan",
            context! { topic => topic.trim(), sources => non_empty(sources), mode => mode },
        )
    }

    pub fn plan_revise(&self, topic: &str, sources: &str, current: &str, request: &str) -> Result<String> {
        self.render(
            "plan_revise",
            context! {
                topic => topic.trim(),
                sources => non_empty(sources),
                current => current.trim(),
                request => request.trim(),
            },
        )
    }

    pub fn research_draft(&self, topic: &str, sources: &str, plan: Option<&Plan>) -> Result<String> {
        self.render(
            "research_draft",
            context! { topic => topic.trim(), sources => non_empty(sources), plan => plan_text(plan) },
        )
    }

    pub fn research_improve(&self, draft: &str, feedback: &str, plan: Option<&Plan>) -> Result<String> {
        self.render(
            "research_improve",
            context! { draft => draft.trim(), feedback => non_empty(feedback), plan => plan_text(plan) },
        )
    }

    pub fn code_plan(&self, topic: &str, sources: &str, plan: Option<&Plan>) -> Result<String> {
        self.render(
            "code_plan",
            context! { topic => topic.trim(), sources => non_empty(sources), plan => plan_text(plan) },
        )
    }

    pub fn code_plan_revise(&self, topic: &str, current: &str, request: &str) -> Result<String> {
        self.render(
            "code_plan_revise",
            context! { topic => topic.trim(), current => current.trim(), request => request.trim() },
        )
    }

    pub fn code_create(
        &self,
        topic: &str,
        sources: &str,
        plan: Option<&Plan>,
        code_plan: Option<&str>,
    ) -> Result<String> {
        self.render(
            "code_create",
            context! {
                topic => topic.trim(),
                sources => non_empty(sources),
                plan => plan_text(plan),
                code_plan => code_plan.and_then(non_empty),
            },
        )
    }

    pub fn code_improve(&self, code: &str, feedback: &str, plan: Option<&Plan>) -> Result<String> {
        self.render(
            "code_improve",
            context! { code => code.trim(), feedback => non_empty(feedback), plan => plan_text(plan) },
        )
    }

    pub fn review_analysis(&self, code: &str, execution: &str) -> Result<String> {
        self.render(
            "review_analysis",
            context! { code => code.trim(), execution => execution.trim() },
        )
    }

    pub fn review_fix(&self, code: &str, execution: &str, analysis: &str) -> Result<String> {
        self.render(
            "review_fix",
            context! { code => code.trim(), execution => execution.trim(), analysis => analysis.trim() },
        )
    }

    pub fn review_success(&self, code: &str, execution: &str) -> Result<String> {
        self.render(
            "review_success",
            context! { code => code.trim(), execution => execution.trim() },
        )
    }

    pub fn critique_document(&self, document: &str, sources: &str) -> Result<String> {
        self.render(
            "critique_document",
            context! { document => document.trim(), sources => non_empty(sources) },
        )
    }

    pub fn critique_code(&self, code: &str, execution: &str) -> Result<String> {
        self.render(
            "critique_code",
            context! { code => code.trim(), execution => execution.trim() },
        )
    }

    pub fn critique_summary(&self, document_feedback: &str, code_feedback: &str) -> Result<String> {
        self.render(
            "critique_summary",
            context! {
                document_feedback => non_empty(document_feedback),
                code_feedback => non_empty(code_feedback),
            },
        )
    }

    pub fn quick_search(&self, topic: &str, sources: &str) -> Result<String> {
        self.render(
            "quick_search",
            context! { topic => topic.trim(), sources => non_empty(sources) },
        )
    }

    pub fn resolve_package(&self, module: &str, error: &str) -> Result<String> {
        self.render(
            "resolve_package",
            context! { module => module.trim(), error => non_empty(error) },
        )
    }
}
