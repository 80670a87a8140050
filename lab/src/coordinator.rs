//! Round state machine driving the role agents.
//!
//! Every `coordinate` call runs at most `max_rounds` rounds of
//! `DRAFT_OR_IMPROVE -> EXECUTE -> REVIEW -> PERSIST -> BRANCH`, after a one-time
//! `INIT` that gathers sources and (optionally) an approved plan. State carries
//! over between calls, so a caller can keep invoking `coordinate` until the
//! outcome is finalized.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::agents::browsing::{BrowsingAgent, concatenate_material};
use crate::agents::code_executor::CodeExecutorAgent;
use crate::agents::code_reviewer::CodeReviewerAgent;
use crate::agents::code_writer::CodeWriterAgent;
use crate::agents::critic::CriticAgent;
use crate::agents::research::ResearchAgent;
use crate::agents::{AgentContext, approve_with_revisions};
use crate::core::feedback::{fold_failure_feedback, fold_success_feedback, with_operator_request};
use crate::core::types::{Critique, ExecutionResult, Mode, Plan, RoundRecord, TerminationPolicy};
use crate::io::artifacts::ArtifactSink;
use crate::io::config::LabConfig;
use crate::io::llm::{LlmSession, Role};
use crate::io::operator::Operator;
use crate::io::prompt::PromptBuilder;
use crate::io::sandbox::CodeExecutor;
use crate::io::sources::{SourceCollector, SourceRequest};

/// Run-level knobs, usually taken from [`LabConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub mode: Mode,
    pub max_rounds: u32,
    pub max_code_iterations: u32,
    pub termination: TerminationPolicy,
    pub plan_approval: bool,
    pub code_plan_approval: bool,
    pub two_stage_review: bool,
    pub resolve_packages_with_llm: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&LabConfig::default())
    }
}

impl RunSettings {
    pub fn from_config(config: &LabConfig) -> Self {
        Self {
            mode: config.run.mode,
            max_rounds: config.run.max_rounds,
            max_code_iterations: config.run.max_code_iterations,
            termination: config.run.termination,
            plan_approval: config.run.plan_approval,
            code_plan_approval: config.run.code_plan_approval,
            two_stage_review: config.run.two_stage_review,
            resolve_packages_with_llm: config.sandbox.resolve_packages_with_llm,
        }
    }
}

/// Everything the coordinator talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub llm: &'a LlmSession<'a>,
    pub prompts: &'a PromptBuilder,
    pub operator: &'a dyn Operator,
    pub collector: &'a dyn SourceCollector,
    pub executor: &'a dyn CodeExecutor,
    pub sink: &'a dyn ArtifactSink,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorState {
    pub topic: String,
    pub sources: Option<String>,
    pub plan: Option<Plan>,
    pub report: Option<String>,
    pub code: Option<String>,
    pub last_critique: Critique,
    /// Rounds completed across all `coordinate` calls.
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationOutcome {
    pub report: Option<String>,
    pub code: Option<String>,
    pub finalized: bool,
}

/// Result of the EXECUTE step, whether single-shot or the nested fix loop.
#[derive(Debug, Clone)]
struct CodeAttempt {
    code: String,
    execution: ExecutionResult,
    /// Reviewer feedback already produced for `execution`.
    review: Option<String>,
    satisfied: bool,
    operator_request: Option<String>,
}

pub struct Coordinator<'a> {
    settings: RunSettings,
    deps: Collaborators<'a>,
    request: SourceRequest,
    state: CoordinatorState,
}

impl<'a> Coordinator<'a> {
    pub fn new(settings: RunSettings, deps: Collaborators<'a>, request: SourceRequest) -> Self {
        let state = CoordinatorState {
            topic: request.topic.clone(),
            ..CoordinatorState::default()
        };
        Self {
            settings,
            deps,
            request,
            state,
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn operator(&self) -> &'a dyn Operator {
        self.deps.operator
    }

    fn ctx(&self) -> AgentContext<'a> {
        AgentContext {
            llm: self.deps.llm,
            prompts: self.deps.prompts,
        }
    }

    pub fn coordinate(&mut self, topic: &str) -> Result<CoordinationOutcome> {
        self.coordinate_with(topic, &mut |_: &RoundRecord| {})
    }

    /// Run up to `max_rounds` rounds, calling `on_round` after each persisted round.
    #[instrument(skip_all, fields(mode = self.settings.mode.as_str(), max_rounds = self.settings.max_rounds))]
    pub fn coordinate_with(
        &mut self,
        topic: &str,
        on_round: &mut dyn FnMut(&RoundRecord),
    ) -> Result<CoordinationOutcome> {
        if self.state.topic != topic {
            debug!("topic changed, starting from a clean state");
            self.state = CoordinatorState {
                topic: topic.to_string(),
                ..CoordinatorState::default()
            };
        }
        self.init()?;

        let mode = self.settings.mode;
        let mut last_code_ok = !mode.includes_code();
        for _ in 0..self.settings.max_rounds {
            let round = self.state.round;
            info!(round, "round started");

            self.draft_or_improve()?;
            let attempt = if mode.includes_code() {
                Some(self.execute_step()?)
            } else {
                None
            };
            let (record, review, code_critique) = self.review(round, attempt.as_ref())?;

            self.deps.sink.persist_round(&record)?;
            on_round(&record);

            let code_ok = attempt.as_ref().is_none_or(|a| a.satisfied);
            if let Some(attempt) = &attempt {
                self.state.last_critique.code = if !attempt.execution.is_success() {
                    fold_failure_feedback(&review, &attempt.execution)
                } else if !attempt.satisfied {
                    with_operator_request(&review, attempt.operator_request.as_deref().unwrap_or(""))
                } else {
                    fold_success_feedback(&review, &code_critique)
                };
            }
            self.state.round += 1;
            last_code_ok = code_ok;

            if code_ok && self.settings.termination == TerminationPolicy::FirstSuccess {
                info!(round, "round succeeded, finalizing");
                return Ok(self.outcome(true));
            }
            if !code_ok {
                info!(round, "code not accepted, carrying feedback into next round");
            }
        }

        let finalized = self.settings.termination == TerminationPolicy::ExhaustRounds && last_code_ok;
        info!(finalized, rounds = self.state.round, "round budget spent");
        Ok(self.outcome(finalized))
    }

    fn outcome(&self, finalized: bool) -> CoordinationOutcome {
        CoordinationOutcome {
            report: self.state.report.clone(),
            code: self.state.code.clone(),
            finalized,
        }
    }

    /// Gather sources and the optional plan once per topic.
    fn init(&mut self) -> Result<()> {
        let operator = self.deps.operator;
        if self.state.sources.is_none() {
            let request = SourceRequest {
                topic: self.state.topic.clone(),
                ..self.request.clone()
            };
            let material = self.deps.collector.collect(&request)?;
            if !request.pdfs.is_empty() && material.pdf_content.trim().is_empty() {
                warn!("no pdf content extracted");
                operator.present("Warning", "No PDF content could be extracted.");
            }
            if !request.links.is_empty() && material.link_content.trim().is_empty() {
                warn!("no link content extracted");
                operator.present("Warning", "No link content could be extracted.");
            }
            let sources = BrowsingAgent::new(self.ctx()).browse(&self.state.topic, &material)?;
            debug!(bytes = sources.len(), "sources ready");
            self.state.sources = Some(sources);
        }

        if self.settings.plan_approval && self.state.plan.is_none() {
            let ctx = self.ctx();
            let topic = self.state.topic.as_str();
            let sources = self.state.sources.as_deref().unwrap_or("");
            let prompt = ctx.prompts.plan(topic, sources, self.settings.mode.as_str())?;
            let draft = ctx.llm.complete(Role::Planning, &prompt)?;
            let approved = approve_with_revisions(operator, "Plan", draft.trim().to_string(), |current, request| {
                let prompt = ctx.prompts.plan_revise(topic, sources, current, request)?;
                Ok(ctx.llm.complete(Role::Planning, &prompt)?.trim().to_string())
            })?;
            info!("plan approved");
            self.state.plan = Some(Plan::new(approved));
        }
        Ok(())
    }

    fn draft_or_improve(&mut self) -> Result<()> {
        let ctx = self.ctx();
        let operator = self.deps.operator;
        let topic = self.state.topic.as_str();
        let sources = self.state.sources.as_deref().unwrap_or("");
        let plan = self.state.plan.as_ref();

        if self.settings.mode.includes_research() {
            let research = ResearchAgent::new(ctx);
            let report = match &self.state.report {
                None => research.draft(sources, topic, plan)?,
                Some(report) => research.improve(report, &self.state.last_critique.document, plan)?,
            };
            operator.present("Research report", &report);
            self.state.report = Some(report);
        }

        if self.settings.mode.includes_code() {
            let writer = CodeWriterAgent::new(ctx, self.settings.code_plan_approval);
            let code = match &self.state.code {
                None => writer.create(sources, topic, plan, operator)?,
                Some(code) => writer.improve(code, &self.state.last_critique.code, plan)?,
            };
            self.state.code = Some(code);
        }
        Ok(())
    }

    fn execute_step(&mut self) -> Result<CodeAttempt> {
        let code = self.state.code.clone().unwrap_or_default();
        let attempt = if self.settings.max_code_iterations > 1 {
            self.iterate_code_until_success(code)?
        } else {
            let execution = self.executor_agent().execute(&code, self.deps.operator)?;
            let satisfied = execution.is_success();
            CodeAttempt {
                code,
                execution,
                review: None,
                satisfied,
                operator_request: None,
            }
        };
        self.state.code = Some(attempt.code.clone());
        Ok(attempt)
    }

    fn executor_agent(&self) -> CodeExecutorAgent<'a> {
        CodeExecutorAgent::new(
            self.ctx(),
            self.deps.executor,
            self.settings.resolve_packages_with_llm,
        )
    }

    /// Execute, review and improve inside one round until the operator is
    /// satisfied or `max_code_iterations` executions have happened. The last
    /// execution is never followed by an improvement.
    #[instrument(skip_all, fields(max_code_iterations = self.settings.max_code_iterations))]
    fn iterate_code_until_success(&self, mut code: String) -> Result<CodeAttempt> {
        let operator = self.deps.operator;
        let executor = self.executor_agent();
        let reviewer = CodeReviewerAgent::new(self.ctx(), self.settings.two_stage_review);
        let writer = CodeWriterAgent::new(self.ctx(), self.settings.code_plan_approval);
        let plan = self.state.plan.as_ref();

        let mut iteration = 1u32;
        loop {
            let last = iteration >= self.settings.max_code_iterations;
            let execution = executor.execute(&code, operator)?;
            debug!(iteration, success = execution.is_success(), "code iteration executed");

            if execution.is_success() {
                let review = reviewer.review(&code, &execution)?;
                operator.present("Code review", &review);
                if operator.confirm("Are you satisfied with this result?")? {
                    return Ok(CodeAttempt {
                        code,
                        execution,
                        review: Some(review),
                        satisfied: true,
                        operator_request: None,
                    });
                }
                let request = operator.ask("What should be improved?")?;
                if last {
                    return Ok(CodeAttempt {
                        code,
                        execution,
                        review: Some(review),
                        satisfied: false,
                        operator_request: Some(request),
                    });
                }
                code = writer.improve(&code, &with_operator_request(&review, &request), plan)?;
            } else {
                if last {
                    return Ok(CodeAttempt {
                        code,
                        execution,
                        review: None,
                        satisfied: false,
                        operator_request: None,
                    });
                }
                let review = reviewer.review(&code, &execution)?;
                code = writer.improve(&code, &fold_failure_feedback(&review, &execution), plan)?;
            }
            iteration += 1;
        }
    }

    /// REVIEW step. Returns the round record plus reviewer and code-critic text.
    fn review(&mut self, round: u32, attempt: Option<&CodeAttempt>) -> Result<(RoundRecord, String, String)> {
        let ctx = self.ctx();
        let critic = CriticAgent::new(ctx);
        let sources = self.state.sources.as_deref().unwrap_or("");

        let review = match attempt {
            Some(CodeAttempt {
                review: Some(review),
                ..
            }) => review.clone(),
            Some(attempt) => CodeReviewerAgent::new(ctx, self.settings.two_stage_review)
                .review(&attempt.code, &attempt.execution)?,
            None => String::new(),
        };

        let document_feedback = match &self.state.report {
            Some(report) if self.settings.mode.includes_research() => {
                critic.review_document(report, sources)?
            }
            _ => String::new(),
        };
        let code_critique = match attempt {
            Some(attempt) => critic.review_code_execution(&attempt.code, &attempt.execution.render())?,
            None => String::new(),
        };
        let summary = critic.summarize(&document_feedback, &code_critique)?;
        self.deps
            .operator
            .present(&format!("Critic summary, round {}", round + 1), &summary);

        self.state.last_critique.document = document_feedback;
        let record = RoundRecord {
            round,
            report: self.state.report.clone(),
            code: attempt.map(|a| a.code.clone()),
            execution: attempt.map(|a| a.execution.clone()),
            summary,
        };
        Ok((record, review, code_critique))
    }

    /// Single collect-and-answer pass with no rounds.
    #[instrument(skip_all)]
    pub fn quick_search(&mut self, topic: &str) -> Result<String> {
        let request = SourceRequest {
            topic: topic.to_string(),
            ..self.request.clone()
        };
        let material = self.deps.collector.collect(&request)?;
        let sources = concatenate_material(&material);
        let prompt = self.deps.prompts.quick_search(topic, &sources)?;
        let answer = self.deps.llm.complete(Role::Browsing, &prompt)?;
        let answer = answer.trim().to_string();
        self.deps.operator.present("Quick search", &answer);
        self.deps.sink.persist_quick_search(topic, &answer)?;
        self.finish()?;
        Ok(answer)
    }

    /// Persist run-level telemetry.
    pub fn finish(&self) -> Result<()> {
        self.deps.llm.log_summary();
        self.deps.sink.persist_telemetry(&self.deps.llm.telemetry())
    }
}
