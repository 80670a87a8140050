//! Test-only doubles for the model gateway, the operator and the run's
//! side-effecting collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{ExecutionResult, RoundRecord};
use crate::io::artifacts::ArtifactSink;
use crate::io::config::SandboxConfig;
use crate::io::llm::{Completion, CompletionRequest, LlmGateway, Role, Telemetry, TransportError};
use crate::io::operator::Operator;
use crate::io::sandbox::{CodeExecutor, PackageResolver};
use crate::io::sources::{SourceCollector, SourceMaterial, SourceRequest};

/// Temporary sandbox directory running scripts with `sh`.
///
/// The package manager is a pair of one-liners: installing a package touches a
/// marker file named after it in the sandbox directory, `show` tests for it.
pub fn scratch_sandbox() -> Result<(TempDir, SandboxConfig)> {
    let dir = tempfile::tempdir().context("create scratch sandbox dir")?;
    let config = SandboxConfig {
        workdir: dir.path().to_path_buf(),
        script_name: "temp_code.sh".to_string(),
        interpreter: vec!["sh".to_string()],
        install_command: vec!["sh".to_string(), "-c".to_string(), "touch \"$0\"".to_string()],
        show_command: vec!["sh".to_string(), "-c".to_string(), "test -f \"$0\"".to_string()],
        timeout_secs: 10,
        install_timeout_secs: 10,
        ..SandboxConfig::default()
    };
    Ok((dir, config))
}

type Responder = Box<dyn Fn(&CompletionRequest) -> String>;

/// Gateway answering every request through a closure and recording it.
pub struct ScriptedGateway {
    responder: Responder,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new(responder: impl Fn(&CompletionRequest) -> String + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }

    pub fn calls_for(&self, role: Role) -> usize {
        self.requests.borrow().iter().filter(|r| r.role == role).count()
    }
}

impl LlmGateway for ScriptedGateway {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        Ok(Completion {
            text: (self.responder)(request),
            eval_count: Some(1),
        })
    }
}

/// Gateway whose server always answers 503.
pub struct UnreachableGateway;

impl LlmGateway for UnreachableGateway {
    fn complete(&self, _request: &CompletionRequest) -> Result<Completion, TransportError> {
        Err(TransportError::Status {
            status: 503,
            body: "service unavailable".to_string(),
        })
    }
}

/// Operator replaying queued confirmations and answers. Running out of either
/// is an error so tests fail loudly on unexpected prompts.
#[derive(Default)]
pub struct ScriptedOperator {
    confirms: RefCell<VecDeque<bool>>,
    answers: RefCell<VecDeque<String>>,
    confirmations: Cell<usize>,
    questions: RefCell<Vec<String>>,
    presented: RefCell<Vec<(String, String)>>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(self, answer: bool) -> Self {
        self.confirms.borrow_mut().push_back(answer);
        self
    }

    pub fn answer(self, answer: &str) -> Self {
        self.answers.borrow_mut().push_back(answer.to_string());
        self
    }

    pub fn confirmations_asked(&self) -> usize {
        self.confirmations.get()
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    pub fn presented(&self) -> Vec<(String, String)> {
        self.presented.borrow().clone()
    }

    pub fn presented_headings(&self) -> Vec<String> {
        self.presented.borrow().iter().map(|(h, _)| h.clone()).collect()
    }

    /// Confirmations and answers still queued.
    pub fn remaining(&self) -> (usize, usize) {
        (self.confirms.borrow().len(), self.answers.borrow().len())
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.confirmations.set(self.confirmations.get() + 1);
        self.confirms
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted operator has no confirmation for {prompt:?}"))
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        self.questions.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted operator has no answer for {prompt:?}"))
    }

    fn present(&self, heading: &str, body: &str) {
        self.presented
            .borrow_mut()
            .push((heading.to_string(), body.to_string()));
    }
}

/// Executor replaying queued results; the last one repeats once the queue is drained.
pub struct ScriptedExecutor {
    results: RefCell<VecDeque<ExecutionResult>>,
    last: RefCell<ExecutionResult>,
    executed: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn always(result: ExecutionResult) -> Self {
        Self::sequence(vec![result])
    }

    pub fn sequence(results: Vec<ExecutionResult>) -> Self {
        let last = results.last().cloned().unwrap_or(ExecutionResult::Success {
            stdout: String::new(),
        });
        Self {
            results: RefCell::new(results.into()),
            last: RefCell::new(last),
            executed: RefCell::new(Vec::new()),
        }
    }

    /// Code handed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl CodeExecutor for ScriptedExecutor {
    fn execute(
        &self,
        raw: &str,
        _operator: &dyn Operator,
        _resolver: &mut dyn PackageResolver,
    ) -> Result<ExecutionResult> {
        self.executed.borrow_mut().push(raw.to_string());
        let next = self.results.borrow_mut().pop_front();
        match next {
            Some(result) => {
                *self.last.borrow_mut() = result.clone();
                Ok(result)
            }
            None => Ok(self.last.borrow().clone()),
        }
    }
}

/// Sink keeping everything in memory.
#[derive(Default)]
pub struct RecordingSink {
    rounds: RefCell<Vec<RoundRecord>>,
    telemetry: RefCell<Option<Telemetry>>,
    quick_searches: RefCell<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rounds(&self) -> Vec<RoundRecord> {
        self.rounds.borrow().clone()
    }

    pub fn telemetry(&self) -> Option<Telemetry> {
        self.telemetry.borrow().clone()
    }

    pub fn quick_searches(&self) -> Vec<(String, String)> {
        self.quick_searches.borrow().clone()
    }
}

impl ArtifactSink for RecordingSink {
    fn persist_round(&self, record: &RoundRecord) -> Result<()> {
        self.rounds.borrow_mut().push(record.clone());
        Ok(())
    }

    fn persist_telemetry(&self, telemetry: &Telemetry) -> Result<()> {
        *self.telemetry.borrow_mut() = Some(telemetry.clone());
        Ok(())
    }

    fn persist_quick_search(&self, topic: &str, answer: &str) -> Result<()> {
        self.quick_searches
            .borrow_mut()
            .push((topic.to_string(), answer.to_string()));
        Ok(())
    }
}

/// Collector returning the same material for every request.
#[derive(Default)]
pub struct StaticCollector {
    material: SourceMaterial,
    requests: RefCell<Vec<SourceRequest>>,
}

impl StaticCollector {
    pub fn new(material: SourceMaterial) -> Self {
        Self {
            material,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SourceRequest> {
        self.requests.borrow().clone()
    }
}

impl SourceCollector for StaticCollector {
    fn collect(&self, request: &SourceRequest) -> Result<SourceMaterial> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self.material.clone())
    }
}
