//! Model server gateway and per-run call telemetry.
//!
//! Every role agent talks to the model through [`LlmSession`], which picks the
//! role's temperature, forwards to an [`LlmGateway`] and records one
//! [`CallRecord`] per call.

use std::cell::RefCell;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{LlmConfig, Temperatures};

/// Which agent is calling; selects the sampling temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Browsing,
    Planning,
    Research,
    Coding,
    Review,
    Critique,
    Execution,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Browsing => "browsing",
            Role::Planning => "planning",
            Role::Research => "research",
            Role::Coding => "coding",
            Role::Review => "review",
            Role::Critique => "critique",
            Role::Execution => "execution",
        }
    }

    fn temperature(self, temperatures: &Temperatures) -> f64 {
        match self {
            Role::Browsing => temperatures.browsing,
            Role::Planning => temperatures.planning,
            Role::Research => temperatures.research,
            Role::Coding => temperatures.coding,
            Role::Review => temperatures.review,
            Role::Critique => temperatures.critique,
            Role::Execution => temperatures.execution,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub role: Role,
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub text: String,
    /// Generated tokens as reported by the server, when it reports them.
    pub eval_count: Option<u64>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to model server failed: {0}")]
    Request(String),
    #[error("model server returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode model server response: {0}")]
    Decode(String),
}

impl TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Decode(_) => false,
        }
    }
}

/// Text-in/text-out completion service.
pub trait LlmGateway {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, TransportError>;
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// Non-streaming client for an Ollama-style `/api/generate` endpoint.
pub struct OllamaGateway {
    client: reqwest::blocking::Client,
    endpoint: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OllamaGateway {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    fn attempt(&self, request: &CompletionRequest) -> Result<Completion, TransportError> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        let reply: GenerateReply = response
            .json()
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(Completion {
            text: reply.response,
            eval_count: reply.eval_count,
        })
    }
}

impl LlmGateway for OllamaGateway {
    #[instrument(skip_all, fields(role = request.role.as_str(), model = %request.model))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, TransportError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(request) {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_backoff * attempt;
                    warn!(err = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying model call");
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// One model call as seen by the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub role: Role,
    pub model: String,
    pub temperature: f64,
    pub prompt_bytes: usize,
    pub response_bytes: usize,
    pub eval_tokens: Option<u64>,
    pub duration_ms: u64,
}

/// Aggregated call telemetry, persisted next to the run artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub calls: Vec<CallRecord>,
    pub total_eval_tokens: u64,
}

/// Request-scoped model access shared by every agent of a run.
pub struct LlmSession<'a> {
    gateway: &'a dyn LlmGateway,
    model: String,
    temperatures: Temperatures,
    telemetry: RefCell<Telemetry>,
}

impl<'a> LlmSession<'a> {
    pub fn new(gateway: &'a dyn LlmGateway, model: impl Into<String>, temperatures: Temperatures) -> Self {
        Self {
            gateway,
            model: model.into(),
            temperatures,
            telemetry: RefCell::new(Telemetry::default()),
        }
    }

    /// Send `prompt` on behalf of `role` and return the raw completion text.
    pub fn complete(&self, role: Role, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            role,
            model: self.model.clone(),
            prompt: prompt.to_string(),
            temperature: role.temperature(&self.temperatures),
        };
        let started = Instant::now();
        let completion = self
            .gateway
            .complete(&request)
            .with_context(|| format!("{} model call", role.as_str()))?;
        let record = CallRecord {
            role,
            model: request.model,
            temperature: request.temperature,
            prompt_bytes: prompt.len(),
            response_bytes: completion.text.len(),
            eval_tokens: completion.eval_count,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            role = role.as_str(),
            prompt_bytes = record.prompt_bytes,
            response_bytes = record.response_bytes,
            duration_ms = record.duration_ms,
            "model call finished"
        );
        let mut telemetry = self.telemetry.borrow_mut();
        telemetry.total_eval_tokens += completion.eval_count.unwrap_or(0);
        telemetry.calls.push(record);
        Ok(completion.text)
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.borrow().clone()
    }

    pub fn log_summary(&self) {
        let telemetry = self.telemetry.borrow();
        info!(
            calls = telemetry.calls.len(),
            total_eval_tokens = telemetry.total_eval_tokens,
            "model usage"
        );
    }
}
