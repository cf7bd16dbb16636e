use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::llm_client::{ModelParams, TextGenerator};
use crate::error::GenerationError;

type Responder = Box<dyn Fn(usize, &str) -> Result<String, GenerationError> + Send + Sync>;
type Delay = Box<dyn Fn(&str) -> Duration + Send + Sync>;

/// Deterministic generator for tests: answers each call through a closure
/// and records every prompt it saw.
pub struct ScriptedGenerator {
    respond: Responder,
    delay: Option<Delay>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// `respond` receives the zero-based call number and the prompt.
    pub fn new(
        respond: impl Fn(usize, &str) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with `count` numbered effects, unique per call.
    pub fn numbered(count: usize) -> Self {
        Self::new(move |call, _| {
            Ok((1..=count)
                .map(|i| format!("{i}. Effect {call}-{i}"))
                .collect::<Vec<_>>()
                .join("\n"))
        })
    }

    pub fn with_delay(mut self, delay: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &ModelParams,
    ) -> Result<String, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(prompt)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(call, prompt)
    }
}

pub fn test_params() -> ModelParams {
    ModelParams {
        model: "gemini-2.0-flash".into(),
        temperature: 0.7,
        top_p: 0.95,
        top_k: 40,
    }
}
