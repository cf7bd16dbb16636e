use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::engine::cache::ResponseCache;
use crate::engine::llm_client::{GeminiClient, ModelParams, TextGenerator};
use crate::error::GenerationError;

/// Wraps a [`TextGenerator`] with the response cache and bounded-parallel
/// batch execution.
pub struct TextGenerationClient {
    generator: Arc<dyn TextGenerator>,
    params: ModelParams,
    cache: Option<ResponseCache>,
    max_parallel_calls: usize,
}

impl TextGenerationClient {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        params: ModelParams,
        max_parallel_calls: usize,
    ) -> Self {
        Self {
            generator,
            params,
            cache: None,
            max_parallel_calls: max_parallel_calls.max(1),
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Gemini-backed client for a validated config.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        let gemini = GeminiClient::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;

        let client = Self::new(Arc::new(gemini), config.model_params(), config.max_parallel_calls);
        if config.enable_caching {
            Ok(client.with_cache(ResponseCache::new(
                config.cache_dir.clone(),
                Duration::from_secs(config.cache_ttl),
            )))
        } else {
            Ok(client)
        }
    }

    /// One generation with the client's configured parameters.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.generate_with(prompt, &self.params).await
    }

    pub async fn generate_with(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<String, GenerationError> {
        let key = self.cache.as_ref().map(|_| ResponseCache::key(prompt, params));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key).await {
                debug!(cache_key = %key, "cache hit");
                return Ok(hit);
            }
        }

        debug!(model = %params.model, prompt = %prompt, "calling generation service");
        let text = self.generator.generate(prompt, params).await?;
        debug!(response = %text, "generation service replied");

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            cache.put(key, &text).await;
        }

        Ok(text)
    }

    /// Generates every prompt, returning texts in input order. Fails with the
    /// first error in input order.
    pub async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>, GenerationError> {
        self.generate_batch_settled(prompts).await.into_iter().collect()
    }

    /// Like [`generate_batch`](Self::generate_batch) but keeps one result per
    /// prompt.
    ///
    /// Prompts run in chunks of `max_parallel_calls`; a chunk's calls run
    /// concurrently and chunks run one after another.
    #[instrument(skip_all, fields(prompts = prompts.len(), max_parallel = self.max_parallel_calls))]
    pub async fn generate_batch_settled(
        &self,
        prompts: &[String],
    ) -> Vec<Result<String, GenerationError>> {
        let mut results = Vec::with_capacity(prompts.len());

        for (batch, chunk) in prompts.chunks(self.max_parallel_calls).enumerate() {
            info!(batch, size = chunk.len(), "running generation batch");
            let outcomes = join_all(chunk.iter().map(|prompt| self.generate(prompt))).await;
            results.extend(outcomes);
        }

        results
    }
}
