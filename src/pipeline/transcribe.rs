//! Vision OCR: send one page image plus the prompt, get Markdown back.
//!
//! [`PageTranscriber`] is the seam between the pipeline and the model. The
//! production implementation, [`GeminiTranscriber`], drives Gemini through
//! `edgequake-llm`; tests plug in scripted stubs so the dispatcher and the
//! document stage can be exercised without network access.
//!
//! A transcriber makes exactly one request per page. There is no retry and
//! no timeout: a failed call becomes that page's error placeholder upstream.

use crate::config::api_key_from_env;
use crate::error::{HandwriteError, TranscribeError};
use crate::pipeline::encode::encode_page;
use crate::pipeline::extract::Page;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, GeminiProvider, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Low temperature keeps the model transcribing rather than paraphrasing.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Output budget for one page of dense notes.
pub const DEFAULT_MAX_TOKENS: usize = 8192;

/// Turns one page image into Markdown text.
///
/// Implementations are shared across concurrently running page tasks, so
/// they must be `Send + Sync` and hold no per-call mutable state.
#[async_trait]
pub trait PageTranscriber: Send + Sync {
    /// Model identifier, recorded in the rendered document's context.
    fn model(&self) -> &str;

    /// Transcribe `page` with `prompt`.
    ///
    /// Returns the model's text verbatim, blank or not (cleanup happens
    /// later), or a [`TranscribeError`] when the call itself failed.
    async fn transcribe(&self, page: &Page, prompt: &str) -> Result<String, TranscribeError>;
}

/// Gemini-backed transcriber.
pub struct GeminiTranscriber {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl GeminiTranscriber {
    /// Build a transcriber for `model` using the key in `GEMINI_API_KEY`.
    ///
    /// A `.env` file in the working directory is consulted first.
    ///
    /// # Errors
    /// [`HandwriteError::MissingApiKey`] when no key is set or it is blank.
    pub fn from_env(model: &str) -> Result<Self, HandwriteError> {
        let api_key = api_key_from_env()?;
        Ok(Self::with_api_key(api_key, model))
    }

    /// Build a transcriber for `model` that authenticates with `api_key`.
    pub fn with_api_key(api_key: impl Into<String>, model: &str) -> Self {
        let provider = GeminiProvider::new(api_key).with_model(model);
        Self::from_provider(Arc::new(provider), model)
    }

    /// Wrap an already constructed provider.
    pub fn from_provider(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl PageTranscriber for GeminiTranscriber {
    fn model(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, page: &Page, prompt: &str) -> Result<String, TranscribeError> {
        let start = Instant::now();
        let image = encode_page(&page.image)?;
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        let options = build_options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TranscribeError::Provider(format!("{e}")))?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page.index + 1,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(response.content)
    }
}

fn build_options() -> CompletionOptions {
    CompletionOptions {
        temperature: Some(DEFAULT_TEMPERATURE),
        max_tokens: Some(DEFAULT_MAX_TOKENS),
        ..Default::default()
    }
}
