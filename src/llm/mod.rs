//! Text generator capability and its rig-core implementation.
//!
//! The core only needs "prompt in, text out, may fail": that contract is
//! [`TextGenerator`], which the validation-repair engine and the handlers
//! are written against. Production uses [`ClaudeGenerator`] over rig-core's
//! Anthropic provider; tests script the trait directly.

use crate::error::{Error, Result};
use crate::telemetry::genai::start_chat_span;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

/// The external generator capability. Implementations may block on network
/// I/O; failures surface as [`Error::Transport`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, system: &str, user: &str, temperature: f64) -> Result<String>;
}

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> Result<rig::providers::anthropic::Client> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
        .map_err(|e| Error::Config(format!("failed to create Anthropic client: {e}")))
}

/// rig-core-backed generator. One agent is built per call so the caller's
/// temperature and system prompt apply per request.
pub struct ClaudeGenerator {
    client: rig::providers::anthropic::Client,
    model: String,
}

impl ClaudeGenerator {
    pub fn new(api_key: &SecretString, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: anthropic_client(api_key)?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for ClaudeGenerator {
    async fn generate_text(&self, system: &str, user: &str, temperature: f64) -> Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(system)
            .temperature(temperature)
            .max_tokens(4096)
            .build();

        let span = start_chat_span(&self.model, "anthropic");
        let user = user.to_string();
        async move { agent.prompt(user).await }
            .instrument(span)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}
