//! Boundary to the external code-generation providers.
//!
//! Stages talk to a [`ChatProvider`]; a [`ProviderConnector`] builds one per
//! run from the request's provider identifier and credential. The
//! production [`HttpConnector`] speaks the OpenAI-compatible
//! `POST {base_url}/chat/completions` protocol that every supported
//! provider exposes.

use std::collections::HashMap;
use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{GlobalConfig, ProviderOverride};
use crate::models::RunArgs;
use crate::{AppError, Result};

/// Keychain service consulted for provider credentials.
pub const KEYRING_SERVICE: &str = "allpath-runner";

/// Boxed future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Static description of a supported provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Identifier accepted in `args[2]`.
    pub id: &'static str,
    /// OpenAI-compatible API root.
    pub base_url: &'static str,
    /// Model used when neither the request nor the config names one.
    pub default_model: &'static str,
    /// Environment variable holding a fallback credential.
    pub env_var: &'static str,
}

/// Supported providers.
pub const PROVIDERS: [ProviderSpec; 6] = [
    ProviderSpec {
        id: "groq",
        base_url: "https://api.groq.com/openai/v1",
        default_model: "moonshotai/kimi-k2-instruct-0905",
        env_var: "GROQ_API_KEY",
    },
    ProviderSpec {
        id: "openai",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o",
        env_var: "OPENAI_API_KEY",
    },
    ProviderSpec {
        id: "anthropic",
        base_url: "https://api.anthropic.com/v1",
        default_model: "claude-sonnet-4-5",
        env_var: "ANTHROPIC_API_KEY",
    },
    ProviderSpec {
        id: "mistral",
        base_url: "https://api.mistral.ai/v1",
        default_model: "mistral-large-latest",
        env_var: "MISTRAL_API_KEY",
    },
    ProviderSpec {
        id: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        default_model: "openai/gpt-4o",
        env_var: "OPENROUTER_API_KEY",
    },
    ProviderSpec {
        id: "huggingface",
        base_url: "https://router.huggingface.co/v1",
        default_model: "mistralai/Mistral-7B-Instruct-v0.3",
        env_var: "HUGGINGFACE_API_KEY",
    },
];

/// Look up a provider by identifier.
#[must_use]
pub fn provider_spec(id: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.id == id)
}

/// Identifiers of every supported provider.
#[must_use]
pub fn provider_ids() -> Vec<&'static str> {
    PROVIDERS.iter().map(|spec| spec.id).collect()
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

impl ChatMessage {
    /// User turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    /// Assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A single completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Short label for logs.
    pub label: String,
    /// System prompt.
    pub system: String,
    /// Conversation after the system prompt.
    pub messages: Vec<ChatMessage>,
    /// Completion token cap.
    pub max_tokens: u32,
}

/// Something that answers chat completions.
pub trait ChatProvider: Send + Sync {
    /// Return the assistant text for `request`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` on transport, HTTP, or decoding failures.
    fn complete(&self, request: ChatRequest) -> ProviderFuture<'_, String>;
}

/// Builds a [`ChatProvider`] for one run.
pub trait ProviderConnector: Send + Sync {
    /// Resolve provider, model and credential for `args`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidArgs` for an unknown provider or a missing
    /// credential.
    fn connect<'a>(&'a self, args: &'a RunArgs) -> ProviderFuture<'a, Arc<dyn ChatProvider>>;
}

/// Whether a caller-supplied credential should be replaced by a stored one.
#[must_use]
pub fn is_placeholder_credential(credential: &str) -> bool {
    let credential = credential.trim();
    credential.is_empty() || credential.contains("XXXX")
}

/// Production connector backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    overrides: HashMap<String, ProviderOverride>,
}

impl HttpConnector {
    /// Connector honouring the `[providers.*]` overrides in `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &GlobalConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            overrides: config.providers.clone(),
        })
    }
}

impl ProviderConnector for HttpConnector {
    fn connect<'a>(&'a self, args: &'a RunArgs) -> ProviderFuture<'a, Arc<dyn ChatProvider>> {
        Box::pin(async move {
            let spec = provider_spec(&args.provider).ok_or_else(|| {
                AppError::InvalidArgs(format!(
                    "unsupported provider '{}' (supported: {})",
                    args.provider,
                    provider_ids().join(", ")
                ))
            })?;
            let overrides = self.overrides.get(spec.id);

            let base_url = overrides
                .and_then(|o| o.base_url.clone())
                .unwrap_or_else(|| spec.base_url.to_owned());
            let model = args
                .model
                .clone()
                .or_else(|| overrides.and_then(|o| o.model.clone()))
                .unwrap_or_else(|| spec.default_model.to_owned());
            let credential = resolve_credential(&args.credential, spec).await?;

            debug!(provider = spec.id, %model, "provider connected");
            let provider: Arc<dyn ChatProvider> = Arc::new(HttpChatProvider {
                http: self.http.clone(),
                endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
                model,
                credential,
            });
            Ok(provider)
        })
    }
}

/// Caller credential, else OS keychain, else the provider's env var.
async fn resolve_credential(provided: &str, spec: &ProviderSpec) -> Result<String> {
    if !is_placeholder_credential(provided) {
        return Ok(provided.trim().to_owned());
    }

    let account = spec.id;
    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, account).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Provider(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.trim().is_empty() => return Ok(value),
        Ok(_) => debug!(provider = spec.id, "keychain entry is empty, trying env var"),
        Err(err) => debug!(provider = spec.id, ?err, "keychain lookup failed, trying env var"),
    }

    match env::var(spec.env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            warn!(provider = spec.id, "no credential available");
            Err(AppError::InvalidArgs(format!(
                "API key required: pass it as args[1] or set {}",
                spec.env_var
            )))
        }
    }
}

/// OpenAI-compatible chat endpoint.
struct HttpChatProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    credential: String,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatProvider for HttpChatProvider {
    fn complete(&self, request: ChatRequest) -> ProviderFuture<'_, String> {
        Box::pin(async move {
            let mut messages = Vec::with_capacity(request.messages.len() + 1);
            messages.push(ChatMessage {
                role: "system".into(),
                content: request.system,
            });
            messages.extend(request.messages);

            let body = CompletionBody {
                model: &self.model,
                messages,
                max_tokens: request.max_tokens,
                temperature: 0.35,
            };

            let response = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.credential)
                .json(&body)
                .send()
                .await
                .map_err(|err| AppError::Provider(format!("{}: request failed: {err}", request.label)))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                let detail: String = detail.chars().take(300).collect();
                return Err(AppError::Provider(format!(
                    "{}: HTTP {status}: {detail}",
                    request.label
                )));
            }

            let completion: CompletionResponse = response
                .json()
                .await
                .map_err(|err| AppError::Provider(format!("{}: invalid response: {err}", request.label)))?;

            completion
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or_else(|| AppError::Provider(format!("{}: empty completion", request.label)))
        })
    }
}
