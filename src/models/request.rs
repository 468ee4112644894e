//! Inbound skill request and typed run arguments.

use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Positional slot of the task description for `run`-style functions.
pub const ARG_TASK: usize = 0;
/// Positional slot of the provider credential.
pub const ARG_CREDENTIAL: usize = 1;
/// Positional slot of the provider identifier.
pub const ARG_PROVIDER: usize = 2;
/// Optional positional slot of the model name.
pub const ARG_MODEL: usize = 3;

/// Provider used when neither the named field nor the positional slot names one.
pub const DEFAULT_PROVIDER: &str = "groq";

/// One request read from a connection.
///
/// `args` is the positional contract older clients speak. The named fields
/// are optional and take precedence over their positional slot when set.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Request {
    /// Provider package the skill belongs to.
    pub package: String,
    /// Function within the package.
    pub function: String,
    /// Positional, pipeline-specific arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Named task description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Named provider credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Named provider identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Named model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Debug for Request {
    // Arguments may carry credentials and are never printed.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("package", &self.package)
            .field("function", &self.function)
            .field("args", &format_args!("[{} redacted]", self.args.len()))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Build a positional request.
    #[must_use]
    pub fn new(package: impl Into<String>, function: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            package: package.into(),
            function: function.into(),
            args,
            prompt: None,
            credential: None,
            provider: None,
            model: None,
        }
    }

    /// Check the fields the router depends on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Codec` if `package` or `function` is blank.
    pub fn validate(&self) -> Result<()> {
        if self.package.trim().is_empty() {
            return Err(AppError::Codec("request field 'package' must not be empty".into()));
        }
        if self.function.trim().is_empty() {
            return Err(AppError::Codec("request field 'function' must not be empty".into()));
        }
        Ok(())
    }

    /// `package/function` label used in logs and error messages.
    #[must_use]
    pub fn skill_key(&self) -> String {
        format!("{}/{}", self.package, self.function)
    }

    /// Positional argument at `index`, if the caller sent that many.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Resolve the typed arguments of a `run`-style function.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidArgs` if no non-empty task is present.
    pub fn run_args(&self) -> Result<RunArgs> {
        let task = self
            .prompt
            .as_deref()
            .or_else(|| self.arg(ARG_TASK))
            .map(str::trim)
            .filter(|task| !task.is_empty())
            .ok_or_else(|| AppError::InvalidArgs("a task description is required".into()))?;

        let credential = self
            .credential
            .as_deref()
            .or_else(|| self.arg(ARG_CREDENTIAL))
            .unwrap_or_default();

        let provider = self
            .provider
            .as_deref()
            .or_else(|| self.arg(ARG_PROVIDER))
            .map(str::trim)
            .filter(|provider| !provider.is_empty())
            .unwrap_or(DEFAULT_PROVIDER);

        let model = self
            .model
            .as_deref()
            .or_else(|| self.arg(ARG_MODEL))
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_owned);

        Ok(RunArgs {
            task: task.to_owned(),
            credential: credential.to_owned(),
            provider: provider.to_lowercase(),
            model,
        })
    }
}

/// Typed view of the `run` argument contract.
#[derive(Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Task description handed to every stage.
    pub task: String,
    /// Provider credential; empty means "resolve from keychain or env".
    pub credential: String,
    /// Lower-cased provider identifier.
    pub provider: String,
    /// Optional model override.
    pub model: Option<String>,
}

impl Debug for RunArgs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunArgs")
            .field("task", &self.task)
            .field("credential", &"<redacted>")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish()
    }
}
