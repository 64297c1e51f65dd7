//! Per-turn model settings.
//!
//! [`TurnConfig`] names the workspace a turn reads its prefill from and the
//! sampling settings for the model call. There is no enable flag: a turn
//! uses a prefill exactly when the workspace's `PREFILL.md` has content.
//!
//! # Examples
//!
//! ```ignore
//! let config = TurnConfig::new("./agent-workspace")
//!     .with_model("anthropic/claude-sonnet-4")
//!     .with_max_tokens(4096)
//!     .with_temperature(0.3);
//! ```

use crate::{ChatRequest, DEFAULT_MODEL, Message};
use std::path::PathBuf;

/// Configuration for a single agent turn.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Workspace root holding the optional `PREFILL.md`. Default: `"."`.
    pub workspace: PathBuf,
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// Maximum tokens in the reply. Default: `1024`.
    pub max_tokens: u32,
    /// Sampling temperature. Default: `0.7`.
    pub temperature: f32,
    /// Stop sequences. Default: none.
    pub stop: Vec<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            stop: Vec::new(),
        }
    }
}

impl TurnConfig {
    /// Defaults for everything except the workspace.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    /// Build the request body for `messages` using these settings.
    pub fn build_request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: Some(self.model.clone()),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stop: if self.stop.is_empty() {
                None
            } else {
                Some(self.stop.clone())
            },
        }
    }
}
