//! One agent turn with ephemeral prefill.
//!
//! A [`TurnContext`] holds the prefill read for the current turn and is the
//! only place that value lives. It is created before the model call, used to
//! [`inject`](TurnContext::inject) the synthetic assistant message into the
//! outgoing request, then used again to [`finish`](TurnContext::finish) the
//! reply. The same text is used for both steps, and it is dropped with the
//! context at the end of the turn.
//!
//! [`run_turn()`] wires those steps around a [`ChatBackend`] call:
//!
//! ```text
//! read PREFILL.md ─► history + [assistant: prefill] ─► model
//!                                                        │
//! history.push(assistant: stripped) ◄─ strip prefill ◄───┘
//! ```
//!
//! The injected message is only ever part of the request. History receives
//! the stripped reply and nothing else.

use crate::config::TurnConfig;
use crate::events::{EventHandler, TurnEvent};
use crate::prefill::{StripOutcome, read_prefill, strip_prefill_with_outcome};
use crate::{ChatBackend, Message, UsageInfo};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-turn prefill state.
#[derive(Debug, Clone)]
pub struct TurnContext {
    workspace: PathBuf,
    prefill: Option<String>,
}

impl TurnContext {
    /// Read the workspace prefill for a new turn.
    pub async fn load(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let prefill = read_prefill(&workspace).await;
        Self { workspace, prefill }
    }

    /// Build a context from an already-known prefill.
    ///
    /// The prefill is trimmed; an empty result disables it, matching what
    /// [`load`](Self::load) would produce for the same file content.
    pub fn with_prefill(workspace: impl Into<PathBuf>, prefill: Option<String>) -> Self {
        let prefill = prefill
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Self {
            workspace: workspace.into(),
            prefill,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn prefill(&self) -> Option<&str> {
        self.prefill.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.prefill.is_some()
    }

    /// Append the prefill to `messages` as a trailing assistant message.
    ///
    /// Returns `true` when a message was added.
    pub fn inject(&self, messages: &mut Vec<Message>) -> bool {
        match &self.prefill {
            Some(prefill) => {
                messages.push(Message::assistant_text(prefill.as_str()));
                true
            }
            None => false,
        }
    }

    /// Strip this turn's prefill from the model reply.
    pub fn finish(&self, response: &str) -> (String, StripOutcome) {
        strip_prefill_with_outcome(response, self.prefill())
    }
}

/// Result of [`run_turn()`].
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Reply text exactly as the model returned it.
    pub raw: String,
    /// Reply text appended to history (prefill removed).
    pub stored: String,
    /// Which strip tier applied.
    pub strip: StripOutcome,
    /// Prefill used for this turn, if any.
    pub prefill: Option<String>,
    /// Token usage reported by the API.
    pub usage: Option<UsageInfo>,
}

/// Run one turn: inject the workspace prefill, call the model, strip the
/// reply, and append it to `history`.
///
/// `history` is only modified on success, and only by pushing the stripped
/// assistant reply. Model call errors are returned unchanged; prefill
/// problems never fail the turn.
///
/// A completion without content (for example an API response with no
/// choices) counts as an empty reply, and an empty assistant message is
/// stored. Some providers reject empty assistant messages in later requests,
/// so callers that care should check `outcome.raw` before continuing.
pub async fn run_turn<B>(
    backend: &B,
    config: &TurnConfig,
    history: &mut Vec<Message>,
    handler: &dyn EventHandler,
) -> Result<TurnOutcome, String>
where
    B: ChatBackend + ?Sized,
{
    let ctx = TurnContext::load(&config.workspace).await;
    handler.on_event(&TurnEvent::PrefillLoaded {
        workspace: ctx.workspace(),
        prefill: ctx.prefill(),
    });

    let mut outgoing = history.clone();
    if ctx.inject(&mut outgoing)
        && let Some(prefill) = ctx.prefill()
    {
        handler.on_event(&TurnEvent::PrefillInjected {
            prefill,
            message_count: outgoing.len(),
        });
    }

    let request = config.build_request(outgoing);
    let completion = backend.complete(&request).await?;

    let raw = match completion.content {
        Some(content) => content,
        None => {
            debug!("LLM returned no content, storing an empty reply");
            String::new()
        }
    };
    handler.on_event(&TurnEvent::ResponseReceived {
        content: &raw,
        usage: completion.usage.as_ref(),
        finish_reason: completion.finish_reason.as_deref(),
    });

    let (stored, strip) = ctx.finish(&raw);
    handler.on_event(&TurnEvent::ResponseStripped {
        outcome: strip,
        raw_len: raw.len(),
        stored_len: stored.len(),
    });

    history.push(Message::assistant_text(stored.as_str()));

    Ok(TurnOutcome {
        raw,
        stored,
        strip,
        prefill: ctx.prefill,
        usage: completion.usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FnEventHandler, NoopHandler};
    use crate::prefill::PREFILL_FILENAME;
    use crate::{ChatCompletion, ChatFuture, ChatRequest, MessageRole};
    use std::fs;
    use std::sync::Mutex;

    /// Replies with a fixed result and records every request.
    struct ScriptedBackend {
        reply: Result<ChatCompletion, String>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn replying(text: &str) -> Self {
            Self::completing(ChatCompletion::text(text))
        }

        fn completing(completion: ChatCompletion) -> Self {
            Self {
                reply: Ok(completion),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: &str) -> Self {
            Self {
                reply: Err(err.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> ChatRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    fn workspace_with(prefill: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        if let Some(p) = prefill {
            fs::write(dir.path().join(PREFILL_FILENAME), p).unwrap();
        }
        dir
    }

    // ── TurnContext ────────────────────────────────────────────────

    #[tokio::test]
    async fn load_reads_workspace_prefill() {
        let dir = workspace_with(Some("  Sure, here goes:\n"));
        let ctx = TurnContext::load(dir.path()).await;
        assert_eq!(ctx.prefill(), Some("Sure, here goes:"));
        assert!(ctx.is_enabled());
        assert_eq!(ctx.workspace(), dir.path());
    }

    #[tokio::test]
    async fn load_without_file_is_disabled() {
        let dir = workspace_with(None);
        let ctx = TurnContext::load(dir.path()).await;
        assert!(!ctx.is_enabled());
    }

    #[test]
    fn with_prefill_normalizes_blank_to_none() {
        assert!(!TurnContext::with_prefill("/ws", Some("   \n".into())).is_enabled());
        assert!(!TurnContext::with_prefill("/ws", None).is_enabled());
        let ctx = TurnContext::with_prefill("/ws", Some(" Seed ".into()));
        assert_eq!(ctx.prefill(), Some("Seed"));
    }

    #[test]
    fn inject_appends_trailing_assistant_message() {
        let ctx = TurnContext::with_prefill("/ws", Some("Seed".into()));
        let mut messages = vec![Message::user("hi")];
        assert!(ctx.inject(&mut messages));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], Message::assistant_text("Seed"));
    }

    #[test]
    fn inject_without_prefill_is_noop() {
        let ctx = TurnContext::with_prefill("/ws", None);
        let mut messages = vec![Message::user("hi")];
        assert!(!ctx.inject(&mut messages));
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn finish_uses_the_injected_prefill() {
        let ctx = TurnContext::with_prefill("/ws", Some("Seed".into()));
        assert_eq!(
            ctx.finish("Seed and more"),
            ("and more".to_string(), StripOutcome::Exact)
        );
        let ctx = TurnContext::with_prefill("/ws", None);
        assert_eq!(
            ctx.finish("Seed and more"),
            ("Seed and more".to_string(), StripOutcome::Skipped)
        );
    }

    // ── run_turn ───────────────────────────────────────────────────

    #[tokio::test]
    async fn run_turn_injects_and_strips() {
        let dir = workspace_with(Some("I'll help you with that.\n"));
        let backend =
            ScriptedBackend::replying("I'll help you with that. Here's the solution: ...");
        let config = TurnConfig::new(dir.path());
        let mut history = vec![Message::system("sys"), Message::user("help")];

        let outcome = run_turn(&backend, &config, &mut history, &NoopHandler)
            .await
            .unwrap();

        let sent = backend.last_request();
        assert_eq!(sent.messages.len(), 3);
        let last = sent.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.text(), "I'll help you with that.");

        assert_eq!(outcome.stored, "Here's the solution: ...");
        assert_eq!(outcome.strip, StripOutcome::Exact);
        assert_eq!(outcome.prefill.as_deref(), Some("I'll help you with that."));

        // Only the stripped reply lands in history; the synthetic message does not.
        assert_eq!(history.len(), 3);
        assert_eq!(history[2], Message::assistant_text("Here's the solution: ..."));
        assert!(
            !history
                .iter()
                .any(|m| m.text() == "I'll help you with that.")
        );
    }

    #[tokio::test]
    async fn run_turn_without_prefill_sends_history_unchanged() {
        let dir = workspace_with(None);
        let backend = ScriptedBackend::replying("Plain answer");
        let config = TurnConfig::new(dir.path());
        let mut history = vec![Message::user("q")];

        let outcome = run_turn(&backend, &config, &mut history, &NoopHandler)
            .await
            .unwrap();

        assert_eq!(backend.last_request().messages, vec![Message::user("q")]);
        assert_eq!(outcome.strip, StripOutcome::Skipped);
        assert_eq!(outcome.stored, "Plain answer");
        assert_eq!(history.last().unwrap().text(), "Plain answer");
    }

    #[tokio::test]
    async fn run_turn_keeps_reply_when_model_ignores_prefill() {
        let dir = workspace_with(Some("Different text"));
        let backend = ScriptedBackend::replying("Original response");
        let config = TurnConfig::new(dir.path());
        let mut history = vec![Message::user("q")];

        let outcome = run_turn(&backend, &config, &mut history, &NoopHandler)
            .await
            .unwrap();

        assert_eq!(outcome.strip, StripOutcome::Unmatched);
        assert_eq!(outcome.stored, "Original response");
        assert_eq!(outcome.raw, "Original response");
    }

    #[tokio::test]
    async fn run_turn_error_leaves_history_untouched() {
        let dir = workspace_with(Some("Seed"));
        let backend = ScriptedBackend::failing("OpenRouter API HTTP 500: boom");
        let config = TurnConfig::new(dir.path());
        let mut history = vec![Message::user("q")];

        let err = run_turn(&backend, &config, &mut history, &NoopHandler)
            .await
            .unwrap_err();

        assert!(err.contains("HTTP 500"));
        assert_eq!(history, vec![Message::user("q")]);
    }

    #[tokio::test]
    async fn run_turn_rereads_prefill_each_turn() {
        let dir = workspace_with(Some("One"));
        let backend = ScriptedBackend::replying("Two three");
        let config = TurnConfig::new(dir.path());
        let mut history = vec![Message::user("q")];

        run_turn(&backend, &config, &mut history, &NoopHandler)
            .await
            .unwrap();
        assert_eq!(backend.last_request().messages.last().unwrap().text(), "One");

        fs::write(dir.path().join(PREFILL_FILENAME), "Two").unwrap();
        history.push(Message::user("again"));
        let outcome = run_turn(&backend, &config, &mut history, &NoopHandler)
            .await
            .unwrap();
        assert_eq!(backend.last_request().messages.last().unwrap().text(), "Two");
        assert_eq!(outcome.stored, "three");
    }

    #[tokio::test]
    async fn run_turn_without_content_stores_empty_reply() {
        let dir = workspace_with(Some("Seed"));
        let backend = ScriptedBackend::completing(ChatCompletion::default());
        let config = TurnConfig::new(dir.path());
        let mut history = vec![Message::user("q")];

        let outcome = run_turn(&backend, &config, &mut history, &NoopHandler)
            .await
            .unwrap();

        assert_eq!(outcome.raw, "");
        assert_eq!(outcome.stored, "");
        assert_eq!(outcome.strip, StripOutcome::Skipped);
        assert_eq!(
            history,
            vec![Message::user("q"), Message::assistant_text("")]
        );
    }

    #[tokio::test]
    async fn run_turn_reports_finish_reason() {
        let dir = workspace_with(None);
        let backend = ScriptedBackend::completing(ChatCompletion {
            content: Some("Cut off mid".into()),
            usage: None,
            finish_reason: Some("length".into()),
        });
        let config = TurnConfig::new(dir.path());
        let mut history = vec![Message::user("q")];

        let seen = Mutex::new(Vec::new());
        let handler = FnEventHandler::new(|event: &TurnEvent<'_>| {
            if let TurnEvent::ResponseReceived { finish_reason, .. } = event {
                seen.lock().unwrap().push(finish_reason.map(str::to_string));
            }
        });

        run_turn(&backend, &config, &mut history, &handler)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some("length".to_string())]);
    }
}
