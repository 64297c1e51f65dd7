//! Events emitted by [`run_turn()`](crate::turn::run_turn).
//!
//! The turn pipeline reports what it did with the prefill through
//! [`TurnEvent`] variants. Callers implement [`EventHandler`] to observe them.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget turns |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |

use crate::UsageInfo;
use crate::prefill::StripOutcome;
use std::path::Path;
use tracing::{debug, info};

/// Events emitted during a turn, in order.
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// The workspace prefill was read for this turn.
    PrefillLoaded {
        workspace: &'a Path,
        prefill: Option<&'a str>,
    },
    /// The prefill was appended to the outgoing messages as an assistant turn.
    PrefillInjected {
        prefill: &'a str,
        message_count: usize,
    },
    /// The model replied.
    ResponseReceived {
        content: &'a str,
        usage: Option<&'a UsageInfo>,
        /// Why the model stopped (`"stop"`, `"length"`, ...), when reported.
        finish_reason: Option<&'a str>,
    },
    /// The reply was stripped and is about to be stored.
    ResponseStripped {
        outcome: StripOutcome,
        raw_len: usize,
        stored_len: usize,
    },
}

/// Observer for [`TurnEvent`]s.
///
/// # Example
///
/// ```ignore
/// struct MyHandler;
///
/// impl EventHandler for MyHandler {
///     fn on_event(&self, event: &TurnEvent<'_>) {
///         if let TurnEvent::ResponseStripped { outcome, .. } = event {
///             println!("prefill match: {outcome}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &TurnEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&TurnEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &TurnEvent<'_>) {
        (self.0)(event)
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        match event {
            TurnEvent::PrefillLoaded { workspace, prefill } => match prefill {
                Some(p) => info!(
                    "Prefill active for {} ({} chars)",
                    workspace.display(),
                    p.len()
                ),
                None => debug!("No prefill for {}", workspace.display()),
            },
            TurnEvent::PrefillInjected {
                prefill,
                message_count,
            } => {
                let preview: String = prefill.chars().take(80).collect();
                debug!(
                    "Injected prefill as message {message_count}: {preview}{}",
                    if prefill.chars().count() > 80 { "..." } else { "" }
                );
            }
            TurnEvent::ResponseReceived {
                content,
                usage,
                finish_reason,
            } => {
                debug!(
                    "LLM reply: {} bytes, finish_reason={}",
                    content.len(),
                    finish_reason.unwrap_or("(none)")
                );
                if let Some(u) = usage {
                    debug!(
                        "Token usage: prompt={}, completion={}",
                        u.prompt_tokens.unwrap_or(0),
                        u.completion_tokens.unwrap_or(0),
                    );
                }
            }
            TurnEvent::ResponseStripped {
                outcome,
                raw_len,
                stored_len,
            } => {
                if outcome.stripped() {
                    debug!("Stripped prefill ({outcome}): {raw_len} -> {stored_len} bytes");
                } else {
                    debug!("Reply stored as-is ({outcome})");
                }
            }
        }
    }
}
