//! Convenience re-exports for common `cinch-prefill` types.
//!
//! ```ignore
//! use cinch_prefill::prelude::*;
//! ```

pub use crate::config::TurnConfig;
pub use crate::events::{EventHandler, FnEventHandler, LoggingHandler, NoopHandler, TurnEvent};
pub use crate::prefill::{
    PREFILL_FILENAME, StripOutcome, prefill_enabled, read_prefill, strip_prefill,
    strip_prefill_with_outcome,
};
pub use crate::turn::{TurnContext, TurnOutcome, run_turn};
pub use crate::{ChatBackend, ChatCompletion, ChatRequest, Message, MessageRole, OpenRouterClient};
