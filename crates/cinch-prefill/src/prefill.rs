//! Workspace prefill loading and response stripping.
//!
//! A workspace may contain a `PREFILL.md` file whose trimmed content is sent
//! to the model as a trailing assistant message. The model continues from
//! that seed, and often echoes it back at the start of its reply. Before the
//! reply is stored in history, [`strip_prefill()`] removes the echoed seed so
//! it never accumulates turn over turn.
//!
//! The file is the only switch: absent or all-whitespace means disabled.
//! It is re-read on every call, so edits take effect on the next turn.

use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Name of the prefill file at the workspace root.
pub const PREFILL_FILENAME: &str = "PREFILL.md";

/// Which matching tier [`strip_prefill_with_outcome()`] used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripOutcome {
    /// No prefill, or an empty response. The response was returned as-is.
    Skipped,
    /// The response started with the prefill byte for byte.
    Exact,
    /// The response matched after whitespace normalization; the tail was
    /// rebuilt from whitespace-split words.
    Normalized,
    /// The model did not reproduce the prefill. The response was returned as-is.
    Unmatched,
}

impl StripOutcome {
    /// Whether any text was removed from the response.
    pub fn stripped(self) -> bool {
        matches!(self, StripOutcome::Exact | StripOutcome::Normalized)
    }
}

impl std::fmt::Display for StripOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StripOutcome::Skipped => write!(f, "skipped"),
            StripOutcome::Exact => write!(f, "exact"),
            StripOutcome::Normalized => write!(f, "normalized"),
            StripOutcome::Unmatched => write!(f, "unmatched"),
        }
    }
}

// ── Reading ────────────────────────────────────────────────────────

/// Read the prefill for `workspace`.
///
/// Returns the trimmed content of `{workspace}/PREFILL.md`, or `None` when
/// the file is missing, empty after trimming, or unreadable. A missing file
/// is the normal "feature off" state and is not logged; any other read
/// failure is logged at warn level. Never fails.
pub async fn read_prefill(workspace: &Path) -> Option<String> {
    let path = workspace.join(PREFILL_FILENAME);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                trace!("{} is empty, prefill disabled", path.display());
                None
            } else {
                debug!(
                    "Loaded prefill from {} ({} chars)",
                    path.display(),
                    trimmed.len()
                );
                Some(trimmed.to_string())
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read prefill file {}: {e}", path.display());
            None
        }
    }
}

/// Whether `workspace` currently has a usable prefill.
pub async fn prefill_enabled(workspace: &Path) -> bool {
    read_prefill(workspace).await.is_some()
}

// ── Stripping ──────────────────────────────────────────────────────

/// Remove an echoed prefill from the start of `response`.
///
/// Tries an exact prefix match first, then a whitespace-tolerant match.
/// When neither applies the response is returned unchanged. See
/// [`strip_prefill_with_outcome()`] for the matching rules.
pub fn strip_prefill(response: &str, prefill: Option<&str>) -> String {
    strip_prefill_with_outcome(response, prefill).0
}

/// Like [`strip_prefill()`], but also reports which tier matched.
///
/// 1. No prefill or empty response: returned unchanged ([`StripOutcome::Skipped`]).
/// 2. `response` starts with `prefill`: the remainder, leading whitespace
///    removed ([`StripOutcome::Exact`]).
/// 3. With whitespace runs collapsed and both ends trimmed, `response`
///    starts with `prefill`: the response words after the prefill's word
///    count, joined with single spaces ([`StripOutcome::Normalized`]). Only
///    applies when the response has strictly more words than the prefill.
/// 4. Otherwise returned unchanged ([`StripOutcome::Unmatched`]).
///
/// Matching is case-sensitive. Tier 3 collapses whitespace inside the
/// retained tail, so its output is not a byte slice of the response.
pub fn strip_prefill_with_outcome(
    response: &str,
    prefill: Option<&str>,
) -> (String, StripOutcome) {
    let Some(prefill) = prefill else {
        return (response.to_string(), StripOutcome::Skipped);
    };
    if response.is_empty() {
        return (String::new(), StripOutcome::Skipped);
    }

    if let Some(rest) = response.strip_prefix(prefill) {
        return (rest.trim_start().to_string(), StripOutcome::Exact);
    }

    let normalized_prefill = normalize_whitespace(prefill);
    let normalized_response = normalize_whitespace(response);
    if normalized_response.starts_with(&normalized_prefill) {
        let prefill_words = prefill.split_whitespace().count();
        let response_words: Vec<&str> = response.split_whitespace().collect();
        if response_words.len() > prefill_words {
            let tail = response_words[prefill_words..].join(" ");
            return (tail.trim_start().to_string(), StripOutcome::Normalized);
        }
    }

    (response.to_string(), StripOutcome::Unmatched)
}

/// Collapse every whitespace run to a single space and trim both ends.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
