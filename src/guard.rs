//! Input length guard and single-input summarization.

use crate::models::{ModelError, ModelHandle};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Largest token count a model input may have.
pub const MAX_INPUT_TOKENS: usize = 1024;

/// Shown in place of a summary when the input is over [`MAX_INPUT_TOKENS`].
pub const TOO_LONG_MESSAGE: &str =
    "Text input is too long. Please shorten the text or upload as PDF.";

/// Result of summarizing one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum SummaryOutcome {
    /// Decoded model output
    Summary(String),
    /// The input was too long and the model was not run
    Rejected,
}

impl SummaryOutcome {
    /// Text to display: the summary or the rejection message
    pub fn text(&self) -> &str {
        match self {
            SummaryOutcome::Summary(text) => text,
            SummaryOutcome::Rejected => TOO_LONG_MESSAGE,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SummaryOutcome::Rejected)
    }
}

impl fmt::Display for SummaryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCheck {
    WithinLimit,
    TooLong { tokens: usize },
}

/// Decide whether an input of `tokens` ids may be passed to the model
pub fn check_length(tokens: usize) -> LengthCheck {
    if tokens > MAX_INPUT_TOKENS {
        LengthCheck::TooLong { tokens }
    } else {
        LengthCheck::WithinLimit
    }
}

/// Summarize `text` with the given model, unless it is too long.
///
/// Inference is not cached; identical calls run the model again.
pub fn summarize(text: &str, handle: &ModelHandle) -> Result<SummaryOutcome, ModelError> {
    let input_ids = handle.tokenizer().encode(text)?;

    if let LengthCheck::TooLong { tokens } = check_length(input_ids.len()) {
        debug!(tokens, limit = MAX_INPUT_TOKENS, "input rejected by length guard");
        return Ok(SummaryOutcome::Rejected);
    }

    debug!(model = %handle.name(), tokens = input_ids.len(), "generating summary");
    let output_ids = handle.model().generate(&input_ids)?;
    let summary = handle.tokenizer().decode(&output_ids)?;

    Ok(SummaryOutcome::Summary(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::scripted_handle;
    use crate::models::ModelName;
    use std::sync::atomic::Ordering;
    use test_case::test_case;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test_case(0 ; "empty input")]
    #[test_case(1 ; "single token")]
    #[test_case(5 ; "short input")]
    #[test_case(1024 ; "exactly at the limit")]
    fn test_within_limit_runs_the_model(tokens: usize) {
        let (handle, calls) = scripted_handle(ModelName::default(), "a summary");

        let outcome = summarize(&words(tokens), &handle).unwrap();

        assert_eq!(outcome, SummaryOutcome::Summary("a summary".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test_case(1025 ; "one over the limit")]
    #[test_case(5000 ; "far over the limit")]
    fn test_over_limit_is_rejected_without_generation(tokens: usize) {
        let (handle, calls) = scripted_handle(ModelName::default(), "a summary");

        let outcome = summarize(&words(tokens), &handle).unwrap();

        assert!(outcome.is_rejected());
        assert_eq!(outcome.to_string(), TOO_LONG_MESSAGE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_repeated_calls_are_not_cached() {
        let (handle, calls) = scripted_handle(ModelName::default(), "again");

        summarize("same input", &handle).unwrap();
        summarize("same input", &handle).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_check_length_boundary() {
        assert_eq!(check_length(MAX_INPUT_TOKENS), LengthCheck::WithinLimit);
        assert_eq!(
            check_length(MAX_INPUT_TOKENS + 1),
            LengthCheck::TooLong { tokens: 1025 }
        );
    }

    #[test]
    fn test_outcome_json_shape() {
        let summary = serde_json::to_value(SummaryOutcome::Summary("ok".into())).unwrap();
        assert_eq!(summary["status"], "summary");
        assert_eq!(summary["text"], "ok");

        let rejected = serde_json::to_value(SummaryOutcome::Rejected).unwrap();
        assert_eq!(rejected["status"], "rejected");
    }
}
