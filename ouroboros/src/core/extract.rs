//! Candidate-source extraction from raw model replies.
//!
//! Model output loosely follows a fenced-code convention: sometimes a
//! bare program, sometimes a ```` ```lang ```` block with prose around
//! it. Extraction is best-effort for fences but strict about the
//! lineage contract: a reply that drops the instruction block or a
//! demanded protected span is rejected with a tagged error, never
//! accepted on a guess.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::core::instruction::{self, InstructionError};

/// Opening sentinel of a protected span.
pub const SPAN_BEGIN: &str = "// start";

/// Closing sentinel of a protected span.
pub const SPAN_END: &str = "// end";

/// Ways a model reply can violate the extraction contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("model reply was empty")]
    EmptyReply,
    #[error("reply is missing the required protected span ({SPAN_BEGIN} .. {SPAN_END})")]
    MissingRequiredSpan,
    #[error("candidate source dropped the instruction block: {0}")]
    InstructionMissing(InstructionError),
}

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```[A-Za-z0-9_+-]*[ \t]*\r?\n").expect("fence regex"));
static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```[ \t]*$").expect("fence regex"));

/// True when `text` carries an ordered [`SPAN_BEGIN`] / [`SPAN_END`]
/// sentinel pair.
///
/// Both the side that demands a span (the previous generation) and the
/// side that must satisfy it (the candidate) go through this check, so
/// a source can never demand a span shape the candidate could not
/// legitimately carry.
pub fn contains_protected_span(text: &str) -> bool {
    match (text.find(SPAN_BEGIN), text.find(SPAN_END)) {
        (Some(begin), Some(end)) => begin < end,
        _ => false,
    }
}

/// Isolate the candidate source from `reply`.
///
/// With a fence opener present, the candidate is the fenced interior
/// (leading prose and the closing fence are dropped). Without fences
/// the reply passes through unchanged. When `require_span` is set the
/// candidate must contain an ordered [`SPAN_BEGIN`] / [`SPAN_END`]
/// sentinel pair.
pub fn extract(reply: &str, require_span: bool) -> Result<String, ExtractionError> {
    if reply.trim().is_empty() {
        return Err(ExtractionError::EmptyReply);
    }

    let candidate = strip_fences(reply);

    if require_span && !contains_protected_span(&candidate) {
        return Err(ExtractionError::MissingRequiredSpan);
    }

    Ok(candidate)
}

/// Enforce the lineage invariant on an extracted candidate: the
/// instruction block must survive every rewrite.
pub fn ensure_instruction(candidate: &str) -> Result<(), ExtractionError> {
    match instruction::extract_instruction(candidate) {
        Ok(_) => Ok(()),
        Err(err) => Err(ExtractionError::InstructionMissing(err)),
    }
}

fn strip_fences(reply: &str) -> String {
    let Some(open) = FENCE_OPEN.find(reply) else {
        return reply.to_string();
    };
    let interior = &reply[open.end()..];
    match FENCE_CLOSE.find(interior) {
        Some(close) => interior[..close.start()].to_string(),
        // Tolerate a missing closing fence: everything after the opener.
        None => interior.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instruction::{INSTRUCTION_BEGIN, INSTRUCTION_END};

    #[test]
    fn fenced_reply_yields_interior_without_markers() {
        let reply = "```ts\nconsole.log(1)\n```";
        assert_eq!(extract(reply, false), Ok("console.log(1)\n".to_string()));
    }

    #[test]
    fn unfenced_reply_passes_through_unchanged() {
        let reply = "console.log(1)\n";
        assert_eq!(extract(reply, false), Ok(reply.to_string()));
    }

    #[test]
    fn leading_prose_before_fence_is_dropped() {
        let reply = "Here is the next generation:\n```typescript\nlet x = 1\n```\nEnjoy!";
        assert_eq!(extract(reply, false), Ok("let x = 1\n".to_string()));
    }

    #[test]
    fn missing_closing_fence_is_tolerated() {
        let reply = "```ts\nconsole.log(1)\n";
        assert_eq!(extract(reply, false), Ok("console.log(1)\n".to_string()));
    }

    #[test]
    fn empty_reply_is_rejected() {
        assert_eq!(extract("  \n\t", false), Err(ExtractionError::EmptyReply));
    }

    #[test]
    fn required_span_must_be_present_and_ordered() {
        let with_span = format!("{SPAN_BEGIN}\nkeep me\n{SPAN_END}\n");
        assert!(extract(&with_span, true).is_ok());

        assert_eq!(
            extract("no sentinels here\n", true),
            Err(ExtractionError::MissingRequiredSpan)
        );

        let reversed = format!("{SPAN_END}\noops\n{SPAN_BEGIN}\n");
        assert_eq!(
            extract(&reversed, true),
            Err(ExtractionError::MissingRequiredSpan)
        );
    }

    #[test]
    fn span_detection_requires_both_sentinels_in_order() {
        let ordered = format!("{SPAN_BEGIN}\nkeep\n{SPAN_END}\n");
        assert!(contains_protected_span(&ordered));

        let reversed = format!("{SPAN_END}\noops\n{SPAN_BEGIN}\n");
        assert!(!contains_protected_span(&reversed));

        // An incidental opener with no closer is not a span.
        assert!(!contains_protected_span("// startup code\n"));
        assert!(!contains_protected_span("// end of helpers\n"));
    }

    #[test]
    fn ensure_instruction_flags_stripped_block() {
        let good = format!("code\n{INSTRUCTION_BEGIN}\nnext\n{INSTRUCTION_END}\n");
        assert_eq!(ensure_instruction(&good), Ok(()));

        assert_eq!(
            ensure_instruction("code only\n"),
            Err(ExtractionError::InstructionMissing(
                InstructionError::NotFound
            ))
        );
    }
}
