//! The protected instruction block carried by every generation.
//!
//! Each source artifact must contain exactly one region delimited by
//! [`INSTRUCTION_BEGIN`] and [`INSTRUCTION_END`]. The block's interior
//! is the directive for the *next* generation; everything outside it
//! belongs to the generation's own code and is never touched by
//! [`inject_instruction`].

use thiserror::Error;

/// Opening marker line of the instruction block.
pub const INSTRUCTION_BEGIN: &str = "/* instruction:begin */";

/// Closing marker line of the instruction block.
pub const INSTRUCTION_END: &str = "/* instruction:end */";

/// Structural violations of the one-block-per-generation invariant.
///
/// `NotFound` is reportable, not recoverable: fabricating an empty
/// instruction would silently break the lineage contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("no instruction block ({INSTRUCTION_BEGIN} .. {INSTRUCTION_END}) found")]
    NotFound,
    #[error("instruction block opened but never closed")]
    Unterminated,
    #[error("expected exactly one instruction block, found {0}")]
    Multiple(usize),
}

struct Block {
    /// Byte offset just past the begin marker.
    interior_start: usize,
    /// Byte offset of the end marker.
    interior_end: usize,
}

fn locate_block(source: &str) -> Result<Block, InstructionError> {
    let begin = source.find(INSTRUCTION_BEGIN).ok_or(InstructionError::NotFound)?;
    let interior_start = begin + INSTRUCTION_BEGIN.len();
    let rel_end = source[interior_start..]
        .find(INSTRUCTION_END)
        .ok_or(InstructionError::Unterminated)?;
    let interior_end = interior_start + rel_end;

    let blocks = source.matches(INSTRUCTION_BEGIN).count();
    if blocks > 1 {
        return Err(InstructionError::Multiple(blocks));
    }

    Ok(Block {
        interior_start,
        interior_end,
    })
}

/// Extract the instruction text (trimmed interior of the block).
pub fn extract_instruction(source: &str) -> Result<&str, InstructionError> {
    let block = locate_block(source)?;
    Ok(source[block.interior_start..block.interior_end].trim())
}

/// True when `source` carries exactly one well-formed instruction block.
pub fn has_instruction_block(source: &str) -> bool {
    locate_block(source).is_ok()
}

/// Replace the block interior with `new_text`, preserving everything
/// outside the block byte-for-byte.
pub fn inject_instruction(source: &str, new_text: &str) -> Result<String, InstructionError> {
    let block = locate_block(source)?;
    let mut out = String::with_capacity(source.len() + new_text.len());
    out.push_str(&source[..block.interior_start]);
    out.push('\n');
    out.push_str(new_text);
    out.push('\n');
    out.push_str(&source[block.interior_end..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(instruction: &str) -> String {
        format!(
            "console.log(\"alive\")\n\n{INSTRUCTION_BEGIN}\n{instruction}\n{INSTRUCTION_END}\n"
        )
    }

    #[test]
    fn extracts_trimmed_interior() {
        let source = source_with("  add a greeting  ");
        assert_eq!(extract_instruction(&source), Ok("add a greeting"));
    }

    #[test]
    fn missing_block_is_not_found() {
        assert_eq!(
            extract_instruction("console.log(1)\n"),
            Err(InstructionError::NotFound)
        );
    }

    #[test]
    fn unterminated_block_is_distinct_from_not_found() {
        let source = format!("code\n{INSTRUCTION_BEGIN}\ndangling");
        assert_eq!(
            extract_instruction(&source),
            Err(InstructionError::Unterminated)
        );
    }

    #[test]
    fn duplicate_blocks_are_rejected() {
        let source = format!("{}{}", source_with("a"), source_with("b"));
        assert_eq!(
            extract_instruction(&source),
            Err(InstructionError::Multiple(2))
        );
    }

    #[test]
    fn inject_then_extract_returns_new_text_exactly() {
        let source = source_with("old directive");
        let injected = inject_instruction(&source, "add a farewell").expect("inject");
        assert_eq!(extract_instruction(&injected), Ok("add a farewell"));
    }

    #[test]
    fn inject_preserves_surroundings_byte_for_byte() {
        let source = source_with("old");
        let injected = inject_instruction(&source, "new").expect("inject");

        let prefix_end = source.find(INSTRUCTION_BEGIN).expect("begin") + INSTRUCTION_BEGIN.len();
        let suffix_start = source.find(INSTRUCTION_END).expect("end");
        assert!(injected.starts_with(&source[..prefix_end]));
        assert!(injected.ends_with(&source[suffix_start..]));
    }
}
