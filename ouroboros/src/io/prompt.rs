//! Directive prompt assembly for the model invoker.
//!
//! The request sent across the invoker boundary is the full current
//! source concatenated with its instruction, rendered through a fixed
//! template so the lineage contract (markers, span rules) travels with
//! every generation.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const DIRECTIVE_TEMPLATE: &str = include_str!("prompts/directive.md");

/// Inputs for one directive prompt.
#[derive(Debug, Clone)]
pub struct DirectiveInputs<'a> {
    /// Full current source text.
    pub source: &'a str,
    /// Instruction extracted from the source's block.
    pub instruction: &'a str,
    /// Whether the reply must preserve a protected span.
    pub require_span: bool,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("directive", DIRECTIVE_TEMPLATE)
            .expect("directive template should be valid");
        Self { env }
    }

    fn render(&self, inputs: &DirectiveInputs<'_>) -> Result<String> {
        let template = self.env.get_template("directive")?;
        let rendered = template.render(context! {
            source => inputs.source,
            instruction => inputs.instruction.trim(),
            require_span => inputs.require_span,
        })?;
        Ok(rendered)
    }
}

/// Render the directive prompt for one generation step.
pub fn render_directive(inputs: &DirectiveInputs<'_>) -> Result<String> {
    PromptEngine::new()
        .render(inputs)
        .context("render directive prompt")
}
