//! System prompts for the refinement stage.
//!
//! Callers can override the default via
//! [`crate::config::PipelineConfig::refine_prompt`]; the constant here is used
//! only when no override is provided.

/// Default editorial instruction sent as the system turn when refining a
/// machine translation.
pub const DEFAULT_REFINE_PROMPT: &str = r#"I want you to edit the following text while following the rules below:
    - Keep as much of the original content as possible
    - Keep the original meaning and intent of the text
    - Make sure the text is grammatically correct
    - Format the text as a markdown document
    "#;
