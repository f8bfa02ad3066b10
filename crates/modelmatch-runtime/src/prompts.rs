//! Prompt used to ask a reasoning model for scores.
//!
//! The template is filled per data point with:
//! - `{original_prompt}`: the rendered prompt every backend received
//! - `{data_point}`: the data point itself
//! - `{outputs_section}`: the anonymized outputs, one labeled block each
//! - `{json_format_example}`: the reply shape the parser expects
//!
//! Only `{outputs_section}` is mandatory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use modelmatch_core::template::{placeholders, render_fields, TemplateError};
use modelmatch_core::ConfigError;

pub const ORIGINAL_PROMPT: &str = "original_prompt";
pub const DATA_POINT: &str = "data_point";
pub const OUTPUTS_SECTION: &str = "outputs_section";
pub const JSON_FORMAT_EXAMPLE_FIELD: &str = "json_format_example";

const KNOWN_PLACEHOLDERS: &[&str] = &[
    ORIGINAL_PROMPT,
    DATA_POINT,
    OUTPUTS_SECTION,
    JSON_FORMAT_EXAMPLE_FIELD,
];

/// Reply shape shown to the reasoning model.
pub const JSON_FORMAT_EXAMPLE: &str = r#"{
  "scores": {
    "Output A": { "score": <integer 1-10>, "reasoning": "<one or two sentences>" },
    "Output B": { "score": <integer 1-10>, "reasoning": "<one or two sentences>" }
  }
}"#;

/// Built-in reasoning prompt.
pub const DEFAULT_REASONING_PROMPT: &str = r#"You are an impartial judge comparing answers written by different language models for the same task.

## Task given to every model
{original_prompt}

## Input data for this task
{data_point}

## Answers to evaluate
The answers are anonymized and listed in no particular order.

{outputs_section}

## Instructions
Score every answer from 1 (unusable) to 10 (excellent) on how well it completes the task:
correctness, completeness, relevance to the input data, and clarity.
Judge each answer on its own merits; do not reward length.
Use 0 only for an answer you cannot judge at all.

Reply with a single JSON object and nothing else, in exactly this shape,
with one entry per answer label above:

{json_format_example}
"#;

/// A validated reasoning prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningPrompt {
    template: String,
}

impl ReasoningPrompt {
    /// Validate a custom template.
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(ConfigError::ReasoningTemplate("template is empty".to_string()));
        }

        let names = placeholders(&template);
        if let Some(unknown) = names
            .iter()
            .find(|n| !KNOWN_PLACEHOLDERS.contains(&n.as_str()))
        {
            return Err(ConfigError::ReasoningTemplate(format!(
                "unknown placeholder '{{{}}}'; recognized: {}",
                unknown,
                KNOWN_PLACEHOLDERS
                    .iter()
                    .map(|p| format!("{{{}}}", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if !names.iter().any(|n| n == OUTPUTS_SECTION) {
            return Err(ConfigError::ReasoningTemplate(format!(
                "template must contain the '{{{}}}' placeholder",
                OUTPUTS_SECTION
            )));
        }

        Ok(Self { template })
    }

    /// Load and validate a template file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let template = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(template)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Fill the template for one data point.
    ///
    /// `outputs` pairs each anonymized label with its text, in display order.
    pub fn render(
        &self,
        original_prompt: &str,
        data_point: &str,
        outputs: &[(String, &str)],
    ) -> Result<String, TemplateError> {
        let mut fields = BTreeMap::new();
        fields.insert(ORIGINAL_PROMPT, original_prompt.to_string());
        fields.insert(DATA_POINT, data_point.to_string());
        fields.insert(OUTPUTS_SECTION, outputs_section(outputs));
        fields.insert(JSON_FORMAT_EXAMPLE_FIELD, JSON_FORMAT_EXAMPLE.to_string());
        render_fields(&self.template, &fields)
    }
}

impl Default for ReasoningPrompt {
    fn default() -> Self {
        Self {
            template: DEFAULT_REASONING_PROMPT.to_string(),
        }
    }
}

fn outputs_section(outputs: &[(String, &str)]) -> String {
    outputs
        .iter()
        .map(|(label, text)| format!("--- {} ---\n{}", label, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_is_valid() {
        let default = ReasoningPrompt::default();
        assert_eq!(
            ReasoningPrompt::new(DEFAULT_REASONING_PROMPT).unwrap(),
            default
        );
    }

    #[test]
    fn test_render_fills_all_sections() {
        let prompt = ReasoningPrompt::default()
            .render(
                "Summarize the text.",
                "Rust is fast.",
                &[
                    ("Output A".to_string(), "Fast language."),
                    ("Output B".to_string(), " Rust: speedy. "),
                ],
            )
            .unwrap();

        assert!(prompt.contains("Summarize the text."));
        assert!(prompt.contains("Rust is fast."));
        assert!(prompt.contains("--- Output A ---\nFast language.\n\n--- Output B ---\nRust: speedy."));
        assert!(prompt.contains("\"scores\""));
        assert!(!prompt.contains("{outputs_section}"));
    }

    #[test]
    fn test_template_requires_outputs_section() {
        let result = ReasoningPrompt::new("Judge {original_prompt}");
        assert!(matches!(result, Err(ConfigError::ReasoningTemplate(msg)) if msg.contains("outputs_section")));
    }

    #[test]
    fn test_template_rejects_unknown_placeholder() {
        let result = ReasoningPrompt::new("{outputs_section} {model_names}");
        assert!(matches!(result, Err(ConfigError::ReasoningTemplate(msg)) if msg.contains("model_names")));
    }

    #[test]
    fn test_minimal_template() {
        let prompt = ReasoningPrompt::new("Rate these as JSON {{\"scores\": ...}}:\n{outputs_section}")
            .unwrap()
            .render("p", "d", &[("Output A".to_string(), "x")])
            .unwrap();
        assert_eq!(prompt, "Rate these as JSON {\"scores\": ...}:\n--- Output A ---\nx");
    }

    #[test]
    fn test_missing_template_file() {
        assert!(matches!(
            ReasoningPrompt::from_file("/no/such/prompt.txt"),
            Err(ConfigError::Io { .. })
        ));
    }
}
