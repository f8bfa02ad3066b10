//! Input data parsing from JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::schema::validate_input_schema;
use crate::template::render;
use crate::types::DataPoint;
use crate::ConfigError;

/// A prompt template and the data points that fill it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    /// Template with `{field}` placeholders
    pub prompt_template: String,

    /// Data points, in input order
    pub data: Vec<DataPoint>,
}

impl InputData {
    pub fn new(prompt_template: impl Into<String>, data: Vec<DataPoint>) -> Self {
        Self {
            prompt_template: prompt_template.into(),
            data,
        }
    }

    /// Parse input data from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        validate_input_schema(&value).map_err(ConfigError::Schema)?;

        let input: InputData = serde_json::from_value(value)?;
        input.validate()?;
        tracing::debug!(data_points = input.data.len(), "Parsed input data");
        Ok(input)
    }

    /// Parse input data from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_json(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt_template.trim().is_empty() {
            return Err(ConfigError::InvalidInput(
                "'prompt_template' must not be empty".to_string(),
            ));
        }
        if self.data.is_empty() {
            return Err(ConfigError::InvalidInput(
                "'data' must contain at least one data point".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the prompt for every data point.
    ///
    /// The first data point that cannot be rendered aborts with its index.
    pub fn render_prompts(&self) -> Result<Vec<String>, ConfigError> {
        self.data
            .iter()
            .enumerate()
            .map(|(index, dp)| {
                render(&self.prompt_template, dp)
                    .map_err(|source| ConfigError::Template { index, source })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateError;

    const VALID_INPUT: &str = r#"
{
  "prompt_template": "Write a haiku about {topic}.",
  "data": [
    {"topic": "ownership"},
    {"topic": "lifetimes"}
  ]
}
"#;

    #[test]
    fn test_parse_valid_input() {
        let input = InputData::from_json(VALID_INPUT).unwrap();
        assert_eq!(input.data.len(), 2);
        assert_eq!(
            input.render_prompts().unwrap(),
            vec![
                "Write a haiku about ownership.".to_string(),
                "Write a haiku about lifetimes.".to_string()
            ]
        );
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            InputData::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_schema_violation_reported() {
        let result = InputData::from_json(r#"{"prompt_template": "x"}"#);
        assert!(matches!(result, Err(ConfigError::Schema(_))));
    }

    #[test]
    fn test_blank_template_rejected() {
        let result = InputData::from_json(r#"{"prompt_template": "   ", "data": ["a"]}"#);
        assert!(matches!(result, Err(ConfigError::InvalidInput(_))));
    }

    #[test]
    fn test_render_prompts_reports_failing_index() {
        let input = InputData::from_json(
            r#"{"prompt_template": "About {topic}", "data": [{"topic": "a"}, {"other": "b"}]}"#,
        )
        .unwrap();

        match input.render_prompts() {
            Err(ConfigError::Template { index, source }) => {
                assert_eq!(index, 1);
                assert_eq!(source, TemplateError::MissingField("topic".to_string()));
            }
            other => panic!("Expected template error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let result = InputData::from_json_file("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
