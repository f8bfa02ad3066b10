//! Prompt template rendering.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces.
//! A brace that does not form a placeholder is copied through unchanged.
//!
//! Rendering is pure: the same template and data point always produce the
//! same prompt.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::DataPoint;

/// Placeholder a plain-string data point is substituted into.
pub const DATA_PLACEHOLDER: &str = "data";

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Errors from filling a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template references field '{0}' which the data point does not provide")]
    MissingField(String),

    #[error("data point is a plain string but the template has no '{{data}}' placeholder")]
    NoDataPlaceholder,

    #[error("placeholder '{{{0}}}' cannot be filled from a plain string data point")]
    UnexpectedPlaceholder(String),
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        if let Some(name) = caps.get(1) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// Fill a template with a data point.
///
/// Field-mapping data points fill placeholders by name; every referenced
/// field must exist. A plain string fills `{data}`, which the template must
/// contain.
pub fn render(template: &str, data_point: &DataPoint) -> Result<String, TemplateError> {
    match data_point {
        DataPoint::Text(text) => {
            let names = placeholders(template);
            if let Some(other) = names.iter().find(|n| n.as_str() != DATA_PLACEHOLDER) {
                return Err(TemplateError::UnexpectedPlaceholder(other.clone()));
            }
            if names.is_empty() {
                return Err(TemplateError::NoDataPlaceholder);
            }
            render_with(template, |_| Some(text.clone()))
        }
        DataPoint::Fields(fields) => {
            render_with(template, |name| fields.get(name).map(value_to_text))
        }
    }
}

/// Fill a template from a name-to-text map.
pub fn render_fields(
    template: &str,
    fields: &BTreeMap<&str, String>,
) -> Result<String, TemplateError> {
    render_with(template, |name| fields.get(name).cloned())
}

fn render_with<F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        rendered.push_str(&template[last..whole.start()]);

        match caps.get(1) {
            Some(name) => {
                let value = lookup(name.as_str())
                    .ok_or_else(|| TemplateError::MissingField(name.as_str().to_string()))?;
                rendered.push_str(&value);
            }
            None => rendered.push_str(&whole.as_str()[..1]),
        }

        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> DataPoint {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_render_fields_by_name() {
        let dp = fields(json!({"topic": "ownership", "audience": "beginners"}));
        let prompt = render("Explain {topic} to {audience}.", &dp).unwrap();
        assert_eq!(prompt, "Explain ownership to beginners.");
    }

    #[test]
    fn test_render_non_string_field_values() {
        let dp = fields(json!({"n": 3, "flag": true}));
        assert_eq!(render("{n} items, {flag}", &dp).unwrap(), "3 items, true");
    }

    #[test]
    fn test_render_missing_field_fails() {
        let dp = fields(json!({"topic": "ownership"}));
        assert_eq!(
            render("Explain {topic} to {audience}.", &dp),
            Err(TemplateError::MissingField("audience".to_string()))
        );
    }

    #[test]
    fn test_render_extra_fields_are_ignored() {
        let dp = fields(json!({"topic": "traits", "unused": "x"}));
        assert_eq!(render("About {topic}", &dp).unwrap(), "About traits");
    }

    #[test]
    fn test_render_string_data_point() {
        let dp = DataPoint::from("the borrow checker");
        assert_eq!(
            render("Summarize: {data}", &dp).unwrap(),
            "Summarize: the borrow checker"
        );
    }

    #[test]
    fn test_render_string_without_data_placeholder_fails() {
        let dp = DataPoint::from("x");
        assert_eq!(
            render("No placeholder here", &dp),
            Err(TemplateError::NoDataPlaceholder)
        );
    }

    #[test]
    fn test_render_string_with_named_placeholder_fails() {
        let dp = DataPoint::from("x");
        assert_eq!(
            render("{data} and {topic}", &dp),
            Err(TemplateError::UnexpectedPlaceholder("topic".to_string()))
        );
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let dp = fields(json!({"name": "serde"}));
        assert_eq!(
            render("Return {{\"crate\": \"{name}\"}}", &dp).unwrap(),
            "Return {\"crate\": \"serde\"}"
        );
    }

    #[test]
    fn test_lone_braces_pass_through() {
        let dp = fields(json!({"x": "1"}));
        assert_eq!(render("{ not a placeholder } {x}", &dp).unwrap(), "{ not a placeholder } 1");
    }

    #[test]
    fn test_placeholders_deduplicated_in_order() {
        assert_eq!(
            placeholders("{b} {a} {b} {{c}}"),
            vec!["b".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_render_fields_map() {
        let mut map = BTreeMap::new();
        map.insert("original_prompt", "P".to_string());
        map.insert("outputs_section", "O".to_string());
        assert_eq!(
            render_fields("{original_prompt}|{outputs_section}", &map).unwrap(),
            "P|O"
        );
    }
}
