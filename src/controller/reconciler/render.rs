//! # Rendering
//!
//! Decodes `sourceConfig` and renders the fetched template against it.
//!
//! Templates use Jinja syntax: `{{ database.host }}`, `{% for h in hosts %}`.
//! Referencing a name that `sourceConfig` does not define is an error rather
//! than an empty string, and output is never HTML-escaped.

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("sourceConfig is not valid YAML: {0}")]
    InvalidSourceConfig(#[from] serde_yaml::Error),
    #[error("sourceConfig must be a mapping at the top level, found {0}")]
    NotAMapping(&'static str),
    #[error("sourceConfig contains a non-scalar mapping key at {0}")]
    UnsupportedKey(String),
    #[error("properties template is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("template rendering failed: {0}")]
    Template(#[from] minijinja::Error),
}

/// Decoded `sourceConfig` value with string mapping keys
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Null,
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
    Sequence(Vec<TemplateValue>),
    Mapping(BTreeMap<String, TemplateValue>),
}

impl TemplateValue {
    fn from_yaml(value: serde_yaml::Value, path: &str) -> Result<Self, RenderError> {
        use serde_yaml::Value;
        Ok(match value {
            Value::Null => TemplateValue::Null,
            Value::Bool(b) => TemplateValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    TemplateValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    TemplateValue::Unsigned(u)
                } else {
                    TemplateValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => TemplateValue::String(s),
            Value::Sequence(items) => TemplateValue::Sequence(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Self::from_yaml(item, &format!("{path}[{i}]")))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(mapping) => {
                let mut entries = BTreeMap::new();
                for (key, item) in mapping {
                    let key = scalar_key(key).ok_or_else(|| {
                        RenderError::UnsupportedKey(if path.is_empty() {
                            "the top level".to_string()
                        } else {
                            path.to_string()
                        })
                    })?;
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    entries.insert(key, Self::from_yaml(item, &child_path)?);
                }
                TemplateValue::Mapping(entries)
            }
            Value::Tagged(tagged) => Self::from_yaml(tagged.value, path)?,
        })
    }
}

fn scalar_key(key: serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;
    match key {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Tagged(tagged) => scalar_key(tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Decode `sourceConfig` into the template context
///
/// Empty or whitespace-only text is an empty mapping.
pub fn parse_source_config(source_config: &str) -> Result<TemplateValue, RenderError> {
    if source_config.trim().is_empty() {
        return Ok(TemplateValue::Mapping(BTreeMap::new()));
    }
    let value: serde_yaml::Value = serde_yaml::from_str(source_config)?;
    let value = match value {
        serde_yaml::Value::Tagged(tagged) => tagged.value,
        other => other,
    };
    match value {
        serde_yaml::Value::Mapping(_) => TemplateValue::from_yaml(value, ""),
        serde_yaml::Value::Null => Ok(TemplateValue::Mapping(BTreeMap::new())),
        serde_yaml::Value::Bool(_) => Err(RenderError::NotAMapping("a boolean")),
        serde_yaml::Value::Number(_) => Err(RenderError::NotAMapping("a number")),
        serde_yaml::Value::String(_) => Err(RenderError::NotAMapping("a string")),
        serde_yaml::Value::Sequence(_) => Err(RenderError::NotAMapping("a sequence")),
        serde_yaml::Value::Tagged(_) => Err(RenderError::NotAMapping("a tagged value")),
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env
}

/// Render template text against a decoded context
pub fn render_template(template: &str, context: &TemplateValue) -> Result<String, RenderError> {
    Ok(environment().render_str(template, context)?)
}

/// Decode `sourceConfig`, then render the fetched template bytes with it
pub fn render(template: &[u8], source_config: &str) -> Result<String, RenderError> {
    let context = parse_source_config(source_config)?;
    let template = String::from_utf8(template.to_vec())?;
    render_template(&template, &context)
}
