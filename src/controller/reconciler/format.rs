//! # Formatting
//!
//! Turns rendered text into ConfigMap data.
//!
//! - `kvp`: one entry per `key=value` line. Blank lines and `#` comments are
//!   skipped, the key is trimmed, the value is everything after the first `=`
//!   and a repeated key keeps its last value.
//! - `key`: the whole rendered text, trimmed, under `keyName`.
//!
//! Provenance entries are seeded first, so a template that emits `commit`,
//! `repoUrl`, `revision` or `path` replaces them.

use crate::crd::{PropertyConfigSpec, PropertyType, UnknownPropertyType};
use std::collections::BTreeMap;
use thiserror::Error;

pub const PROVENANCE_COMMIT: &str = "commit";
pub const PROVENANCE_REPO_URL: &str = "repoUrl";
pub const PROVENANCE_REVISION: &str = "revision";
pub const PROVENANCE_PATH: &str = "path";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error(transparent)]
    UnknownPropertyType(#[from] UnknownPropertyType),
    #[error("keyName must be set when propertyType is 'key'")]
    MissingKeyName,
    #[error("line {line} of the rendered properties is not a key=value pair")]
    MalformedLine { line: usize },
}

/// Check the output settings before any fetch happens
pub fn validate_output(spec: &PropertyConfigSpec) -> Result<PropertyType, FormatError> {
    let property_type: PropertyType = spec.property_type.parse()?;
    if property_type == PropertyType::Key && spec.key_name.is_empty() {
        return Err(FormatError::MissingKeyName);
    }
    Ok(property_type)
}

/// Where the rendered data came from
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub commit: &'a str,
    pub repo_url: &'a str,
    pub revision: &'a str,
    pub path: &'a str,
}

impl Provenance<'_> {
    fn entries(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (PROVENANCE_COMMIT.to_string(), self.commit.to_string()),
            (PROVENANCE_REPO_URL.to_string(), self.repo_url.to_string()),
            (PROVENANCE_REVISION.to_string(), self.revision.to_string()),
            (PROVENANCE_PATH.to_string(), self.path.to_string()),
        ])
    }
}

/// Split rendered text into ConfigMap entries
pub fn format_properties(
    rendered: &str,
    property_type: PropertyType,
    key_name: &str,
) -> Result<BTreeMap<String, String>, FormatError> {
    match property_type {
        PropertyType::Kvp => parse_key_value_lines(rendered),
        PropertyType::Key => {
            if key_name.is_empty() {
                return Err(FormatError::MissingKeyName);
            }
            Ok(BTreeMap::from([(
                key_name.to_string(),
                rendered.trim().to_string(),
            )]))
        }
    }
}

fn parse_key_value_lines(rendered: &str) -> Result<BTreeMap<String, String>, FormatError> {
    let mut data = BTreeMap::new();
    // `lines` only strips `\r` before a `\n`, not at the end of input
    for (index, line) in rendered.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(FormatError::MalformedLine { line: index + 1 });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(FormatError::MalformedLine { line: index + 1 });
        }
        data.insert(key.to_string(), value.to_string());
    }
    Ok(data)
}

/// Provenance overlaid with the formatted entries
#[must_use]
pub fn build_materialized_data(
    provenance: &Provenance<'_>,
    formatted: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut data = provenance.entries();
    data.extend(formatted);
    data
}
