//! HS-001: Template model types.
//!
//! A [`Bundle`] is the compiled form of one HOT document: its parameters,
//! outputs and tags. Parameter and output maps are `BTreeMap`s so every
//! rendering is sorted by name, independent of declaration order.
//! All types derive Serialize/Deserialize for the persisted record format.

use super::constraints::Constraint;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Replacement text for hidden parameter values.
pub const MASK: &str = "******";

// ============================================================================
// Value types
// ============================================================================

/// Internal value type of a template parameter.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    String,
    Number,
    Boolean,
    CommaDelimitedList,
    Json,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::CommaDelimitedList => write!(f, "comma_delimited_list"),
            Self::Json => write!(f, "json"),
        }
    }
}

// ============================================================================
// Parameters and outputs
// ============================================================================

/// A typed, user-suppliable template input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Parameter {
    /// Unique key within the template
    pub name: String,

    /// Declared type (string when undeclared)
    #[serde(rename = "type", default)]
    pub value_type: ValueType,

    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Display description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Default value in its string form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Mask the value wherever it is displayed
    #[serde(default)]
    pub hidden: bool,

    /// Constraints in declaration order
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Parameter {
    /// A bare parameter: no metadata, no constraints.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            label: None,
            description: None,
            default: None,
            hidden: false,
            constraints: Vec::new(),
        }
    }

    /// The value as it may be shown to a user or written to a log.
    pub fn display_value<'a>(&self, value: &'a str) -> &'a str {
        if self.hidden {
            MASK
        } else {
            value
        }
    }
}

/// A named value exposed by a completed stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Output {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Bundle
// ============================================================================

/// Which optional sections a template carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedSections {
    pub parameters: bool,
    pub outputs: bool,
    pub tags: bool,
}

impl DetectedSections {
    pub fn any(&self) -> bool {
        self.parameters || self.outputs || self.tags
    }
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Bundle {
    /// Template name (usually the file name)
    pub name: String,

    /// Free-form version, assigned by the caller
    #[serde(default)]
    pub version: String,

    /// Free-form label, assigned by the caller
    #[serde(default)]
    pub label: String,

    /// Sections present in the source
    #[serde(default)]
    pub sections: DetectedSections,

    /// Parameters keyed by name
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,

    /// Outputs keyed by name
    #[serde(default)]
    pub outputs: BTreeMap<String, Output>,

    /// Raw tag payload, not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,

    /// Template source text as submitted to the orchestration service
    pub source: String,

    /// BLAKE3 digest of `source`
    pub fingerprint: String,
}

impl Bundle {
    /// A bundle with no parameters, outputs or tags.
    pub fn empty(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            name: name.into(),
            version: String::new(),
            label: String::new(),
            sections: DetectedSections::default(),
            parameters: BTreeMap::new(),
            outputs: BTreeMap::new(),
            tags: None,
            fingerprint: fingerprint(&source),
            source,
        }
    }

    /// Set the caller's version/label pair.
    pub fn with_version_label(
        mut self,
        version: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        self.version = version.into();
        self.label = label.into();
        self
    }

    /// Insert a parameter, replacing any previous one with the same name.
    pub fn insert_parameter(&mut self, parameter: Parameter) {
        self.parameters.insert(parameter.name.clone(), parameter);
    }

    /// Insert an output, replacing any previous one with the same name.
    pub fn insert_output(&mut self, output: Output) {
        self.outputs.insert(output.name.clone(), output);
    }

    /// Copy for display. Defaults of hidden parameters become [`MASK`], and so
    /// does the source text when it carries one of them. The fingerprint is kept.
    pub fn masked(&self) -> Bundle {
        let mut view = self.clone();
        let mut carries_secret = false;
        for p in view.parameters.values_mut().filter(|p| p.hidden) {
            if let Some(default) = p.default.as_mut() {
                carries_secret = true;
                *default = MASK.to_string();
            }
        }
        if carries_secret {
            view.source = MASK.to_string();
        }
        view
    }
}

/// BLAKE3 digest of template text. Returns `"blake3:{hex}"`.
pub fn fingerprint(source: &str) -> String {
    format!("blake3:{}", blake3::hash(source.as_bytes()).to_hex())
}

// ============================================================================
// YAML helpers
// ============================================================================

/// Convert a scalar serde_yaml_ng::Value to its string form.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        serde_yaml_ng::Value::Tagged(tagged) => yaml_value_to_string(&tagged.value),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

// ============================================================================
// Tests
// ============================================================================
