//! HS-004: HOT compilation.
//!
//! Compiles template text into a [`Bundle`]:
//! - A cheap textual pre-scan decides whether the YAML needs decoding at all
//! - The document is decoded once; a malformed top level is fatal
//! - Individual parameter, output and constraint entries are decoded on
//!   their own and a malformed one only loses its metadata

use super::constraints::parse_constraints;
use super::typemap::map_type;
use super::types::*;
use crate::error::CompileError;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml_ng::Value;
use std::path::Path;
use tracing::{debug, warn};

const PARAMETERS: &str = "parameters";
const OUTPUTS: &str = "outputs";
const TAGS: &str = "tags";

/// Top-level HOT sections this compiler reads. Other keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct HotDocument {
    #[serde(default)]
    parameters: Option<IndexMap<String, Value>>,

    #[serde(default)]
    outputs: Option<IndexMap<String, Value>>,

    #[serde(default)]
    tags: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    #[serde(rename = "type", default)]
    value_type: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    hidden: Option<bool>,
    #[serde(default)]
    constraints: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default)]
    description: Option<String>,
}

/// Detect which section markers appear anywhere in the text.
///
/// False positives only cost a decode; the scan never misses a real section.
pub fn prescan(source: &str) -> DetectedSections {
    DetectedSections {
        parameters: source.contains(PARAMETERS),
        outputs: source.contains(OUTPUTS),
        tags: source.contains(TAGS),
    }
}

/// Compile a HOT template read from disk. The file name becomes the bundle name.
pub fn compile_file(path: &Path) -> Result<Bundle, CompileError> {
    let source = std::fs::read_to_string(path).map_err(|e| CompileError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    compile(&name, &source)
}

/// Compile HOT template text into a bundle.
pub fn compile(name: &str, source: &str) -> Result<Bundle, CompileError> {
    let mut bundle = Bundle::empty(name, source);

    if !prescan(source).any() {
        debug!(template = name, "no section markers, skipping decode");
        return Ok(bundle);
    }

    let document = decode_document(name, source)?;

    if let Some(parameters) = document.parameters {
        bundle.sections.parameters = true;
        for (param_name, raw) in parameters {
            bundle.insert_parameter(populate_parameter(name, &param_name, raw));
        }
    }

    if let Some(outputs) = document.outputs {
        bundle.sections.outputs = true;
        for (output_name, raw) in outputs {
            bundle.insert_output(populate_output(name, &output_name, raw));
        }
    }

    if let Some(tags) = document.tags.as_ref().and_then(render_tags) {
        bundle.sections.tags = true;
        bundle.tags = Some(tags);
    }

    debug!(
        template = name,
        parameters = bundle.parameters.len(),
        outputs = bundle.outputs.len(),
        tags = bundle.tags.is_some(),
        "compiled template"
    );
    Ok(bundle)
}

fn decode_document(name: &str, source: &str) -> Result<HotDocument, CompileError> {
    let parse_error = |message: String| CompileError::Parse {
        template: name.to_string(),
        message,
    };
    let value: Value = serde_yaml_ng::from_str(source).map_err(|e| parse_error(e.to_string()))?;
    match value {
        Value::Null => Ok(HotDocument::default()),
        Value::Mapping(_) => {
            serde_yaml_ng::from_value(value).map_err(|e| parse_error(e.to_string()))
        }
        _ => Err(parse_error("top level must be a mapping".to_string())),
    }
}

fn populate_parameter(template: &str, name: &str, raw: Value) -> Parameter {
    let raw: RawParameter = match serde_yaml_ng::from_value(raw) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(template, parameter = name, error = %e, "malformed parameter, keeping name only");
            return Parameter::new(name, ValueType::String);
        }
    };

    let mut parameter = Parameter::new(name, map_type(raw.value_type.as_deref()));
    parameter.label = raw.label;
    parameter.description = raw.description;
    parameter.hidden = raw.hidden.unwrap_or(false);
    parameter.default = raw
        .default
        .as_ref()
        .and_then(|value| render_default(value, parameter.value_type));
    if let Some(entries) = raw.constraints {
        parameter.constraints = parse_constraints(name, &entries);
    }
    parameter
}

fn populate_output(template: &str, name: &str, raw: Value) -> Output {
    let description = match serde_yaml_ng::from_value::<RawOutput>(raw) {
        Ok(raw) => raw.description,
        Err(e) => {
            warn!(template, output = name, error = %e, "malformed output, keeping name only");
            None
        }
    };
    Output {
        name: name.to_string(),
        description,
    }
}

/// String form of a default value: scalars verbatim, list sequences joined
/// by commas, structured values as compact JSON.
fn render_default(value: &Value, value_type: ValueType) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Sequence(items) if value_type == ValueType::CommaDelimitedList => Some(
            items
                .iter()
                .map(yaml_value_to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value)
            .map_err(|e| warn!(error = %e, "default value cannot be rendered as JSON"))
            .ok(),
        scalar => Some(yaml_value_to_string(scalar)),
    }
}

/// Tags are opaque: strings verbatim, anything else as YAML text.
fn render_tags(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => serde_yaml_ng::to_string(other)
            .map(|yaml| yaml.trim_end().to_string())
            .ok(),
    }
}
