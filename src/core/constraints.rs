//! HS-003: Parameter constraints. Lenient parsing and ordered validation.
//!
//! Constraint clauses are advisory metadata: a clause that cannot be
//! understood is skipped with a warning and never blocks compilation.
//! Validation walks constraints in declaration order; the first violation wins.

use super::typemap::{list_items, parse_number};
use super::types::{yaml_value_to_string, Parameter, ValueType};
use crate::error::ValidationError;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

/// Constraint discriminant, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    AllowedValues,
    Range,
    Length,
    AllowedPattern,
    Custom,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowedValues => write!(f, "allowed_values"),
            Self::Range => write!(f, "range"),
            Self::Length => write!(f, "length"),
            Self::AllowedPattern => write!(f, "allowed_pattern"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A validation rule attached to a parameter.
///
/// Every variant carries a description; when the template gives none, one
/// is synthesized from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    AllowedValues {
        values: Vec<String>,
        description: String,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        description: String,
    },
    Length {
        #[serde(default)]
        min: Option<u64>,
        #[serde(default)]
        max: Option<u64>,
        description: String,
    },
    AllowedPattern {
        pattern: String,
        description: String,
        #[serde(skip)]
        #[schemars(skip)]
        compiled: PatternCache,
    },
    /// Checked by the orchestration service, not locally.
    Custom { name: String, description: String },
}

/// Full-match regex of an `allowed_pattern`, compiled on first use.
#[derive(Clone, Default)]
pub struct PatternCache(OnceLock<Option<Regex>>);

impl PatternCache {
    fn get(&self, pattern: &str) -> Option<&Regex> {
        self.0.get_or_init(|| full_match(pattern).ok()).as_ref()
    }

    #[cfg(test)]
    fn is_compiled(&self) -> bool {
        self.0.get().is_some()
    }
}

impl fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatternCache")
    }
}

// Derived from the pattern; never part of a constraint's identity.
impl PartialEq for PatternCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Constraint {
    pub fn allowed_pattern(pattern: impl Into<String>, description: impl Into<String>) -> Self {
        Self::AllowedPattern {
            pattern: pattern.into(),
            description: description.into(),
            compiled: PatternCache::default(),
        }
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::AllowedValues { .. } => ConstraintKind::AllowedValues,
            Self::Range { .. } => ConstraintKind::Range,
            Self::Length { .. } => ConstraintKind::Length,
            Self::AllowedPattern { .. } => ConstraintKind::AllowedPattern,
            Self::Custom { .. } => ConstraintKind::Custom,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::AllowedValues { description, .. }
            | Self::Range { description, .. }
            | Self::Length { description, .. }
            | Self::AllowedPattern { description, .. }
            | Self::Custom { description, .. } => description,
        }
    }

    /// Whether `value`, read as `value_type`, satisfies this constraint.
    pub fn admits(&self, value: &str, value_type: ValueType) -> bool {
        match self {
            Self::AllowedValues { values, .. } => {
                let allowed = |candidate: &str| {
                    values
                        .iter()
                        .any(|v| same_value(v, candidate, value_type))
                };
                if value_type == ValueType::CommaDelimitedList {
                    list_items(value).all(allowed)
                } else {
                    allowed(value)
                }
            }
            Self::Range { min, max, .. } => {
                if !value_type.is_measurable() {
                    return true;
                }
                match parse_number(value) {
                    Some(n) => min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi),
                    None => false,
                }
            }
            Self::Length { min, max, .. } => {
                if !value_type.is_measurable() {
                    return true;
                }
                let len = if value_type == ValueType::CommaDelimitedList {
                    list_items(value).count()
                } else {
                    value.chars().count()
                } as u64;
                min.is_none_or(|lo| len >= lo) && max.is_none_or(|hi| len <= hi)
            }
            Self::AllowedPattern {
                pattern, compiled, ..
            } => compiled
                .get(pattern)
                .is_some_and(|re| re.is_match(value)),
            Self::Custom { .. } => true,
        }
    }
}

/// Numbers compare by value (`1` equals `1.0`), everything else by text.
fn same_value(allowed: &str, candidate: &str, value_type: ValueType) -> bool {
    if allowed == candidate {
        return true;
    }
    value_type == ValueType::Number
        && matches!(
            (parse_number(allowed), parse_number(candidate)),
            (Some(a), Some(b)) if a == b
        )
}

/// Check a candidate value against a parameter's type and constraints.
pub fn validate(value: &str, parameter: &Parameter) -> Result<(), ValidationError> {
    if !parameter.value_type.accepts(value) {
        return Err(ValidationError::TypeMismatch {
            parameter: parameter.name.clone(),
            expected: parameter.value_type,
        });
    }
    for constraint in &parameter.constraints {
        if !constraint.admits(value, parameter.value_type) {
            return Err(ValidationError::ConstraintViolated {
                parameter: parameter.name.clone(),
                kind: constraint.kind(),
                description: constraint.description().to_string(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawConstraint {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    allowed_values: Option<Vec<serde_yaml_ng::Value>>,
    #[serde(default)]
    range: Option<RawRange>,
    #[serde(default)]
    length: Option<RawLength>,
    #[serde(default)]
    allowed_pattern: Option<String>,
    #[serde(default)]
    custom_constraint: Option<String>,
    #[serde(default)]
    modulo: Option<serde_yaml_ng::Value>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawLength {
    #[serde(default)]
    min: Option<u64>,
    #[serde(default)]
    max: Option<u64>,
}

/// Parse the raw `constraints` list of one parameter.
pub fn parse_constraints(parameter: &str, entries: &[serde_yaml_ng::Value]) -> Vec<Constraint> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let parsed = parse_constraint(entry);
            if let Err(ref reason) = parsed {
                warn!(parameter, index, reason = %reason, "skipping constraint");
            }
            parsed.ok()
        })
        .collect()
}

fn parse_constraint(entry: &serde_yaml_ng::Value) -> Result<Constraint, String> {
    let raw: RawConstraint =
        serde_yaml_ng::from_value(entry.clone()).map_err(|e| format!("malformed clause: {}", e))?;
    let given = raw.description.filter(|d| !d.trim().is_empty());

    if let Some(values) = raw.allowed_values {
        let values: Vec<String> = values.iter().map(yaml_value_to_string).collect();
        let description = given.unwrap_or_else(|| format!("allowed values: {}", values.join(", ")));
        return Ok(Constraint::AllowedValues {
            values,
            description,
        });
    }

    if let Some(RawRange { min, max }) = raw.range {
        if min.is_none() && max.is_none() {
            return Err("range has neither min nor max".to_string());
        }
        let description = given.unwrap_or_else(|| describe_bounds("value", min, max));
        return Ok(Constraint::Range {
            min,
            max,
            description,
        });
    }

    if let Some(RawLength { min, max }) = raw.length {
        if min.is_none() && max.is_none() {
            return Err("length has neither min nor max".to_string());
        }
        let description = given.unwrap_or_else(|| describe_bounds("length", min, max));
        return Ok(Constraint::Length {
            min,
            max,
            description,
        });
    }

    if let Some(pattern) = raw.allowed_pattern {
        full_match(&pattern).map_err(|e| format!("invalid allowed_pattern: {}", e))?;
        let description = given.unwrap_or_else(|| format!("must match pattern {}", pattern));
        return Ok(Constraint::allowed_pattern(pattern, description));
    }

    if let Some(name) = raw.custom_constraint {
        let description = given.unwrap_or_else(|| format!("custom constraint {}", name));
        return Ok(Constraint::Custom { name, description });
    }

    if raw.modulo.is_some() {
        let description = given.unwrap_or_else(|| "modulo constraint".to_string());
        return Ok(Constraint::Custom {
            name: "modulo".to_string(),
            description,
        });
    }

    Err("no recognized constraint key".to_string())
}

fn describe_bounds<T: fmt::Display>(subject: &str, min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{} must be between {} and {}", subject, lo, hi),
        (Some(lo), None) => format!("{} must be at least {}", subject, lo),
        (None, Some(hi)) => format!("{} must be at most {}", subject, hi),
        (None, None) => format!("{} is unbounded", subject),
    }
}

/// Compile a pattern so that it must match the whole value.
fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}
