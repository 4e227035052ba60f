//! HS-005: Parameter resolution.
//!
//! Merges caller-supplied values with template defaults and validates every
//! value against its parameter. The result is the only parameter set the
//! orchestrator accepts, so an unvalidated value can never reach a stack.

use super::constraints::validate;
use super::types::{Bundle, MASK};
use crate::error::ValidationError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Validated parameter values bound to one compiled template.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedParameters {
    template: String,
    fingerprint: String,
    values: BTreeMap<String, String>,
    hidden: BTreeSet<String>,
}

impl ResolvedParameters {
    /// Plain value of a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Name/value pairs in name order, plaintext. For API implementations only.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values safe to display: hidden parameters replaced by a mask.
    pub fn masked(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if self.hidden.contains(k) { MASK } else { v.as_str() };
                (k.clone(), shown.to_string())
            })
            .collect()
    }

    /// Fail unless these values were resolved against `bundle`.
    pub fn ensure_resolved_for(&self, bundle: &Bundle) -> Result<(), ValidationError> {
        if self.fingerprint == bundle.fingerprint {
            Ok(())
        } else {
            Err(ValidationError::ForeignBundle {
                resolved: self.template.clone(),
                template: bundle.name.clone(),
            })
        }
    }
}

impl fmt::Debug for ResolvedParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedParameters")
            .field("template", &self.template)
            .field("values", &self.masked())
            .finish()
    }
}

/// Resolve caller values against a bundle's parameters.
///
/// Fails on the first problem found: a supplied name the template does not
/// declare, then (in parameter name order) a missing value or a value that
/// fails its type or constraints.
pub fn resolve(
    bundle: &Bundle,
    supplied: &BTreeMap<String, String>,
) -> Result<ResolvedParameters, ValidationError> {
    if let Some(unknown) = supplied.keys().find(|k| !bundle.parameters.contains_key(*k)) {
        return Err(ValidationError::UnknownParameter {
            parameter: unknown.clone(),
            template: bundle.name.clone(),
        });
    }

    let mut values = BTreeMap::new();
    let mut hidden = BTreeSet::new();
    for (name, parameter) in &bundle.parameters {
        let value = supplied
            .get(name)
            .or(parameter.default.as_ref())
            .ok_or_else(|| ValidationError::MissingValue {
                parameter: name.clone(),
            })?;
        validate(value, parameter)?;
        if parameter.hidden {
            hidden.insert(name.clone());
        }
        values.insert(name.clone(), value.clone());
    }

    Ok(ResolvedParameters {
        template: bundle.name.clone(),
        fingerprint: bundle.fingerprint.clone(),
        values,
        hidden,
    })
}
