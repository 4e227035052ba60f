//! Error taxonomy for compiling templates, resolving parameters and running stacks.
//!
//! Only failures that must stop a caller *before* any remote side effect are
//! errors. Submission failures, timeouts and aborts are normal run outcomes and
//! live in [`crate::orchestrator::RunResult`] instead.

use crate::core::constraints::ConstraintKind;
use crate::core::types::ValueType;
use thiserror::Error;

/// Fatal template compilation failures.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The template file could not be read.
    #[error("cannot read template {path}: {message}")]
    Read { path: String, message: String },

    /// The document is not YAML, or its top-level shape is not a HOT mapping.
    #[error("template '{template}' is not a valid HOT document: {message}")]
    Parse { template: String, message: String },
}

/// Rejected inputs, reported synchronously before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required connection profile field is empty.
    #[error("{field} must be filled in")]
    MissingField { field: &'static str },

    /// A connection profile field is present but unusable.
    #[error("{field} is invalid: {message}")]
    InvalidField { field: &'static str, message: String },

    /// A parameter has neither a supplied value nor a template default.
    #[error("parameter '{parameter}' has no value and no default")]
    MissingValue { parameter: String },

    /// A value was supplied for a parameter the template does not declare.
    #[error("parameter '{parameter}' is not declared by template '{template}'")]
    UnknownParameter { parameter: String, template: String },

    /// The value cannot be read as the parameter's declared type.
    #[error("parameter '{parameter}' expects a {expected} value")]
    TypeMismatch {
        parameter: String,
        expected: ValueType,
    },

    /// The first constraint (in declaration order) the value violates.
    #[error("parameter '{parameter}' violates {kind} constraint: {description}")]
    ConstraintViolated {
        parameter: String,
        kind: ConstraintKind,
        description: String,
    },

    /// Parameters were resolved against a different template.
    #[error("parameters were resolved against template '{resolved}', not '{template}'")]
    ForeignBundle { resolved: String, template: String },
}

/// Errors surfaced by an orchestration API implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("stack not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Preconditions that stop a run before anything is submitted.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Connection check failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Every empty required field, in form order.
    #[error("connection profile is incomplete: {}", .fields.join(", "))]
    Incomplete { fields: Vec<&'static str> },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("cannot connect: {0}")]
    Unreachable(#[from] ApiError),
}

/// Sealing and unsealing credentials.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("no passphrase available: set {0}")]
    MissingPassphrase(&'static str),

    #[error("cipher failure: {0}")]
    Cipher(String),

    #[error("sealed value is not valid base64: {0}")]
    Encoding(String),

    #[error("sealed value is truncated")]
    Truncated,

    #[error("sealed value was not produced with this passphrase or was tampered with")]
    Rejected,
}

/// Persisting and loading records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("cannot access {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid record {path}: {message}")]
    Format { path: String, message: String },
}

/// Loading the CLI configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid config {path}: {message}")]
    Parse { path: String, message: String },

    #[error(transparent)]
    Secret(#[from] SecretError),
}
