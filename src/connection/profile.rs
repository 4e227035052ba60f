//! HS-008: Connection profile. Plain config struct, field validation, sealed record.

use super::secret::{seal, unseal, SealingKey, Secret};
use crate::error::{SecretError, ValidationError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Credentials and location of an orchestration endpoint.
///
/// Deliberately not `Serialize`: persist it through [`ProfileRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub project: String,
    /// Identity endpoint URL
    pub url: String,
    /// Identity v3 (requires a domain)
    pub v3: bool,
    pub domain: String,
    pub user: String,
    pub password: Secret,
    pub region: String,
}

impl ConnectionProfile {
    /// Check required fields in form order; report the first problem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(field) = self.missing_fields().first().copied() {
            return Err(ValidationError::MissingField { field });
        }
        let url = url::Url::parse(self.url.trim()).map_err(|e| ValidationError::InvalidField {
            field: "url",
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidField {
                field: "url",
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(())
    }

    /// Every empty required field, in form order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.project.trim().is_empty() {
            missing.push("project");
        }
        if self.url.trim().is_empty() {
            missing.push("url");
        }
        if self.v3 && self.domain.trim().is_empty() {
            missing.push("domain");
        }
        if self.user.trim().is_empty() {
            missing.push("user");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        missing
    }
}

/// Persisted form of a profile. The password is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileRecord {
    pub project: String,
    pub url: String,
    #[serde(default)]
    pub v3: bool,
    #[serde(default)]
    pub domain: String,
    pub user: String,
    /// Sealed password (see `hotstack seal`)
    pub password: String,
    #[serde(default)]
    pub region: String,
}

impl ProfileRecord {
    pub fn seal(profile: &ConnectionProfile, key: &SealingKey) -> Result<Self, SecretError> {
        Ok(Self {
            project: profile.project.clone(),
            url: profile.url.clone(),
            v3: profile.v3,
            domain: profile.domain.clone(),
            user: profile.user.clone(),
            password: seal(&profile.password, key)?,
            region: profile.region.clone(),
        })
    }

    pub fn open(&self, key: &SealingKey) -> Result<ConnectionProfile, SecretError> {
        let password = if self.password.is_empty() {
            Secret::new("")
        } else {
            unseal(&self.password, key)?
        };
        Ok(ConnectionProfile {
            project: self.project.clone(),
            url: self.url.clone(),
            v3: self.v3,
            domain: self.domain.clone(),
            user: self.user.clone(),
            password,
            region: self.region.clone(),
        })
    }
}
