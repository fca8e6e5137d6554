//! Tenant identity
//!
//! Every event and every module operation performed on behalf of a request
//! is scoped by a [`TenantId`]. A `TenantId` can only be obtained by parsing,
//! so holding one means the identifier was validated; there is no default
//! tenant.

pub mod gate;

pub use gate::{IdentityClaims, RawIdentity, TenantContext, TenantContextGate, TENANT_HEADER};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum tenant identifier length
pub const MAX_TENANT_ID_LEN: usize = 64;

/// Accepted tenant identifier formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantIdFormat {
    /// 1-64 chars, alphanumeric first, then alphanumeric, `-` or `_`
    #[default]
    Slug,
    /// UUID, normalized to lowercase hyphenated form
    Uuid,
}

/// Authentication failures raised by the tenant gate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("Tenant identity missing")]
    Missing,

    #[error("Malformed tenant identifier: {0}")]
    Malformed(String),

    #[error("Tenant identifier in request does not match authenticated tenant")]
    TenantMismatch,
}

/// Validated tenant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Parse a tenant identifier using the default (slug) format
    pub fn parse(raw: &str) -> Result<Self, AuthenticationError> {
        Self::parse_with(raw, TenantIdFormat::Slug)
    }

    /// Parse a tenant identifier using the given format
    pub fn parse_with(raw: &str, format: TenantIdFormat) -> Result<Self, AuthenticationError> {
        if raw.is_empty() {
            return Err(AuthenticationError::Missing);
        }
        match format {
            TenantIdFormat::Slug => {
                if is_valid_slug(raw) {
                    Ok(Self(raw.to_string()))
                } else {
                    Err(AuthenticationError::Malformed(
                        "expected 1-64 alphanumeric, '-' or '_' characters".to_string(),
                    ))
                }
            }
            TenantIdFormat::Uuid => uuid::Uuid::parse_str(raw)
                .map(|id| Self(id.hyphenated().to_string()))
                .map_err(|e| AuthenticationError::Malformed(format!("invalid UUID: {}", e))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_slug(raw: &str) -> bool {
    raw.len() <= MAX_TENANT_ID_LEN
        && raw.chars().next().map_or(false, |c| c.is_ascii_alphanumeric())
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = AuthenticationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}
