//! Tenant context gate
//!
//! Resolves the raw identity supplied by the identity provider into a
//! validated [`TenantContext`]. Requests are rejected here, before they reach
//! any module or the event router.

use tracing::{debug, warn};

use crate::config::TenantConfig;
use crate::tenant::{AuthenticationError, TenantId, TenantIdFormat};

/// Default header carrying the tenant identifier
pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// Claims established by the identity provider (e.g. a verified token)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Tenant the authenticated principal belongs to
    pub tenant_id: String,
    /// Authenticated principal
    pub subject: Option<String>,
}

/// Identity material carried on an inbound call, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawIdentity {
    /// Value of the tenant header, if present
    pub tenant_header: Option<String>,
    /// Claims from the identity provider, if the caller authenticated
    pub claims: Option<IdentityClaims>,
}

impl RawIdentity {
    /// Identity carrying only a tenant header value
    pub fn from_header(value: impl Into<String>) -> Self {
        Self {
            tenant_header: Some(value.into()),
            claims: None,
        }
    }

    /// Identity carrying only identity-provider claims
    pub fn from_claims(tenant_id: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            tenant_header: None,
            claims: Some(IdentityClaims {
                tenant_id: tenant_id.into(),
                subject,
            }),
        }
    }

    /// Extract the tenant header from request headers (case-insensitive name)
    pub fn from_headers<'a, I>(headers: I, header_name: &str) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let tenant_header = headers
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(header_name))
            .map(|(_, value)| value.to_string());
        Self {
            tenant_header,
            claims: None,
        }
    }

    pub fn with_claims(mut self, claims: IdentityClaims) -> Self {
        self.claims = Some(claims);
        self
    }
}

/// Resolved tenant identity, propagated unchanged to modules and policy checks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    tenant: TenantId,
    subject: Option<String>,
}

impl TenantContext {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn into_tenant(self) -> TenantId {
        self.tenant
    }
}

/// Tenant context gate
#[derive(Debug, Clone)]
pub struct TenantContextGate {
    format: TenantIdFormat,
    header_name: String,
}

impl TenantContextGate {
    /// Create a gate accepting the given identifier format
    pub fn new(format: TenantIdFormat) -> Self {
        Self {
            format,
            header_name: TENANT_HEADER.to_string(),
        }
    }

    /// Create a gate from configuration
    pub fn from_config(config: &TenantConfig) -> Self {
        Self {
            format: config.id_format,
            header_name: config.header_name.clone(),
        }
    }

    /// Header name this gate reads the tenant identifier from
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn format(&self) -> TenantIdFormat {
        self.format
    }

    /// Resolve a raw identity into a tenant context
    ///
    /// Identity-provider claims win over the header. When both are present
    /// they must name the same tenant.
    pub fn resolve(&self, raw: &RawIdentity) -> Result<TenantContext, AuthenticationError> {
        let result = self.resolve_inner(raw);
        match &result {
            Ok(context) => debug!("Resolved tenant {}", context.tenant),
            Err(e) => warn!("Rejected request identity: {}", e),
        }
        result
    }

    fn resolve_inner(&self, raw: &RawIdentity) -> Result<TenantContext, AuthenticationError> {
        let header = raw
            .tenant_header
            .as_deref()
            .map(|h| TenantId::parse_with(h, self.format))
            .transpose()?;

        match &raw.claims {
            Some(claims) => {
                let tenant = TenantId::parse_with(&claims.tenant_id, self.format)?;
                if let Some(header) = header {
                    if header != tenant {
                        return Err(AuthenticationError::TenantMismatch);
                    }
                }
                Ok(TenantContext {
                    tenant,
                    subject: claims.subject.clone(),
                })
            }
            None => header
                .map(|tenant| TenantContext {
                    tenant,
                    subject: None,
                })
                .ok_or(AuthenticationError::Missing),
        }
    }
}

impl Default for TenantContextGate {
    fn default() -> Self {
        Self::new(TenantIdFormat::default())
    }
}
