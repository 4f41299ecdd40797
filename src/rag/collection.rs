//! Tenant-qualified collection names.
//!
//! Physical names are `{hex(tenant)}_{logical}` when a tenant is present. The
//! hex alphabet has no `_`, so the first underscore always ends the tenant
//! segment and two tenants can never map onto the same physical name.

use std::fmt;

use super::error::{RagError, Result};

pub const MAX_COLLECTION_NAME_LEN: usize = 128;
const TENANT_DELIMITER: char = '_';

/// Identity of the authenticated user owning a set of collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RagError::Validation("Tenant id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn prefix(&self) -> String {
        format!("{}{}", hex::encode(self.0.as_bytes()), TENANT_DELIMITER)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{tenant, logical name}` pair resolving to one physical collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    tenant: Option<TenantId>,
    logical: String,
}

impl CollectionKey {
    /// Validate `logical` and bind it to `tenant`.
    pub fn new(tenant: Option<TenantId>, logical: &str) -> Result<Self> {
        let logical = validate_logical_name(logical)?;
        Ok(Self { tenant, logical })
    }

    /// Recover the key of a physical name on behalf of `tenant`.
    ///
    /// Fails with `Forbidden` if the name does not carry the tenant's prefix.
    pub fn from_physical(physical: &str, tenant: Option<&TenantId>) -> Result<Self> {
        let logical = match tenant {
            Some(tenant) => physical
                .strip_prefix(&tenant.prefix())
                .ok_or(RagError::Forbidden)?,
            None => physical,
        };
        let logical = validate_logical_name(logical).map_err(|_| RagError::Forbidden)?;
        Ok(Self {
            tenant: tenant.cloned(),
            logical,
        })
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    pub fn logical(&self) -> &str {
        &self.logical
    }

    pub fn physical(&self) -> String {
        match &self.tenant {
            Some(tenant) => format!("{}{}", tenant.prefix(), self.logical),
            None => self.logical.clone(),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.logical)
    }
}

fn validate_logical_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RagError::Validation("Collection name is required.".to_string()));
    }
    if name.chars().count() > MAX_COLLECTION_NAME_LEN {
        return Err(RagError::Validation(format!(
            "Collection name must be at most {MAX_COLLECTION_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(RagError::Validation(
            "Collection name may only contain letters, digits, '-', '_' and '.'".to_string(),
        ));
    }
    Ok(name.to_string())
}
