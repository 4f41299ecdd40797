use axum::http::{HeaderMap, HeaderName};
use subtle::ConstantTimeEq;

use crate::core::config::AuthConfig;
use crate::core::errors::ApiError;
use crate::rag::TenantId;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Who may call the API and how the caller's tenant is found.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    tenant_isolation: bool,
    api_key: Option<String>,
    user_header: HeaderName,
}

impl AuthPolicy {
    pub fn from_config(config: &AuthConfig) -> Result<Self, ApiError> {
        let user_header = HeaderName::from_bytes(config.user_header.trim().as_bytes())
            .map_err(|e| ApiError::BadRequest(format!("Invalid auth.user_header: {e}")))?;
        Ok(Self {
            tenant_isolation: config.tenant_isolation,
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            user_header,
        })
    }

    pub fn tenant_isolation(&self) -> bool {
        self.tenant_isolation
    }

    /// Check the shared key, then resolve the caller's tenant.
    ///
    /// Returns `None` when tenant isolation is off.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Option<TenantId>, ApiError> {
        if let Some(expected) = &self.api_key {
            require_api_key(headers, expected)?;
        }
        if !self.tenant_isolation {
            return Ok(None);
        }
        let user = headers
            .get(&self.user_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        TenantId::new(user)
            .map(Some)
            .map_err(|_| ApiError::Unauthorized)
    }
}

pub fn require_api_key(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let header_value = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if header_value.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    if !bool::from(header_value.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn policy(tenant_isolation: bool, api_key: Option<&str>) -> AuthPolicy {
        AuthPolicy::from_config(&AuthConfig {
            tenant_isolation,
            api_key: api_key.map(str::to_string),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn require_api_key_accepts_valid_header() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));

        assert!(require_api_key(&headers, "secret").is_ok());
    }

    #[test]
    fn require_api_key_rejects_missing_or_invalid_header() {
        let missing = require_api_key(&HeaderMap::new(), "secret");
        assert!(matches!(missing, Err(ApiError::Unauthorized)));

        let mut invalid_headers = HeaderMap::new();
        invalid_headers.insert(API_KEY_HEADER, HeaderValue::from_static("secreT"));
        let invalid = require_api_key(&invalid_headers, "secret");
        assert!(matches!(invalid, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn require_api_key_rejects_non_utf8_header_value() {
        let mut headers = HeaderMap::new();
        let non_utf8 = HeaderValue::from_bytes(&[0xFF, 0xFE, 0xFD])
            .expect("header value bytes should be accepted");
        headers.insert(API_KEY_HEADER, non_utf8);

        assert!(matches!(
            require_api_key(&headers, "secret"),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn isolation_requires_a_user_header() {
        let policy = policy(true, None);
        assert!(matches!(
            policy.authorize(&HeaderMap::new()),
            Err(ApiError::Unauthorized)
        ));

        let mut blank = HeaderMap::new();
        blank.insert("x-user-id", HeaderValue::from_static("   "));
        assert!(policy.authorize(&blank).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user_42"));
        let tenant = policy.authorize(&headers).unwrap();
        assert_eq!(tenant.map(|t| t.to_string()).as_deref(), Some("user_42"));
    }

    #[test]
    fn without_isolation_no_tenant_is_resolved() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user_42"));
        assert!(policy(false, None).authorize(&headers).unwrap().is_none());
    }

    #[test]
    fn api_key_is_checked_before_identity() {
        let policy = policy(true, Some("k"));
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user_42"));
        assert!(matches!(policy.authorize(&headers), Err(ApiError::Unauthorized)));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("k"));
        assert!(policy.authorize(&headers).unwrap().is_some());
    }

    #[test]
    fn rejects_invalid_header_names() {
        let config = AuthConfig {
            user_header: "bad header".to_string(),
            ..AuthConfig::default()
        };
        assert!(AuthPolicy::from_config(&config).is_err());
    }
}
