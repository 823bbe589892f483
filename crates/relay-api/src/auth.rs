//! Request authentication.
//!
//! Worker requests are signed: `X-Worker-Signature` carries
//! `hex(HMAC-SHA256(tenant.api_key, raw_body))` and `X-Tenant-ID` names the
//! signing tenant. The body used for verification is the exact bytes
//! received. Producer requests authenticate with `X-API-Key`.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use relay_db::models::Tenant;
use relay_db::{DbError, TenantRepo};
use sha2::Sha256;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the tenant for a signed worker request.
pub async fn worker_tenant(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Tenant, ApiError> {
    let signature = header_str(headers, "X-Worker-Signature")
        .ok_or_else(|| ApiError::Unauthenticated("missing X-Worker-Signature".to_string()))?;
    let tenant_id = header_str(headers, "X-Tenant-ID")
        .ok_or_else(|| ApiError::InvalidRequest("missing X-Tenant-ID".to_string()))?;

    let tenant = match state.tenant_repo.get_by_id(tenant_id).await {
        Ok(tenant) => tenant,
        Err(DbError::TenantNotFound(_)) => {
            return Err(ApiError::Forbidden("unknown tenant".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let api_key = tenant
        .api_key
        .as_deref()
        .ok_or_else(|| ApiError::Forbidden("tenant has no API key".to_string()))?;

    if !verify_signature(api_key, body, signature) {
        return Err(ApiError::Unauthenticated("invalid signature".to_string()));
    }

    Ok(tenant)
}

/// Resolve the tenant for a producer request carrying `X-API-Key`.
pub async fn api_key_tenant(state: &AppState, headers: &HeaderMap) -> Result<Tenant, ApiError> {
    let api_key = header_str(headers, "X-API-Key")
        .ok_or_else(|| ApiError::Unauthenticated("missing API key".to_string()))?;

    match state.tenant_repo.get_by_api_key(api_key).await {
        Ok(tenant) => Ok(tenant),
        Err(DbError::UnknownApiKey) => Err(ApiError::Forbidden("invalid API key".to_string())),
        Err(e) => Err(e.into()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Constant-time verification of a hex-encoded HMAC-SHA256 body signature.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"worker_id":"w-1"}"#;
        let sig = sign("secret-key", body);
        assert!(verify_signature("secret-key", body, &sig));
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = sign("secret-key", br#"{"worker_id":"w-1"}"#);
        assert!(!verify_signature("secret-key", br#"{"worker_id":"w-2"}"#, &sig));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = b"payload";
        let sig = sign("secret-a", body);
        assert!(!verify_signature("secret-b", body, &sig));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(!verify_signature("secret", b"payload", "not hex!"));
        assert!(!verify_signature("secret", b"payload", ""));
    }
}
