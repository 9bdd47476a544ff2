//! Studio-side bearer-token guard.
//!
//! Account signup/login/session management lives outside this service; the
//! studio surface is protected by a single static token configured through
//! the environment. Comparison goes through HMAC tags so it is constant
//! time regardless of how much of the token an attacker guessed.

use axum::{http::StatusCode, Json};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::ApiResponse;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Domain separator for the comparison tags.
const TOKEN_MAC_KEY: &[u8] = b"studio-admin-token-v1";

fn token_tag(value: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(TOKEN_MAC_KEY).expect("HMAC can take key of any size");
    mac.update(value.as_bytes());
    mac
}

/// Constant-time equality of two token strings.
pub fn token_matches(presented: &str, expected: &str) -> bool {
    let expected_tag = token_tag(expected).finalize().into_bytes();
    token_tag(presented).verify_slice(&expected_tag).is_ok()
}

/// Validate the `Authorization: Bearer <token>` header for studio-side
/// endpoints. Disabled (everything rejected) when no token is configured.
pub fn require_admin(
    auth_header: Option<&str>,
    state: &AppState,
) -> Result<(), (StatusCode, Json<ApiResponse<()>>)> {
    if state.admin_token.is_empty() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Admin access is not configured")),
        ));
    }

    let presented = auth_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error("Missing Authorization header")),
            )
        })?;

    if !token_matches(presented, &state.admin_token) {
        tracing::warn!(
            "rejected admin token (tag {})",
            hex::encode(&token_tag(presented).finalize().into_bytes()[..4])
        );
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid admin token")),
        ));
    }

    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches_equal() {
        assert!(token_matches("s3cret", "s3cret"));
    }

    #[test]
    fn test_token_matches_rejects_different() {
        assert!(!token_matches("s3cret", "other"));
        assert!(!token_matches("", "other"));
        assert!(!token_matches("s3cret ", "s3cret"));
    }
}
