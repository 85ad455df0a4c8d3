use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use shared_models::auth::{AuthUser, JwtClaims};

type HmacSha256 = Hmac<Sha256>;

/// Validate an HS256 access token and extract the identity context.
///
/// The token is issued by the auth collaborator; this side only verifies
/// the signature, checks expiry and lifts the claims into an `AuthUser`.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<AuthUser, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let signature_string = format!("{}.{}", header_b64, claims_b64);

    let mut mac = match HmacSha256::new_from_slice(jwt_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return Err("Failed to create HMAC".to_string()),
    };
    mac.update(signature_string.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = match URL_SAFE_NO_PAD.decode(claims_b64) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid claims encoding".to_string()),
        },
        Err(_) => return Err("Invalid claims encoding".to_string()),
    };

    let claims: JwtClaims = match serde_json::from_str(&claims_json) {
        Ok(c) => c,
        Err(e) => {
            debug!("Failed to parse claims: {}", e);
            return Err("Invalid claims format".to_string());
        }
    };

    if let Some(exp) = claims.exp {
        let now = chrono::Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| "Invalid subject claim".to_string())?;

    Ok(AuthUser {
        id: user_id,
        email: claims.email,
        is_admin: claims.is_admin,
    })
}

/// Sign a token for the given claims. Used by tests and local tooling;
/// production tokens come from the auth collaborator.
pub fn sign_token(claims: &JwtClaims, jwt_secret: &str) -> Result<String, String> {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_string(claims).map_err(|e| format!("Failed to encode claims: {}", e))?,
    );

    let signing_input = format!("{}.{}", header, payload);
    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_for(sub: &str, is_admin: bool) -> JwtClaims {
        JwtClaims {
            sub: sub.to_string(),
            exp: Some(chrono::Utc::now().timestamp() as u64 + 3600),
            email: Some("patient@example.com".to_string()),
            is_admin,
            iat: Some(chrono::Utc::now().timestamp() as u64),
        }
    }

    #[test]
    fn round_trips_a_signed_token() {
        let token = sign_token(&claims_for("42", false), "test-secret").unwrap();
        let user = validate_token(&token, "test-secret").unwrap();

        assert_eq!(user.id, 42);
        assert_eq!(user.email.as_deref(), Some("patient@example.com"));
        assert!(!user.is_admin);
    }

    #[test]
    fn carries_the_admin_flag() {
        let token = sign_token(&claims_for("7", true), "test-secret").unwrap();
        let user = validate_token(&token, "test-secret").unwrap();
        assert!(user.is_admin);
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let token = sign_token(&claims_for("42", false), "test-secret").unwrap();
        assert!(validate_token(&token, "other-secret").is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let mut claims = claims_for("42", false);
        claims.exp = Some(1);
        let token = sign_token(&claims, "test-secret").unwrap();
        assert_eq!(
            validate_token(&token, "test-secret").unwrap_err(),
            "Token expired"
        );
    }

    #[test]
    fn rejects_a_non_numeric_subject() {
        let token = sign_token(&claims_for("not-a-number", false), "test-secret").unwrap();
        assert_eq!(
            validate_token(&token, "test-secret").unwrap_err(),
            "Invalid subject claim"
        );
    }
}
