use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_TTL_HOURS: i64 = 24;

const TOKEN_ALG: &str = "HS256";

/// Identity carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub driver_id: i64,
    pub company_id: i64,
    pub vehicle_id: Option<i64>,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unexpected signing algorithm")]
    Algorithm,
    #[error("signature mismatch")]
    Signature,
    #[error("token expired")]
    Expired,
}

/// Issues and validates the bearer session tokens: two base64url JSON
/// segments plus an HMAC-SHA256 over them, keyed with the server secret.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self { key: secret.as_bytes().to_vec() }
    }

    /// A fresh 24-hour token for the given identity.
    pub fn issue(
        &self,
        user_id: i64,
        driver_id: i64,
        company_id: i64,
        vehicle_id: Option<i64>,
        role: &str,
    ) -> String {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            driver_id,
            company_id,
            vehicle_id,
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(SESSION_TTL_HOURS)).timestamp(),
        };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> String {
        let header = TokenHeader { alg: TOKEN_ALG.to_string(), typ: "JWT".to_string() };
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header serializes"));
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims serialize"));

        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{header}.{body}.{signature}")
    }

    /// Validates structure, algorithm, signature and expiry, in that order.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(body), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header_bytes = URL_SAFE_NO_PAD.decode(header).map_err(|_| TokenError::Malformed)?;
        let parsed: TokenHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;
        if parsed.alg != TOKEN_ALG {
            return Err(TokenError::Algorithm);
        }

        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::Malformed)?;
        mac.verify_slice(&signature).map_err(|_| TokenError::Signature)?;

        let body = URL_SAFE_NO_PAD.decode(body).map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&body).map_err(|_| TokenError::Malformed)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }
}

/// Pulls the bearer token out of the authorization header.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Shared guard for every authenticated handler. Rejection detail goes to
/// the log; the caller only sees a generic 401.
pub fn authorize(
    headers: &axum::http::HeaderMap,
    signer: &TokenSigner,
) -> Result<Claims, ApiError> {
    let Some(token) = bearer_token(headers) else {
        return Err(ApiError::Auth("Token required".to_string()));
    };

    signer.verify(token).map_err(|err| {
        tracing::debug!("Rejected session token: {err}");
        ApiError::Auth("Invalid token".to_string())
    })
}

/// Hashes a password into a PHC string. Account provisioning is owned by
/// the external directory; this exists for seeding and tests.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Verifies a password against a stored PHC string. An unparseable hash
/// simply fails verification.
pub fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}
