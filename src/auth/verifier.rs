// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privy identity token verification.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};

use super::claims::{AuthenticatedUser, PrivyClaims};
use super::error::AuthError;
use super::jwks::JwksManager;

/// Issuer of Privy identity tokens.
pub const PRIVY_ISSUER: &str = "privy.io";

/// Clock skew tolerance for `exp` and `iat` (seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Verifies ES256 tokens signed by the app's Privy JWKS.
#[derive(Clone)]
pub struct PrivyTokenVerifier {
    app_id: String,
    jwks: JwksManager,
}

impl PrivyTokenVerifier {
    pub fn new(app_id: &str, jwks_url: &str) -> Result<Self, AuthError> {
        Ok(Self::with_jwks(app_id, JwksManager::new(jwks_url)?))
    }

    pub fn with_jwks(app_id: &str, jwks: JwksManager) -> Self {
        Self {
            app_id: app_id.to_string(),
            jwks,
        }
    }

    pub async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        if header.alg != Algorithm::ES256 {
            return Err(AuthError::InvalidSignature);
        }
        let (decoding_key, _) = self.jwks.get_decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[PRIVY_ISSUER]);
        validation.set_audience(&[&self.app_id]);

        let token_data =
            decode::<PrivyClaims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            })?;

        Ok(token_data.claims.into())
    }
}
