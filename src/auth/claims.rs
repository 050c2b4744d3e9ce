// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privy identity token claims and the authenticated user.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims carried by a Privy identity token.
///
/// `sub` is the Privy DID (`did:privy:...`) and `sid` the session id.
#[derive(Debug, Clone, Deserialize)]
pub struct PrivyClaims {
    pub sub: String,
    #[serde(default)]
    pub iat: Option<i64>,
    pub exp: i64,
    pub iss: String,
    /// Privy sets the app id as the audience.
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
}

/// User resolved from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Privy user DID.
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Token expiry, seconds since epoch.
    pub expires_at: i64,
}

impl From<PrivyClaims> for AuthenticatedUser {
    fn from(claims: PrivyClaims) -> Self {
        Self {
            user_id: claims.sub,
            session_id: claims.sid,
            expires_at: claims.exp,
        }
    }
}
