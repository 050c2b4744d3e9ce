// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User credential verification.
//!
//! Privy issues ES256 identity tokens; they are verified against the app's
//! JWKS with issuer `privy.io` and the app id as audience.

pub mod claims;
pub mod error;
pub mod jwks;
pub mod verifier;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use jwks::JwksManager;
pub use verifier::PrivyTokenVerifier;
