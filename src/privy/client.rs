// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privy REST client: wallets, raw signing and user signers.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use starknet::core::types::Felt;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::authorization::{AuthorizationKey, AUTHORIZATION_SIGNATURE_HEADER};
use crate::auth::{AuthenticatedUser, PrivyTokenVerifier};
use crate::blockchain::types::felt_fixed_hex;
use crate::config::PrivyConfig;
use crate::error::{WalletError, WalletResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const APP_ID_HEADER: &str = "privy-app-id";
const APP_SECRET_HEADER: &str = "privy-app-secret";
const IDEMPOTENCY_HEADER: &str = "privy-idempotency-key";
pub const STARKNET_CHAIN_TYPE: &str = "starknet";

/// Wallet as stored by the custody service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderWallet {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub public_key: Option<String>,
    pub chain_type: String,
    /// Creation time, milliseconds since epoch.
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Short-lived authorization key issued for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSigner {
    pub authorization_key: String,
    pub expires_at: DateTime<Utc>,
}

/// Raw signing request for one wallet.
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    pub wallet_id: &'a str,
    pub hash: Felt,
    pub credential: &'a str,
    pub authorization_key: Option<&'a str>,
}

/// Identity and custody provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer credential and return the user it belongs to.
    async fn verify_credential(&self, credential: &str) -> WalletResult<AuthenticatedUser>;

    async fn get_wallet(&self, wallet_id: &str) -> WalletResult<ProviderWallet>;

    async fn list_wallets(&self, user_id: &str) -> WalletResult<Vec<ProviderWallet>>;

    async fn create_wallet(&self, user_id: &str) -> WalletResult<ProviderWallet>;

    /// Ask the signing oracle to sign a hash. The JSON body is returned as is
    /// so the caller can locate the signature.
    async fn sign_hash(&self, request: SignRequest<'_>) -> WalletResult<Value>;

    /// Exchange a user credential for an authorization key.
    async fn generate_user_signer(&self, credential: &str) -> WalletResult<UserSigner>;
}

/// HTTP client for the Privy API.
pub struct PrivyClient {
    config: PrivyConfig,
    http: Client,
    verifier: PrivyTokenVerifier,
}

#[derive(Debug, Deserialize)]
struct WalletList {
    data: Vec<ProviderWallet>,
}

#[derive(Debug, Deserialize)]
struct UserSignerResponse {
    authorization_key: String,
    /// Milliseconds since epoch.
    expires_at: i64,
}

impl PrivyClient {
    pub fn new(config: PrivyConfig) -> WalletResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WalletError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        let verifier = PrivyTokenVerifier::new(&config.app_id, &config.jwks_url)?;
        Ok(Self {
            config,
            http,
            verifier,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.config.app_id, self.config.app_secret.expose());
        format!("Basic {}", Base64::encode_string(raw.as_bytes()))
    }

    /// App-authenticated request.
    fn app_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(APP_ID_HEADER, &self.config.app_id)
            .header(reqwest::header::AUTHORIZATION, self.basic_auth())
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(request: RequestBuilder) -> WalletResult<T> {
        let body = Self::send(request).await?;
        serde_json::from_value(body)
            .map_err(|e| WalletError::provider(502, format!("unexpected Privy response: {e}")))
    }

    /// Send, require a JSON body and map non-2xx statuses to `ProviderError`.
    async fn send(request: RequestBuilder) -> WalletResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| WalletError::NetworkError(format!("failed to read Privy response: {e}")))?;

        let body: Value = serde_json::from_str(&text).map_err(|_| {
            let code = if status.is_success() { 502 } else { status.as_u16() };
            WalletError::provider(code, format!("Invalid JSON response from Privy: {text}"))
        })?;

        if !status.is_success() {
            let message = body
                .pointer("/error")
                .and_then(Value::as_str)
                .or_else(|| body.pointer("/message").and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or(text);
            return Err(WalletError::provider(status.as_u16(), message));
        }
        Ok(body)
    }
}

#[async_trait]
impl IdentityProvider for PrivyClient {
    async fn verify_credential(&self, credential: &str) -> WalletResult<AuthenticatedUser> {
        self.verifier.verify(credential).await.map_err(WalletError::from)
    }

    async fn get_wallet(&self, wallet_id: &str) -> WalletResult<ProviderWallet> {
        let url = self.url(&format!("/v1/wallets/{wallet_id}"));
        Self::send_json(self.app_request(Method::GET, &url)).await
    }

    async fn list_wallets(&self, user_id: &str) -> WalletResult<Vec<ProviderWallet>> {
        let url = self.url("/v1/wallets");
        let request = self
            .app_request(Method::GET, &url)
            .query(&[("user_id", user_id), ("chain_type", STARKNET_CHAIN_TYPE)]);
        let list: WalletList = Self::send_json(request).await?;
        Ok(list.data)
    }

    async fn create_wallet(&self, user_id: &str) -> WalletResult<ProviderWallet> {
        let url = self.url("/v1/wallets");
        let request = self
            .app_request(Method::POST, &url)
            .header(IDEMPOTENCY_HEADER, Uuid::new_v4().to_string())
            .json(&json!({
                "chain_type": STARKNET_CHAIN_TYPE,
                "owner": { "user_id": user_id },
            }));
        let wallet: ProviderWallet = Self::send_json(request).await?;
        info!(wallet_id = %wallet.id, "Created Starknet wallet");
        Ok(wallet)
    }

    async fn sign_hash(&self, request: SignRequest<'_>) -> WalletResult<Value> {
        let url = self.url(&format!("/v1/wallets/{}/raw_sign", request.wallet_id));
        let body = json!({ "params": { "hash": felt_fixed_hex(&request.hash) } });

        let mut builder = self
            .http
            .post(&url)
            .header(APP_ID_HEADER, &self.config.app_id)
            .header(APP_SECRET_HEADER, self.config.app_secret.expose())
            .bearer_auth(request.credential)
            .json(&body);
        if let Some(raw_key) = request.authorization_key {
            let key = AuthorizationKey::parse(raw_key)?;
            let signature = key.sign_request("POST", &url, &body, &self.config.app_id);
            builder = builder.header(AUTHORIZATION_SIGNATURE_HEADER, signature);
        }

        debug!(wallet_id = request.wallet_id, "Requesting raw signature");
        Self::send(builder).await
    }

    async fn generate_user_signer(&self, credential: &str) -> WalletResult<UserSigner> {
        let url = self.url("/v1/user_signers/authenticate");
        let request = self
            .app_request(Method::POST, &url)
            .json(&json!({ "user_jwt": credential }));
        let response: UserSignerResponse = Self::send_json(request).await?;
        let expires_at = Utc
            .timestamp_millis_opt(response.expires_at)
            .single()
            .ok_or_else(|| WalletError::provider(502, "invalid authorization key expiry"))?;
        Ok(UserSigner {
            authorization_key: response.authorization_key,
            expires_at,
        })
    }
}
