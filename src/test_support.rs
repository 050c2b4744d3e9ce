// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory fakes for the chain node, the paymaster and the identity
//! provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use starknet::core::crypto::pedersen_hash;
use starknet::core::types::{
    BroadcastedDeployAccountTransactionV3, BroadcastedInvokeTransactionV3, BroadcastedTransaction,
    ExecutionResult, FeeEstimate, Felt, PriceUnit, SimulationFlagForEstimateFee,
    TransactionFinalityStatus,
};
use starknet::core::utils::get_contract_address;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::auth::AuthenticatedUser;
use crate::blockchain::address::derive_address;
use crate::blockchain::rpc::{ChainProvider, TransactionOutcome};
use crate::blockchain::signing::{LocalSigner, StarkSigner};
use crate::blockchain::types::{felt_hex, Call, STARKNET_SEPOLIA};
use crate::error::{WalletError, WalletResult};
use crate::paymaster::{
    BuiltTransaction, ExecutableTransaction, ExecuteResponse, FeeMode, PaymasterFeeEstimate,
    PaymasterRpc, PaymasterTransaction, Sponsor, SponsorApproval, TokenData,
};
use crate::privy::client::{IdentityProvider, ProviderWallet, SignRequest, UserSigner};

pub const TEST_CHAIN_ID: Felt = STARKNET_SEPOLIA.chain_id;
pub const CLASS_HASH: Felt =
    Felt::from_hex_unchecked("0x073414441639dcd11d1846f287650a00c60c416b9d3b6a11a5e6d2b4e1bd3ac4");
pub const TEST_USER_ID: &str = "did:privy:test-user";
/// Secret of the key behind every wallet created by [`FakeIdentityProvider`].
pub const WALLET_SECRET: Felt = Felt::from_hex_unchecked("0x1234abcd");

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Chain
// =============================================================================

struct DeployedAccount {
    class_hash: Felt,
    nonce: u64,
}

struct PendingReceipt {
    after_polls: usize,
    polls: usize,
    execution: ExecutionResult,
}

#[derive(Default)]
struct ChainState {
    deployed: HashMap<Felt, DeployedAccount>,
    balances: HashMap<(Felt, Felt), u128>,
    receipts: HashMap<Felt, PendingReceipt>,
    estimates: Vec<(BroadcastedTransaction, Vec<SimulationFlagForEstimateFee>)>,
    invokes: Vec<BroadcastedInvokeTransactionV3>,
    deploys: Vec<BroadcastedDeployAccountTransactionV3>,
}

/// Starknet node double. Broadcast transactions are recorded as sent so
/// tests can check their fields and signatures.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    offline: bool,
    failing_calls: bool,
    receipt_polls: AtomicUsize,
}

impl MockChain {
    /// Every request fails with a transport error.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// `starknet_call` fails (as it does for contracts that do not exist).
    pub fn failing_calls(mut self) -> Self {
        self.failing_calls = true;
        self
    }

    fn check_online(&self) -> WalletResult<()> {
        if self.offline {
            return Err(WalletError::NetworkError("connection refused".into()));
        }
        Ok(())
    }

    pub fn mark_deployed(&self, address: Felt, class_hash: Felt) {
        lock(&self.state)
            .deployed
            .insert(address, DeployedAccount { class_hash, nonce: 0 });
    }

    pub fn deploy(&self, address: Felt) {
        self.mark_deployed(address, CLASS_HASH);
    }

    pub fn is_deployed(&self, address: Felt) -> bool {
        lock(&self.state).deployed.contains_key(&address)
    }

    pub fn set_balance(&self, token: Felt, owner: Felt, amount: u128) {
        lock(&self.state).balances.insert((token, owner), amount);
    }

    pub fn balance(&self, token: Felt, owner: Felt) -> u128 {
        lock(&self.state)
            .balances
            .get(&(token, owner))
            .copied()
            .unwrap_or(0)
    }

    /// The receipt for `hash` becomes available on the `polls`-th lookup.
    pub fn receipt_after_polls(&self, hash: Felt, polls: usize, execution: ExecutionResult) {
        lock(&self.state).receipts.insert(
            hash,
            PendingReceipt {
                after_polls: polls,
                polls: 0,
                execution,
            },
        );
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }

    pub fn estimate_count(&self) -> usize {
        lock(&self.state).estimates.len()
    }

    pub fn last_estimate(&self) -> Option<(BroadcastedTransaction, Vec<SimulationFlagForEstimateFee>)> {
        lock(&self.state).estimates.last().cloned()
    }

    pub fn invoke_count(&self) -> usize {
        lock(&self.state).invokes.len()
    }

    pub fn last_invoke(&self) -> Option<BroadcastedInvokeTransactionV3> {
        lock(&self.state).invokes.last().cloned()
    }

    pub fn last_deploy(&self) -> Option<BroadcastedDeployAccountTransactionV3> {
        lock(&self.state).deploys.last().cloned()
    }
}

fn u256_result(amount: u128) -> Vec<Felt> {
    vec![Felt::from(amount), Felt::ZERO]
}

fn check_signed(signature: &[Felt], is_query: bool) -> WalletResult<()> {
    if is_query {
        return Err(WalletError::ChainRejected("Query transactions cannot be broadcast".into()));
    }
    if signature.len() != 2 {
        return Err(WalletError::ChainRejected("Account validation failed: missing signature".into()));
    }
    Ok(())
}

#[async_trait]
impl ChainProvider for MockChain {
    async fn chain_id(&self) -> WalletResult<Felt> {
        self.check_online()?;
        Ok(TEST_CHAIN_ID)
    }

    async fn get_class_hash_at(&self, address: Felt) -> WalletResult<Felt> {
        self.check_online()?;
        lock(&self.state)
            .deployed
            .get(&address)
            .map(|account| account.class_hash)
            .ok_or_else(|| WalletError::NotDeployed(felt_hex(&address)))
    }

    async fn get_nonce(&self, address: Felt) -> WalletResult<Felt> {
        self.check_online()?;
        lock(&self.state)
            .deployed
            .get(&address)
            .map(|account| Felt::from(account.nonce))
            .ok_or_else(|| WalletError::NotDeployed(felt_hex(&address)))
    }

    async fn call(&self, call: &Call) -> WalletResult<Vec<Felt>> {
        self.check_online()?;
        if self.failing_calls {
            return Err(WalletError::provider(500, "Contract not found"));
        }
        match call.entrypoint.as_str() {
            "balanceOf" | "balance_of" => {
                let owner = call.calldata.first().copied().unwrap_or_default();
                Ok(u256_result(self.balance(call.contract_address, owner)))
            }
            "get_earns_balance" => Ok(u256_result(
                self.balance(call.contract_address, call.contract_address),
            )),
            other => Err(WalletError::provider(500, format!("Entry point {other} not found"))),
        }
    }

    async fn estimate_fee(
        &self,
        transaction: &BroadcastedTransaction,
        flags: &[SimulationFlagForEstimateFee],
    ) -> WalletResult<FeeEstimate> {
        self.check_online()?;
        lock(&self.state)
            .estimates
            .push((transaction.clone(), flags.to_vec()));
        if let BroadcastedTransaction::Invoke(invoke) = transaction {
            if !self.is_deployed(invoke.sender_address) {
                return Err(WalletError::ChainRejected(format!(
                    "Contract not found: {}",
                    felt_hex(&invoke.sender_address)
                )));
            }
        }
        Ok(FeeEstimate {
            l1_gas_consumed: Felt::ZERO,
            l1_gas_price: Felt::from(30_000_000_000_000u64),
            l2_gas_consumed: Felt::from(1_200_000u64),
            l2_gas_price: Felt::from(8_000_000_000u64),
            l1_data_gas_consumed: Felt::from(192u64),
            l1_data_gas_price: Felt::from(1_000u64),
            overall_fee: Felt::from(9_600_000_192_000u64),
            unit: PriceUnit::Fri,
        })
    }

    async fn add_invoke_transaction(
        &self,
        transaction: &BroadcastedInvokeTransactionV3,
    ) -> WalletResult<Felt> {
        self.check_online()?;
        check_signed(&transaction.signature, transaction.is_query)?;
        let mut state = lock(&self.state);
        let account = state
            .deployed
            .get_mut(&transaction.sender_address)
            .ok_or_else(|| WalletError::ChainRejected("Account is not deployed".into()))?;
        if Felt::from(account.nonce) != transaction.nonce {
            return Err(WalletError::ChainRejected("Invalid transaction nonce".into()));
        }
        account.nonce += 1;
        let hash = pedersen_hash(&transaction.sender_address, &transaction.nonce);
        state.invokes.push(transaction.clone());
        state.receipts.insert(
            hash,
            PendingReceipt {
                after_polls: 1,
                polls: 0,
                execution: ExecutionResult::Succeeded,
            },
        );
        Ok(hash)
    }

    async fn add_deploy_account_transaction(
        &self,
        transaction: &BroadcastedDeployAccountTransactionV3,
    ) -> WalletResult<(Felt, Felt)> {
        self.check_online()?;
        check_signed(&transaction.signature, transaction.is_query)?;
        let address = get_contract_address(
            transaction.contract_address_salt,
            transaction.class_hash,
            &transaction.constructor_calldata,
            Felt::ZERO,
        );
        let mut state = lock(&self.state);
        if state.deployed.contains_key(&address) {
            return Err(WalletError::ChainRejected(format!(
                "Account already deployed at {}",
                felt_hex(&address)
            )));
        }
        state.deployed.insert(
            address,
            DeployedAccount {
                class_hash: transaction.class_hash,
                nonce: 1,
            },
        );
        state.deploys.push(transaction.clone());
        Ok((pedersen_hash(&address, &transaction.nonce), address))
    }

    async fn get_transaction_receipt(&self, hash: Felt) -> WalletResult<Option<TransactionOutcome>> {
        self.check_online()?;
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        let Some(pending) = state.receipts.get_mut(&hash) else {
            return Ok(None);
        };
        pending.polls += 1;
        if pending.polls < pending.after_polls {
            return Ok(None);
        }
        Ok(Some(TransactionOutcome {
            transaction_hash: hash,
            execution: pending.execution.clone(),
            finality: TransactionFinalityStatus::AcceptedOnL2,
        }))
    }
}

// =============================================================================
// Paymaster
// =============================================================================

/// SNIP-12 (revision 1) typed data as returned by `paymaster_buildTransaction`.
pub fn outside_execution_typed_data(caller: Felt, nonce: Felt) -> Value {
    json!({
        "types": {
            "StarknetDomain": [
                { "name": "name", "type": "shortstring" },
                { "name": "version", "type": "shortstring" },
                { "name": "chainId", "type": "shortstring" },
                { "name": "revision", "type": "shortstring" }
            ],
            "OutsideExecution": [
                { "name": "Caller", "type": "ContractAddress" },
                { "name": "Nonce", "type": "felt" }
            ]
        },
        "primaryType": "OutsideExecution",
        "domain": {
            "name": "Account.execute_from_outside",
            "version": "2",
            "chainId": "SN_SEPOLIA",
            "revision": "1"
        },
        "message": {
            "Caller": felt_hex(&caller),
            "Nonce": felt_hex(&nonce)
        }
    })
}

/// SNIP-29 paymaster double.
pub struct FakePaymaster {
    available: bool,
    tokens: Option<Vec<Felt>>,
    suggested_fee: u128,
    /// Fee reported by build; `None` reports `suggested_fee / 2`.
    built_fee: Mutex<Option<u128>>,
    reject_execution: Mutex<Option<String>>,
    supported_token_calls: AtomicUsize,
    build_calls: AtomicUsize,
    executed: Mutex<Vec<(ExecutableTransaction, FeeMode)>>,
}

impl Default for FakePaymaster {
    fn default() -> Self {
        Self {
            available: true,
            tokens: Some(vec![Felt::from(0x5743u64)]),
            suggested_fee: 1_000,
            built_fee: Mutex::new(None),
            reject_execution: Mutex::new(None),
            supported_token_calls: AtomicUsize::new(0),
            build_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }
}

impl FakePaymaster {
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_tokens(mut self, tokens: Vec<Felt>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// `paymaster_getSupportedTokens` fails.
    pub fn failing_tokens(mut self) -> Self {
        self.tokens = None;
        self
    }

    pub fn with_suggested_fee(mut self, fee: u128) -> Self {
        self.suggested_fee = fee;
        self
    }

    /// Estimated fee carried by built transactions.
    pub fn set_built_fee(&self, fee: u128) {
        *lock(&self.built_fee) = Some(fee);
    }

    pub fn reject_execution(&self, message: &str) {
        *lock(&self.reject_execution) = Some(message.to_string());
    }

    pub fn supported_token_calls(&self) -> usize {
        self.supported_token_calls.load(Ordering::SeqCst)
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<(ExecutableTransaction, FeeMode)> {
        lock(&self.executed).clone()
    }
}

#[async_trait]
impl PaymasterRpc for FakePaymaster {
    async fn is_available(&self) -> WalletResult<bool> {
        Ok(self.available)
    }

    async fn get_supported_tokens(&self) -> WalletResult<Vec<TokenData>> {
        self.supported_token_calls.fetch_add(1, Ordering::SeqCst);
        let tokens = self
            .tokens
            .as_ref()
            .ok_or_else(|| WalletError::NetworkError("paymaster unreachable".into()))?;
        Ok(tokens
            .iter()
            .map(|token| TokenData {
                token_address: *token,
                decimals: 18,
                price_in_strk: 1_000_000_000_000_000_000,
            })
            .collect())
    }

    async fn build_transaction(
        &self,
        transaction: &PaymasterTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<BuiltTransaction> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        let estimated = lock(&self.built_fee).unwrap_or(self.suggested_fee / 2);
        let (estimated, suggested) = if fee_mode.is_sponsored() {
            (0, 0)
        } else {
            (estimated, self.suggested_fee)
        };
        let typed_data = match transaction {
            PaymasterTransaction::Deploy(_) => None,
            PaymasterTransaction::Invoke { user_address, .. }
            | PaymasterTransaction::DeployAndInvoke { user_address, .. } => {
                Some(outside_execution_typed_data(*user_address, Felt::from(7u64)))
            }
        };
        Ok(BuiltTransaction {
            kind: transaction.kind().to_string(),
            typed_data,
            fee: PaymasterFeeEstimate {
                gas_token_price_in_strk: 1,
                estimated_fee_in_strk: estimated,
                estimated_fee_in_gas_token: estimated,
                suggested_max_fee_in_strk: suggested,
                suggested_max_fee_in_gas_token: suggested,
            },
        })
    }

    async fn execute_transaction(
        &self,
        transaction: &ExecutableTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<ExecuteResponse> {
        if let Some(message) = lock(&self.reject_execution).clone() {
            return Err(WalletError::ChainRejected(message));
        }
        let mut executed = lock(&self.executed);
        executed.push((transaction.clone(), *fee_mode));
        Ok(ExecuteResponse {
            transaction_hash: Felt::from(0xfee0u64 + executed.len() as u64),
            tracking_id: Felt::ONE,
        })
    }
}

/// Legacy sponsorship API double. Approves everything, with empty
/// paymaster data and no tip unless told otherwise.
#[derive(Default)]
pub struct FakeSponsor {
    requests: Mutex<Vec<(Felt, Vec<Call>)>>,
    approval: Mutex<SponsorApproval>,
}

impl FakeSponsor {
    pub fn with_approval(self, paymaster_data: Vec<Felt>, tip: u64) -> Self {
        *lock(&self.approval) = SponsorApproval { paymaster_data, tip };
        self
    }

    pub fn requests(&self) -> Vec<(Felt, Vec<Call>)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Sponsor for FakeSponsor {
    async fn request_sponsorship(&self, sender: Felt, calls: &[Call]) -> WalletResult<SponsorApproval> {
        lock(&self.requests).push((sender, calls.to_vec()));
        Ok(lock(&self.approval).clone())
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Read one request (headers plus `Content-Length` bytes of body).
async fn read_request(stream: &mut TcpStream) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(read) = stream.read(&mut chunk).await else { return };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buffer);
        let Some(end) = text.find("\r\n\r\n") else { continue };
        let length = text[..end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if buffer.len() >= end + 4 + length {
            return;
        }
    }
}

/// Serve `response` verbatim to every connection, then close it.
async fn raw_http_server(response: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            read_request(&mut stream).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    format!("http://{address}/")
}

/// Answers `status` with `body`.
pub async fn canned_http_server(status: u16, body: &str) -> String {
    raw_http_server(format!(
        "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ))
    .await
}

/// Answers 200 with a chunked body that ends in the middle of a chunk.
pub async fn truncated_body_server() -> String {
    raw_http_server(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n40\r\n{\"jsonrpc\":\"2.0\",\"id\":1,"
            .to_string(),
    )
    .await
}

// =============================================================================
// Identity provider
// =============================================================================

struct IdentityState {
    signer_ttl: Duration,
    sign_response: Option<Value>,
    signing_failure: Option<WalletError>,
    last_signed_hash: Option<Felt>,
    last_authorization_key: Option<String>,
    wallets: Vec<(String, ProviderWallet)>,
}

/// Privy double. Signs with [`WALLET_SECRET`] unless a canned response is
/// set.
pub struct FakeIdentityProvider {
    key: LocalSigner,
    state: Mutex<IdentityState>,
    signer_calls: AtomicUsize,
    sign_calls: AtomicUsize,
}

impl Default for FakeIdentityProvider {
    fn default() -> Self {
        Self {
            key: LocalSigner::from_secret(WALLET_SECRET),
            state: Mutex::new(IdentityState {
                signer_ttl: Duration::hours(1),
                sign_response: None,
                signing_failure: None,
                last_signed_hash: None,
                last_authorization_key: None,
                wallets: Vec::new(),
            }),
            signer_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeIdentityProvider {
    pub fn public_key(&self) -> Felt {
        self.key.public_key()
    }

    pub fn set_signer_ttl(&self, ttl: Duration) {
        lock(&self.state).signer_ttl = ttl;
    }

    pub fn set_sign_response(&self, response: Value) {
        lock(&self.state).sign_response = Some(response);
    }

    /// The next signing request fails with `error`.
    pub fn fail_signing(&self, error: WalletError) {
        lock(&self.state).signing_failure = Some(error);
    }

    pub fn last_signed_hash(&self) -> Option<Felt> {
        lock(&self.state).last_signed_hash
    }

    pub fn last_authorization_key(&self) -> Option<String> {
        lock(&self.state).last_authorization_key.clone()
    }

    pub fn signer_calls(&self) -> usize {
        self.signer_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Register a wallet owned by `owner` as is.
    pub fn insert_wallet(&self, owner: &str, wallet: ProviderWallet) {
        lock(&self.state).wallets.push((owner.to_string(), wallet));
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn verify_credential(&self, credential: &str) -> WalletResult<AuthenticatedUser> {
        if credential.trim().is_empty() || credential == "expired" {
            return Err(WalletError::Unauthorized("Token has expired".into()));
        }
        Ok(AuthenticatedUser {
            user_id: TEST_USER_ID.to_string(),
            session_id: None,
            expires_at: Utc::now().timestamp() + 3600,
        })
    }

    async fn get_wallet(&self, wallet_id: &str) -> WalletResult<ProviderWallet> {
        lock(&self.state)
            .wallets
            .iter()
            .find(|(_, wallet)| wallet.id == wallet_id)
            .map(|(_, wallet)| wallet.clone())
            .ok_or_else(|| WalletError::provider(404, "Wallet not found"))
    }

    async fn list_wallets(&self, user_id: &str) -> WalletResult<Vec<ProviderWallet>> {
        Ok(lock(&self.state)
            .wallets
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, wallet)| wallet.clone())
            .collect())
    }

    async fn create_wallet(&self, user_id: &str) -> WalletResult<ProviderWallet> {
        let public_key = self.public_key();
        let mut state = lock(&self.state);
        let wallet = ProviderWallet {
            id: format!("wallet-{}", state.wallets.len() + 1),
            address: felt_hex(&derive_address(public_key, CLASS_HASH)),
            public_key: Some(felt_hex(&public_key)),
            chain_type: "starknet".into(),
            created_at: Some(Utc::now().timestamp_millis()),
        };
        state.wallets.push((user_id.to_string(), wallet.clone()));
        Ok(wallet)
    }

    async fn sign_hash(&self, request: SignRequest<'_>) -> WalletResult<Value> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let canned = {
            let mut state = lock(&self.state);
            state.last_signed_hash = Some(request.hash);
            state.last_authorization_key = request.authorization_key.map(str::to_string);
            if let Some(error) = state.signing_failure.take() {
                return Err(error);
            }
            state.sign_response.clone()
        };
        if let Some(response) = canned {
            return Ok(response);
        }
        let signature = self.key.sign_raw(request.hash).await?;
        Ok(json!({ "signature": signature.to_oracle_hex(), "encoding": "hex" }))
    }

    async fn generate_user_signer(&self, credential: &str) -> WalletResult<UserSigner> {
        let calls = self.signer_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let ttl = lock(&self.state).signer_ttl;
        Ok(UserSigner {
            authorization_key: format!("wallet-auth:{credential}-{calls}"),
            expires_at: Utc::now() + ttl,
        })
    }
}
