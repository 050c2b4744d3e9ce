// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deployment and execution orchestration.
//!
//! Every operation runs as one awaited sequence:
//! `Init -> AddressResolved -> FeeNegotiated -> Signed -> Submitted`, and
//! any error aborts it. Nothing is retried and calls are submitted in the
//! order given.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use starknet::core::types::{Felt, TypedData};
use tracing::{info, warn};

use crate::blockchain::account::{DeploymentContext, StarknetAccount};
use crate::blockchain::erc20::{parse_amount, EarnManager};
use crate::blockchain::rpc::ChainProvider;
use crate::blockchain::signing::LocalSigner;
use crate::blockchain::types::{felt_hex, Call, NetworkConfig, SubmittedTransaction, EARN_DECIMALS};
use crate::config::{OperatorConfig, PaymasterConfig};
use crate::error::{WalletError, WalletResult};
use crate::paymaster::{
    BuiltTransaction, ExecutableTransaction, FeeMode, PaymasterNegotiator, PaymasterTransaction,
    Sponsor, SponsorApproval, SponsorClient, TransactionIntent,
};

/// Progress of one deploy or execute operation, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStage {
    Init,
    AddressResolved,
    FeeNegotiated,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

impl OperationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStage::Init => "init",
            OperationStage::AddressResolved => "address_resolved",
            OperationStage::FeeNegotiated => "fee_negotiated",
            OperationStage::Signed => "signed",
            OperationStage::Submitted => "submitted",
            OperationStage::Confirmed => "confirmed",
            OperationStage::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn log_stage(operation: &'static str, address: Felt, stage: OperationStage) {
    info!(operation, address = %felt_hex(&address), stage = %stage, "Operation progress");
}

/// Log the failure stage and pass the result through.
fn track<T>(operation: &'static str, address: Felt, result: WalletResult<T>) -> WalletResult<T> {
    if let Err(e) = &result {
        warn!(
            operation,
            address = %felt_hex(&address),
            stage = %OperationStage::Failed,
            error = %e,
            "Operation failed"
        );
    }
    result
}

/// A submitted deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOutcome {
    pub transaction_hash: Felt,
    pub address: Felt,
}

impl From<DeployOutcome> for SubmittedTransaction {
    fn from(outcome: DeployOutcome) -> Self {
        Self {
            transaction_hash: felt_hex(&outcome.transaction_hash),
            address: Some(felt_hex(&outcome.address)),
        }
    }
}

/// The built fee must stay within the negotiated maximum.
fn check_fee(built: &BuiltTransaction, max_fee: Option<u128>) -> WalletResult<()> {
    match max_fee {
        Some(max) if built.fee.estimated_fee_in_gas_token > max => {
            Err(WalletError::FeeLimitExceeded {
                required: built.fee.estimated_fee_in_gas_token,
                max,
            })
        }
        _ => Ok(()),
    }
}

/// SNIP-12 message hash of paymaster typed data for `account`.
pub fn typed_data_hash(typed_data: &Value, account: Felt) -> WalletResult<Felt> {
    let typed: TypedData = serde_json::from_value(typed_data.clone())
        .map_err(|e| WalletError::provider(502, format!("invalid typed data from paymaster: {e}")))?;
    typed
        .message_hash(account)
        .map_err(|e| WalletError::provider(502, format!("cannot hash paymaster typed data: {e}")))
}

/// Self-paid v3 transactions are built with an empty paymaster data field
/// and no tip, so an approval asking for either cannot be honoured.
fn check_approval(approval: &SponsorApproval) -> WalletResult<()> {
    if approval.paymaster_data.is_empty() && approval.tip == 0 {
        return Ok(());
    }
    warn!(
        paymaster_data = approval.paymaster_data.len(),
        tip = approval.tip,
        "Sponsorship approval carries fields the transaction cannot include"
    );
    Err(WalletError::provider(
        502,
        "sponsorship approval requires paymaster data or a tip",
    ))
}

/// Drives deployments and executions for custodial accounts.
#[derive(Clone)]
pub struct Orchestrator {
    chain: Arc<dyn ChainProvider>,
}

impl Orchestrator {
    pub fn new(chain: Arc<dyn ChainProvider>) -> Self {
        Self { chain }
    }

    fn negotiator(account: &StarknetAccount) -> WalletResult<&PaymasterNegotiator> {
        account
            .paymaster()
            .ok_or_else(|| WalletError::MissingConfig("account has no paymaster attached".into()))
    }

    /// Negotiate, estimate (self-paid only) and build.
    async fn negotiate_and_build(
        negotiator: &PaymasterNegotiator,
        transaction: &PaymasterTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<BuiltTransaction> {
        let max_fee = negotiator.estimate_fee(transaction, fee_mode).await?;
        let built = negotiator.rpc().build_transaction(transaction, fee_mode).await?;
        check_fee(&built, max_fee)?;
        Ok(built)
    }

    /// Deploy through the paymaster. The paymaster submits the deployment;
    /// no account signature is involved.
    pub async fn deploy_with_paymaster(
        &self,
        account: &StarknetAccount,
        context: &DeploymentContext,
    ) -> WalletResult<DeployOutcome> {
        const OP: &str = "paymaster_deploy";
        let address = context.address;
        log_stage(OP, address, OperationStage::Init);
        track(OP, address, self.paymaster_deploy(account, context).await)
    }

    async fn paymaster_deploy(
        &self,
        account: &StarknetAccount,
        context: &DeploymentContext,
    ) -> WalletResult<DeployOutcome> {
        const OP: &str = "paymaster_deploy";
        let negotiator = Self::negotiator(account)?;
        if account.address() != context.address {
            return Err(WalletError::AddressMismatch {
                expected: felt_hex(&context.address),
                actual: felt_hex(&account.address()),
            });
        }
        log_stage(OP, context.address, OperationStage::AddressResolved);

        let fee_mode = negotiator.negotiate().await?;
        log_stage(OP, context.address, OperationStage::FeeNegotiated);

        let deployment = context.paymaster_deployment();
        let intent = TransactionIntent::new(vec![], fee_mode, Some(deployment.clone()));
        let transaction = intent.to_paymaster_transaction(context.address)?;
        Self::negotiate_and_build(negotiator, &transaction, &fee_mode).await?;

        let response = negotiator
            .rpc()
            .execute_transaction(&ExecutableTransaction::Deploy(deployment), &fee_mode)
            .await?;
        log_stage(OP, context.address, OperationStage::Submitted);
        info!(
            address = %felt_hex(&context.address),
            transaction_hash = %felt_hex(&response.transaction_hash),
            sponsored = fee_mode.is_sponsored(),
            "Account deployment submitted through paymaster"
        );
        Ok(DeployOutcome {
            transaction_hash: response.transaction_hash,
            address: context.address,
        })
    }

    /// Execute calls through the paymaster, deploying the account in the
    /// same transaction when `deployment` is given.
    pub async fn execute_with_paymaster(
        &self,
        account: &StarknetAccount,
        calls: Vec<Call>,
        deployment: Option<&DeploymentContext>,
    ) -> WalletResult<Felt> {
        const OP: &str = "paymaster_execute";
        let address = account.address();
        log_stage(OP, address, OperationStage::Init);
        track(OP, address, self.paymaster_execute(account, calls, deployment).await)
    }

    async fn paymaster_execute(
        &self,
        account: &StarknetAccount,
        calls: Vec<Call>,
        deployment: Option<&DeploymentContext>,
    ) -> WalletResult<Felt> {
        const OP: &str = "paymaster_execute";
        if calls.is_empty() {
            return Err(WalletError::InvalidArgument("at least one call is required".into()));
        }
        let negotiator = Self::negotiator(account)?;
        let address = account.address();
        log_stage(OP, address, OperationStage::AddressResolved);

        let fee_mode = negotiator.negotiate().await?;
        log_stage(OP, address, OperationStage::FeeNegotiated);

        let deployment = deployment.map(DeploymentContext::paymaster_deployment);
        let intent = TransactionIntent::new(calls, fee_mode, deployment.clone());
        let transaction = intent.to_paymaster_transaction(address)?;
        let built = Self::negotiate_and_build(negotiator, &transaction, &fee_mode).await?;

        let typed_data = built
            .typed_data
            .ok_or_else(|| WalletError::provider(502, "paymaster returned no typed data"))?;
        let hash = typed_data_hash(&typed_data, address)?;
        let signature = account.sign_hash(hash).await?.to_vec();
        log_stage(OP, address, OperationStage::Signed);

        let executable = match deployment {
            Some(deployment) => ExecutableTransaction::DeployAndInvoke {
                deployment,
                user_address: address,
                typed_data,
                signature,
            },
            None => ExecutableTransaction::Invoke {
                user_address: address,
                typed_data,
                signature,
            },
        };
        let response = negotiator.rpc().execute_transaction(&executable, &fee_mode).await?;
        log_stage(OP, address, OperationStage::Submitted);
        info!(
            address = %felt_hex(&address),
            transaction_hash = %felt_hex(&response.transaction_hash),
            calls = intent.calls.len(),
            sponsored = fee_mode.is_sponsored(),
            "Transaction submitted through paymaster"
        );
        Ok(response.transaction_hash)
    }

    /// Deploy paying the fee from the account's own balance.
    pub async fn deploy_self_sponsored(
        &self,
        account: &StarknetAccount,
        context: &DeploymentContext,
    ) -> WalletResult<DeployOutcome> {
        const OP: &str = "deploy";
        log_stage(OP, context.address, OperationStage::Init);
        let result = account
            .deploy_v3(Arc::clone(&self.chain), context)
            .await
            .map(|(transaction_hash, address)| DeployOutcome {
                transaction_hash,
                address,
            });
        if result.is_ok() {
            log_stage(OP, context.address, OperationStage::Submitted);
        }
        track(OP, context.address, result)
    }

    /// Execute paying the fee from the account's own balance.
    pub async fn execute_self_sponsored(
        &self,
        account: &StarknetAccount,
        calls: &[Call],
    ) -> WalletResult<Felt> {
        const OP: &str = "execute";
        let address = account.address();
        log_stage(OP, address, OperationStage::Init);
        if calls.is_empty() {
            return track(
                OP,
                address,
                Err(WalletError::InvalidArgument("at least one call is required".into())),
            );
        }
        let result = account.execute_v3(Arc::clone(&self.chain), calls).await;
        if result.is_ok() {
            log_stage(OP, address, OperationStage::Submitted);
        }
        track(OP, address, result)
    }
}

/// EARN reward transfers from the operator account, sponsored through the
/// legacy sponsorship API.
pub struct OperatorTransfers {
    account: StarknetAccount,
    manager: EarnManager,
    sponsor: Arc<dyn Sponsor>,
    chain: Arc<dyn ChainProvider>,
}

impl OperatorTransfers {
    pub fn new(
        account: StarknetAccount,
        manager: Felt,
        sponsor: Arc<dyn Sponsor>,
        chain: Arc<dyn ChainProvider>,
    ) -> Self {
        Self {
            account,
            manager: EarnManager::new(manager),
            sponsor,
            chain,
        }
    }

    pub fn from_config(
        operator: &OperatorConfig,
        paymaster: &PaymasterConfig,
        network: &NetworkConfig,
        chain: Arc<dyn ChainProvider>,
    ) -> WalletResult<Self> {
        let api_key = paymaster
            .api_key
            .as_ref()
            .ok_or_else(|| WalletError::MissingConfig("PAYMASTER_API_KEY".into()))?;
        let sponsor = SponsorClient::new(&paymaster.url, api_key.expose(), network.chain_id_name)?;
        let signer = LocalSigner::from_hex(operator.private_key.expose())?;
        let account = StarknetAccount::new(operator.address, network.chain_id, Arc::new(signer));
        Ok(Self::new(
            account,
            operator.manager_address,
            Arc::new(sponsor),
            chain,
        ))
    }

    pub fn operator_address(&self) -> Felt {
        self.account.address()
    }

    /// Send `amount` base units of EARN to `recipient`.
    pub async fn send_earns(&self, recipient: Felt, amount: u128) -> WalletResult<Felt> {
        if amount == 0 {
            return Err(WalletError::InvalidArgument("amount must be greater than 0".into()));
        }
        info!(recipient = %felt_hex(&recipient), amount, "Sending EARN");
        self.execute_sponsored(vec![self.manager.transfer_earns_call(recipient, amount)])
            .await
    }

    /// Send a decimal EARN amount (e.g. `"12.5"`).
    pub async fn send_earns_formatted(&self, recipient: Felt, amount: &str) -> WalletResult<Felt> {
        let amount = parse_amount(amount, EARN_DECIMALS)?;
        self.send_earns(recipient, amount).await
    }

    /// Several transfers in one multicall, in the given order.
    pub async fn batch_send_earns(&self, transfers: &[(Felt, u128)]) -> WalletResult<Felt> {
        if transfers.is_empty() {
            return Err(WalletError::InvalidArgument("no transfers given".into()));
        }
        if transfers.iter().any(|(_, amount)| *amount == 0) {
            return Err(WalletError::InvalidArgument("amount must be greater than 0".into()));
        }
        let calls = transfers
            .iter()
            .map(|(recipient, amount)| self.manager.transfer_earns_call(*recipient, *amount))
            .collect();
        info!(transfers = transfers.len(), "Batch sending EARN");
        self.execute_sponsored(calls).await
    }

    async fn execute_sponsored(&self, calls: Vec<Call>) -> WalletResult<Felt> {
        const OP: &str = "sponsored_execute";
        let address = self.account.address();
        log_stage(OP, address, OperationStage::Init);
        let result = async {
            let approval = self.sponsor.request_sponsorship(address, &calls).await?;
            log_stage(OP, address, OperationStage::FeeNegotiated);
            check_approval(&approval)?;
            self.account
                .execute_v3(Arc::clone(&self.chain), &calls)
                .await
        }
        .await;
        if result.is_ok() {
            log_stage(OP, address, OperationStage::Submitted);
        }
        track(OP, address, result)
    }
}
