//! JSON-RPC implementation of [`LedgerClient`]

use super::{classify_client_error, LedgerClient, TransactionState};
use crate::errors::{TokenOpError, TokenOpResult};
use crate::metrics::{metrics, Timer};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

/// Retry policy for idempotent reads
#[derive(Debug, Clone)]
pub struct ReadRetryConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Base backoff delay in milliseconds
    pub base_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for ReadRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

/// Ledger client backed by a Solana JSON-RPC endpoint
pub struct RpcLedger {
    client: Arc<RpcClient>,
    endpoint: String,
    commitment: CommitmentConfig,
    read_retry: ReadRetryConfig,
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment.commitment)
            .field("read_retry", &self.read_retry)
            .finish()
    }
}

impl RpcLedger {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        commitment: CommitmentLevel,
    ) -> Self {
        let endpoint = endpoint.into();
        let commitment = CommitmentConfig { commitment };
        let client = RpcClient::new_with_timeout_and_commitment(
            endpoint.clone(),
            timeout,
            commitment,
        );
        Self {
            client: Arc::new(client),
            endpoint,
            commitment,
            read_retry: ReadRetryConfig::default(),
        }
    }

    pub fn with_read_retry(mut self, read_retry: ReadRetryConfig) -> Self {
        self.read_retry = read_retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run an idempotent read, retrying transport failures with jittered backoff
    async fn read<T, F, Fut>(&self, operation: &'static str, mut call: F) -> TokenOpResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TokenOpResult<T>>,
    {
        // base 2 scaled by `factor`: base, 2*base, 4*base ...
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.read_retry.base_backoff_ms / 2)
            .max_delay(Duration::from_millis(self.read_retry.max_backoff_ms))
            .map(jitter)
            .take(self.read_retry.max_retries);

        let timer = Timer::new();
        let result = RetryIf::start(
            strategy,
            || {
                let fut = call();
                async move {
                    let result = fut.await;
                    if let Err(err) = &result {
                        if err.is_retryable() {
                            debug!(operation, error = %err, "Transient read failure");
                        }
                    }
                    result
                }
            },
            |err: &TokenOpError| err.is_retryable(),
        )
        .await;
        timer.observe_duration(&metrics().rpc_latency);

        if let Err(err) = &result {
            warn!(operation, endpoint = %self.endpoint, error = %err, "Read failed");
        }
        result
    }
}

fn level_of(status: Option<&TransactionConfirmationStatus>) -> CommitmentLevel {
    match status {
        Some(TransactionConfirmationStatus::Processed) => CommitmentLevel::Processed,
        Some(TransactionConfirmationStatus::Confirmed) => CommitmentLevel::Confirmed,
        // A status without a confirmation level is rooted
        Some(TransactionConfirmationStatus::Finalized) | None => CommitmentLevel::Finalized,
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn get_account(&self, address: &Pubkey) -> TokenOpResult<Option<Account>> {
        self.read("get_account", move || async move {
            self.client
                .get_account_with_commitment(address, self.commitment)
                .await
                .map(|response| response.value)
                .map_err(|e| classify_client_error(&e))
        })
        .await
    }

    async fn get_balance(&self, address: &Pubkey) -> TokenOpResult<u64> {
        self.read("get_balance", move || async move {
            self.client
                .get_balance_with_commitment(address, self.commitment)
                .await
                .map(|response| response.value)
                .map_err(|e| classify_client_error(&e))
        })
        .await
    }

    async fn get_latest_blockhash(&self) -> TokenOpResult<Hash> {
        self.read("get_latest_blockhash", move || async move {
            self.client
                .get_latest_blockhash()
                .await
                .map_err(|e| classify_client_error(&e))
        })
        .await
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> TokenOpResult<u64> {
        self.read("get_minimum_balance_for_rent_exemption", move || async move {
            self.client
                .get_minimum_balance_for_rent_exemption(data_len)
                .await
                .map_err(|e| classify_client_error(&e))
        })
        .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> TokenOpResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };

        let timer = Timer::new();
        let result = self
            .client
            .send_transaction_with_config(transaction, config)
            .await;
        timer.observe_duration(&metrics().rpc_latency);

        // No retry here: the caller must rebuild with a fresh blockhash
        result.map_err(|e| {
            let classified = classify_client_error(&e);
            match classified {
                TokenOpError::SubmissionRejected { detail, .. } => {
                    TokenOpError::SubmissionRejected {
                        signature: transaction.signatures.first().copied(),
                        detail,
                    }
                }
                other => other,
            }
        })
    }

    async fn get_transaction_status(
        &self,
        signature: &Signature,
    ) -> TokenOpResult<TransactionState> {
        let statuses = self
            .read("get_signature_statuses", move || async move {
                self.client
                    .get_signature_statuses(std::slice::from_ref(signature))
                    .await
                    .map(|response| response.value)
                    .map_err(|e| classify_client_error(&e))
            })
            .await?;

        let state = match statuses.into_iter().next().flatten() {
            None => TransactionState::Unknown,
            Some(status) => match status.err {
                Some(err) => TransactionState::Failed(format!("{:?}", err)),
                None => TransactionState::Landed(level_of(status.confirmation_status.as_ref())),
            },
        };
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(
            level_of(Some(&TransactionConfirmationStatus::Processed)),
            CommitmentLevel::Processed
        );
        assert_eq!(
            level_of(Some(&TransactionConfirmationStatus::Confirmed)),
            CommitmentLevel::Confirmed
        );
        assert_eq!(level_of(None), CommitmentLevel::Finalized);
    }

    #[test]
    fn test_debug_hides_client_internals() {
        let ledger = RpcLedger::new(
            "http://127.0.0.1:8899",
            Duration::from_secs(5),
            CommitmentLevel::Confirmed,
        );
        let rendered = format!("{:?}", ledger);
        assert!(rendered.contains("127.0.0.1:8899"));
        assert!(rendered.contains("Confirmed"));
    }
}
