//! Submission pipeline: sign once, send once, poll until a terminal state

use super::commitment::{CommitmentState, Observation};
use crate::errors::{TokenOpError, TokenOpResult};
use crate::metrics::{metrics, Timer};
use crate::rpc::{LedgerClient, TransactionState};
use crate::signer::WalletSigner;
use crate::tx_builder::Envelope;
use solana_commitment_config::CommitmentLevel;
use solana_sdk::signature::{Keypair, Signature};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Pipeline-wide defaults
#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    /// Commitment a submission must reach to count as confirmed
    pub commitment: CommitmentLevel,
    /// Upper bound on the confirmation wait
    pub confirm_timeout: Duration,
    /// Delay between status polls
    pub poll_interval: Duration,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            commitment: CommitmentLevel::Confirmed,
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Per-call overrides of [`SubmissionSettings`]
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub commitment: Option<CommitmentLevel>,
    pub confirm_timeout: Option<Duration>,
}

/// A submission observed at (or beyond) the required commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub signature: Signature,
    pub level: CommitmentLevel,
    pub elapsed: Duration,
}

pub struct SubmissionPipeline {
    ledger: Arc<dyn LedgerClient>,
    settings: SubmissionSettings,
}

impl SubmissionPipeline {
    pub fn new(ledger: Arc<dyn LedgerClient>, settings: SubmissionSettings) -> Self {
        Self { ledger, settings }
    }

    pub fn settings(&self) -> &SubmissionSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Submit with the pipeline defaults
    pub async fn submit(
        &self,
        envelope: Envelope,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.submit_with(envelope, signer, SubmitOptions::default())
            .await
    }

    /// Sign and send `envelope`, then wait for the required commitment
    ///
    /// Signing and sending are attempted exactly once. On
    /// [`TokenOpError::TimedOut`] the transaction may still land: call
    /// [`Self::requery`] with the signature before doing anything else.
    pub async fn submit_with(
        &self,
        envelope: Envelope,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        let wallet = signer.pubkey().ok_or(TokenOpError::NotConnected)?;

        let co_signer_keys = envelope.co_signer_keys();
        if let Some(missing) = envelope
            .required_signers()
            .into_iter()
            .find(|key| *key != wallet && !co_signer_keys.contains(key))
        {
            return Err(TokenOpError::Signing(format!(
                "no signer available for required key {}",
                missing
            )));
        }

        let blockhash = self.ledger.get_latest_blockhash().await?;
        let (mut transaction, co_signers) = envelope.into_transaction(blockhash);

        if !co_signers.is_empty() {
            let keypairs: Vec<&Keypair> = co_signers.iter().collect();
            transaction
                .try_partial_sign(keypairs.as_slice(), blockhash)
                .map_err(|e| TokenOpError::Signing(e.to_string()))?;
        }

        let transaction = signer.sign_transaction(transaction).await?;
        if !transaction.is_signed() {
            return Err(TokenOpError::Signing(
                "transaction is missing required signatures".to_string(),
            ));
        }

        let signature = match self.ledger.send_transaction(&transaction).await {
            Ok(signature) => signature,
            Err(err) => {
                if matches!(err, TokenOpError::SubmissionRejected { .. }) {
                    metrics().envelopes_rejected.inc();
                }
                warn!(error = %err, "Transaction not accepted by gateway");
                return Err(err);
            }
        };
        metrics().envelopes_submitted.inc();
        info!(signature = %signature, fee_payer = %wallet, "Transaction submitted");

        let required = options.commitment.unwrap_or(self.settings.commitment);
        let timeout = options
            .confirm_timeout
            .unwrap_or(self.settings.confirm_timeout);
        self.await_confirmation(signature, required, timeout).await
    }

    /// Poll `signature` until it reaches `required`, fails, or `timeout` elapses
    ///
    /// Transport errors while polling are retried until the bound; they never
    /// turn a pending transaction into a failure.
    pub async fn await_confirmation(
        &self,
        signature: Signature,
        required: CommitmentLevel,
        timeout: Duration,
    ) -> TokenOpResult<Confirmation> {
        let timer = Timer::new();
        let started = Instant::now();

        let poll = async {
            let mut state = CommitmentState::Pending;
            loop {
                let observation = match self.ledger.get_transaction_status(&signature).await {
                    Ok(TransactionState::Unknown) => Observation::Unseen,
                    Ok(TransactionState::Landed(level)) => Observation::Landed(level),
                    Ok(TransactionState::Failed(detail)) => Observation::Failed(detail),
                    Err(err) if err.is_retryable() => {
                        warn!(signature = %signature, error = %err, "Status poll failed, retrying");
                        Observation::Unseen
                    }
                    Err(err) => return Err(err),
                };

                state = state.advance(observation, required);
                if state.is_terminal() {
                    return Ok(state);
                }
                debug!(signature = %signature, "Awaiting confirmation");
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        };

        let state = match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result?,
            Err(_) => CommitmentState::Pending.advance(Observation::Deadline, required),
        };

        match state {
            CommitmentState::Confirmed { level } => {
                metrics().envelopes_confirmed.inc();
                timer.observe_duration(&metrics().confirmation_latency);
                info!(signature = %signature, ?level, "Transaction confirmed");
                Ok(Confirmation {
                    signature,
                    level,
                    elapsed: started.elapsed(),
                })
            }
            CommitmentState::Failed { detail } => {
                metrics().envelopes_rejected.inc();
                warn!(signature = %signature, detail = %detail, "Transaction failed on ledger");
                Err(TokenOpError::rejected(Some(signature), detail))
            }
            CommitmentState::TimedOut | CommitmentState::Pending => {
                metrics().envelopes_timed_out.inc();
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(signature = %signature, waited_ms, "Confirmation not observed in time");
                Err(TokenOpError::TimedOut {
                    signature,
                    waited_ms,
                    created: None,
                })
            }
        }
    }

    /// Single status read for a previously submitted signature
    pub async fn requery(&self, signature: &Signature) -> TokenOpResult<TransactionState> {
        self.ledger.get_transaction_status(signature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryLedger, MockSigner};
    use crate::tx_builder::instructions::{create_mint_ixs, native_transfer_ix};
    use solana_sdk::{
        pubkey::Pubkey,
        signature::{Keypair, Signer},
    };

    const SOL: u64 = 1_000_000_000;

    fn pipeline(ledger: &Arc<InMemoryLedger>) -> SubmissionPipeline {
        SubmissionPipeline::new(
            ledger.clone(),
            SubmissionSettings {
                commitment: CommitmentLevel::Confirmed,
                confirm_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(50),
            },
        )
    }

    fn transfer_envelope(from: &Pubkey, lamports: u64) -> Envelope {
        Envelope::build(
            vec![native_transfer_ix(from, &Pubkey::new_unique(), lamports)],
            *from,
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_confirms() {
        let ledger = Arc::new(InMemoryLedger::new());
        let wallet = Keypair::new();
        ledger.airdrop(&wallet.pubkey(), SOL);
        let envelope = transfer_envelope(&wallet.pubkey(), 1_000);
        let signer = MockSigner::connected(wallet);

        let confirmation = pipeline(&ledger).submit(envelope, &signer).await.unwrap();
        assert!(crate::submission::satisfies(
            confirmation.level,
            CommitmentLevel::Confirmed
        ));
        assert_eq!(ledger.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_signer_fails_before_network() {
        let ledger = Arc::new(InMemoryLedger::new());
        let envelope = transfer_envelope(&Pubkey::new_unique(), 1);

        let result = pipeline(&ledger)
            .submit(envelope, &MockSigner::disconnected())
            .await;
        assert_eq!(result, Err(TokenOpError::NotConnected));
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_rejection_is_terminal() {
        let ledger = Arc::new(InMemoryLedger::new());
        let wallet = Keypair::new();
        let envelope = transfer_envelope(&wallet.pubkey(), 1);

        let result = pipeline(&ledger)
            .submit(envelope, &MockSigner::rejecting(wallet))
            .await;
        assert_eq!(result, Err(TokenOpError::UserRejected));
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_rejection_passes_detail_through() {
        let ledger = Arc::new(InMemoryLedger::new());
        let wallet = Keypair::new();
        ledger.airdrop(&wallet.pubkey(), SOL);
        ledger.reject_next("Blockhash not found");
        let envelope = transfer_envelope(&wallet.pubkey(), 1);

        let err = pipeline(&ledger)
            .submit(envelope, &MockSigner::connected(wallet))
            .await
            .unwrap_err();
        match err {
            TokenOpError::SubmissionRejected { detail, .. } => {
                assert_eq!(detail, "Blockhash not found")
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_failure_after_send_is_rejection_with_signature() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_preflight(false);
        let wallet = Keypair::new();
        // No airdrop: the transfer fails during execution
        let envelope = transfer_envelope(&wallet.pubkey(), 1_000);

        let err = pipeline(&ledger)
            .submit(envelope, &MockSigner::connected(wallet))
            .await
            .unwrap_err();
        match err {
            TokenOpError::SubmissionRejected { signature, .. } => assert!(signature.is_some()),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_confirmation_times_out() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.hold_pending(true);
        let wallet = Keypair::new();
        ledger.airdrop(&wallet.pubkey(), SOL);
        let envelope = transfer_envelope(&wallet.pubkey(), 1);

        let pipeline = pipeline(&ledger);
        let err = pipeline
            .submit(envelope, &MockSigner::connected(wallet))
            .await
            .unwrap_err();
        assert!(err.requires_requery());

        let TokenOpError::TimedOut { signature, waited_ms, .. } = err else {
            panic!("expected timeout");
        };
        assert!(waited_ms >= 5_000);
        assert_eq!(
            pipeline.requery(&signature).await.unwrap(),
            TransactionState::Unknown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.fail_status_reads(3);
        let wallet = Keypair::new();
        ledger.airdrop(&wallet.pubkey(), SOL);
        let envelope = transfer_envelope(&wallet.pubkey(), 1);

        let result = pipeline(&ledger)
            .submit(envelope, &MockSigner::connected(wallet))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_co_signer_rejected_locally() {
        let ledger = Arc::new(InMemoryLedger::new());
        let wallet = Keypair::new();
        let mint = Pubkey::new_unique();
        let ixs = create_mint_ixs(&wallet.pubkey(), &mint, &wallet.pubkey(), 0, 1).unwrap();
        let envelope = Envelope::build(ixs, wallet.pubkey()).unwrap();

        let result = pipeline(&ledger)
            .submit(envelope, &MockSigner::connected(wallet))
            .await;
        assert!(matches!(result, Err(TokenOpError::Signing(_))));
        assert_eq!(ledger.sent_count(), 0);
    }
}
