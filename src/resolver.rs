//! Associated account resolution
//!
//! `resolve` is a read, maybe-create, re-read protocol with no atomic
//! test-and-create underneath. It stays correct under concurrent callers
//! because the target address is deterministic and creation is
//! accept-if-absent: whoever loses the creation race simply re-reads the
//! account the winner created.

use crate::address::derive_associated_address;
use crate::errors::{TokenOpError, TokenOpResult};
use crate::metrics::metrics;
use crate::rpc::LedgerClient;
use crate::signer::WalletSigner;
use crate::submission::SubmissionPipeline;
use crate::tx_builder::{create_associated_account_ix, Envelope};
use solana_sdk::pubkey::Pubkey;
use spl_token::{
    solana_program::program_pack::Pack,
    state::{Account as TokenAccount, AccountState},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creation attempts after the first read. The loop re-reads once after
/// creating and never creates twice.
const MAX_CREATE_ATTEMPTS: usize = 1;

/// A validated associated token account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAccount {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    /// Balance in base units
    pub amount: u64,
    pub is_frozen: bool,
}

enum Probe {
    Found(SubAccount),
    Missing,
    /// Lamports were sent to the address before it became a token account
    Foreign(Pubkey),
}

pub struct AccountResolver {
    ledger: Arc<dyn LedgerClient>,
    pipeline: Arc<SubmissionPipeline>,
}

impl AccountResolver {
    pub fn new(ledger: Arc<dyn LedgerClient>, pipeline: Arc<SubmissionPipeline>) -> Self {
        Self { ledger, pipeline }
    }

    /// Return the associated account for (`mint`, `owner`), creating it if absent
    ///
    /// Rent for a new account is paid by `payer`. Creation failures other
    /// than a missing or refusing signer are absorbed; if the re-read after
    /// creation still finds nothing usable, the error from the first read is
    /// returned.
    pub async fn resolve(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &dyn WalletSigner,
    ) -> TokenOpResult<SubAccount> {
        let address = derive_associated_address(mint, owner);
        let mut initial_error: Option<TokenOpError> = None;

        for attempt in 0..=MAX_CREATE_ATTEMPTS {
            let probe = match self.probe(&address).await {
                Ok(probe) => probe,
                Err(err) => return Err(initial_error.unwrap_or(err)),
            };

            let absent = match probe {
                Probe::Found(sub) => return verify(sub, mint, owner),
                Probe::Missing => TokenOpError::AccountNotFound { address },
                Probe::Foreign(program) => TokenOpError::invalid_data(
                    address,
                    format!("owned by program {} instead of the token program", program),
                ),
            };
            if initial_error.is_none() {
                initial_error = Some(absent);
            }

            if attempt == MAX_CREATE_ATTEMPTS {
                break;
            }
            debug!(address = %address, mint = %mint, owner = %owner, "Associated account absent");
            self.create_absent(&address, mint, owner, payer).await?;
        }

        Err(initial_error.unwrap_or(TokenOpError::AccountNotFound { address }))
    }

    /// Read-only variant of [`Self::resolve`]: `None` when nothing usable exists yet
    pub async fn lookup(&self, mint: &Pubkey, owner: &Pubkey) -> TokenOpResult<Option<SubAccount>> {
        let address = derive_associated_address(mint, owner);
        match self.probe(&address).await? {
            Probe::Found(sub) => verify(sub, mint, owner).map(Some),
            Probe::Missing | Probe::Foreign(_) => Ok(None),
        }
    }

    async fn probe(&self, address: &Pubkey) -> TokenOpResult<Probe> {
        let Some(account) = self.ledger.get_account(address).await? else {
            return Ok(Probe::Missing);
        };
        if account.owner != spl_token::id() {
            return Ok(Probe::Foreign(account.owner));
        }

        let state = TokenAccount::unpack(&account.data)
            .map_err(|e| TokenOpError::invalid_data(*address, e.to_string()))?;
        Ok(Probe::Found(SubAccount {
            address: *address,
            mint: state.mint,
            owner: state.owner,
            amount: state.amount,
            is_frozen: state.state == AccountState::Frozen,
        }))
    }

    /// Submit one create-associated-account transaction, absorbing race losses
    async fn create_absent(
        &self,
        address: &Pubkey,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &dyn WalletSigner,
    ) -> TokenOpResult<()> {
        let payer_key = payer.pubkey().ok_or(TokenOpError::NotConnected)?;
        let envelope = Envelope::build(
            vec![create_associated_account_ix(&payer_key, owner, mint)],
            payer_key,
        )?;

        match self.pipeline.submit(envelope, payer).await {
            Ok(confirmation) => {
                metrics().associated_accounts_created.inc();
                info!(
                    address = %address,
                    signature = %confirmation.signature,
                    "Associated account created"
                );
                Ok(())
            }
            Err(err @ (TokenOpError::NotConnected | TokenOpError::UserRejected)) => Err(err),
            Err(err) => {
                // Usually a concurrent creator won; the re-read decides
                metrics().associated_account_create_races.inc();
                warn!(address = %address, error = %err, "Create attempt failed, re-reading");
                Ok(())
            }
        }
    }
}

fn verify(sub: SubAccount, mint: &Pubkey, owner: &Pubkey) -> TokenOpResult<SubAccount> {
    if sub.mint != *mint {
        return Err(TokenOpError::integrity(
            sub.address,
            format!("holds mint {} instead of {}", sub.mint, mint),
        ));
    }
    if sub.owner != *owner {
        return Err(TokenOpError::integrity(
            sub.address,
            format!("owned by {} instead of {}", sub.owner, owner),
        ));
    }
    Ok(sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::SubmissionSettings;
    use crate::test_utils::{InMemoryLedger, MockSigner};
    use solana_sdk::signature::{Keypair, Signer};

    const SOL: u64 = 1_000_000_000;

    fn resolver(ledger: &Arc<InMemoryLedger>) -> AccountResolver {
        let pipeline = Arc::new(SubmissionPipeline::new(
            ledger.clone(),
            SubmissionSettings::default(),
        ));
        AccountResolver::new(ledger.clone(), pipeline)
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_account_is_returned_without_creation() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let address = derive_associated_address(&mint, &owner);
        ledger.plant_token_account(address, mint, owner, 42);

        let payer = MockSigner::disconnected();
        let sub = resolver(&ledger).resolve(&mint, &owner, &payer).await.unwrap();
        assert_eq!(sub.address, address);
        assert_eq!(sub.amount, 42);
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_account_is_created_once() {
        let ledger = Arc::new(InMemoryLedger::new());
        let payer = Keypair::new();
        ledger.airdrop(&payer.pubkey(), SOL);
        let mint = ledger.plant_mint(6, &payer.pubkey());
        let owner = Pubkey::new_unique();

        let signer = MockSigner::connected(payer);
        let resolver = resolver(&ledger);
        let first = resolver.resolve(&mint, &owner, &signer).await.unwrap();
        let second = resolver.resolve(&mint, &owner, &signer).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.amount, 0);
        assert_eq!(ledger.creations(&first.address), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_mismatch_is_integrity_error() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let address = derive_associated_address(&mint, &owner);
        ledger.plant_token_account(address, mint, Pubkey::new_unique(), 1);

        let err = resolver(&ledger)
            .resolve(&mint, &owner, &MockSigner::connected(Keypair::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenOpError::AccountIntegrity { address: a, .. } if a == address));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefunded_address_is_initialized() {
        let ledger = Arc::new(InMemoryLedger::new());
        let payer = Keypair::new();
        ledger.airdrop(&payer.pubkey(), SOL);
        let mint = ledger.plant_mint(0, &payer.pubkey());
        let owner = Pubkey::new_unique();
        let address = derive_associated_address(&mint, &owner);
        ledger.airdrop(&address, 5_000);

        let sub = resolver(&ledger)
            .resolve(&mint, &owner, &MockSigner::connected(payer))
            .await
            .unwrap();
        assert_eq!(sub.address, address);
        assert_eq!(ledger.creations(&address), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signer_refusal_propagates() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let resolver = resolver(&ledger);

        let err = resolver
            .resolve(&mint, &owner, &MockSigner::rejecting(Keypair::new()))
            .await
            .unwrap_err();
        assert_eq!(err, TokenOpError::UserRejected);

        let err = resolver
            .resolve(&mint, &owner, &MockSigner::disconnected())
            .await
            .unwrap_err();
        assert_eq!(err, TokenOpError::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_creation_surfaces_initial_read_error() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        // Unfunded payer: creation fails and is absorbed
        let err = resolver(&ledger)
            .resolve(&mint, &owner, &MockSigner::connected(Keypair::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TokenOpError::AccountNotFound {
                address: derive_associated_address(&mint, &owner)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_never_creates() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        assert_eq!(resolver(&ledger).lookup(&mint, &owner).await.unwrap(), None);
        assert_eq!(ledger.sent_count(), 0);
    }
}
