//! Shared fixtures for scenario tests

use crate::catalog::TokenCatalog;
use crate::submission::SubmissionSettings;
use crate::test_utils::{InMemoryLedger, MockSigner};
use solana_commitment_config::CommitmentLevel;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use std::time::Duration;

pub const SOL: u64 = 1_000_000_000;

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub catalog: Arc<TokenCatalog>,
    pub escrow_program: Pubkey,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let escrow_program = Pubkey::new_unique();
        let catalog = TokenCatalog::new(
            ledger.clone(),
            SubmissionSettings {
                commitment: CommitmentLevel::Confirmed,
                confirm_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(50),
            },
            escrow_program,
            Pubkey::new_unique(),
        );
        Self {
            ledger,
            catalog: Arc::new(catalog),
            escrow_program,
        }
    }

    /// A connected signer whose wallet holds `lamports`
    pub fn funded_signer(&self, lamports: u64) -> (Pubkey, MockSigner) {
        let keypair = Keypair::new();
        let key = keypair.pubkey();
        self.ledger.airdrop(&key, lamports);
        (key, MockSigner::connected(keypair))
    }
}
