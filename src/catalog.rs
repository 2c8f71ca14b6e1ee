//! Operation catalog
//!
//! Caller-facing token operations. Each one checks its local preconditions
//! first, then composes account resolution, instruction building and the
//! submission pipeline. Every call runs inside a span tagged with a fresh
//! [`CorrelationId`], so its resolve/build/submit log lines can be grouped.
//!
//! Every submitting operation has a `_with` variant taking [`SubmitOptions`],
//! for a caller-chosen commitment or confirmation bound.
//!
//! Amounts are whole units; they are scaled by `10^decimals` into base units
//! before anything is built.

use crate::address::{
    derive_associated_address, derive_program_address, AddressBook, ProgramAddress,
};
use crate::config::Config;
use crate::errors::{TokenOpError, TokenOpResult};
use crate::escrow::{EscrowMethod, EscrowProgram};
use crate::metrics::metrics;
use crate::observability::{operation_span, CorrelationId};
use crate::resolver::{AccountResolver, SubAccount};
use crate::rpc::{LedgerClient, RpcLedger, TransactionState};
use crate::signer::WalletSigner;
use crate::submission::{Confirmation, SubmissionPipeline, SubmissionSettings, SubmitOptions};
use crate::tx_builder::{
    burn_checked_ix, create_mint_ixs, mint_to_checked_ix, native_transfer_ix,
    transfer_checked_ix, Envelope,
};
use solana_commitment_config::CommitmentLevel;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use spl_token::{
    solana_program::{program_option::COption, program_pack::Pack},
    state::Mint,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

const METADATA_SEED: &[u8] = b"metadata";

/// Snapshot of a mint's on-ledger state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceClassInfo {
    pub address: Pubkey,
    pub decimals: u8,
    /// Supply in base units
    pub supply: u64,
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub is_initialized: bool,
}

/// Token balance of one associated account
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub address: Pubkey,
    /// Base units
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: f64,
}

/// Scale whole units into base units, failing on zero or overflow
pub fn to_base_units(amount: u64, decimals: u8) -> TokenOpResult<u64> {
    if amount == 0 {
        return Err(TokenOpError::InvalidArgument(
            "amount must be greater than zero".to_string(),
        ));
    }
    10u64
        .checked_pow(u32::from(decimals))
        .and_then(|scale| amount.checked_mul(scale))
        .ok_or_else(|| {
            TokenOpError::InvalidArgument(format!(
                "amount {} with {} decimals overflows u64 base units",
                amount, decimals
            ))
        })
}

pub struct TokenCatalog {
    ledger: Arc<dyn LedgerClient>,
    pipeline: Arc<SubmissionPipeline>,
    resolver: AccountResolver,
    escrow: EscrowProgram,
    metadata_program: Pubkey,
    addresses: AddressBook,
}

impl TokenCatalog {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        settings: SubmissionSettings,
        escrow_program: Pubkey,
        metadata_program: Pubkey,
    ) -> Self {
        Self::with_address_book(
            ledger,
            settings,
            escrow_program,
            metadata_program,
            AddressBook::new(),
        )
    }

    fn with_address_book(
        ledger: Arc<dyn LedgerClient>,
        settings: SubmissionSettings,
        escrow_program: Pubkey,
        metadata_program: Pubkey,
        addresses: AddressBook,
    ) -> Self {
        let pipeline = Arc::new(SubmissionPipeline::new(ledger.clone(), settings));
        let resolver = AccountResolver::new(ledger.clone(), pipeline.clone());
        Self {
            ledger,
            pipeline,
            resolver,
            escrow: EscrowProgram::new(escrow_program),
            metadata_program,
            addresses,
        }
    }

    /// Wire a catalog to the JSON-RPC gateway described by `config`
    pub fn from_config(config: &Config) -> TokenOpResult<Self> {
        let addresses = AddressBook::new();
        let escrow_program = addresses.parse(&config.escrow.program_id)?;
        let metadata_program = addresses.parse(&config.metadata.program_id)?;
        let commitment = CommitmentLevel::from(config.submission.commitment);

        let ledger = RpcLedger::new(config.rpc.endpoint.clone(), config.rpc.timeout(), commitment);
        info!(endpoint = %ledger.endpoint(), ?commitment, "Catalog connected");

        let settings = SubmissionSettings {
            commitment,
            confirm_timeout: config.submission.confirm_timeout(),
            poll_interval: config.submission.poll_interval(),
        };
        Ok(Self::with_address_book(
            Arc::new(ledger),
            settings,
            escrow_program,
            metadata_program,
            addresses,
        ))
    }

    pub fn pipeline(&self) -> &SubmissionPipeline {
        &self.pipeline
    }

    pub fn escrow(&self) -> &EscrowProgram {
        &self.escrow
    }

    /// Parse a caller-supplied address through the memo cache
    pub fn parse_address(&self, input: &str) -> TokenOpResult<Pubkey> {
        self.addresses.parse(input)
    }

    async fn run<T, F>(&self, operation: &'static str, body: F) -> TokenOpResult<T>
    where
        F: Future<Output = TokenOpResult<T>>,
    {
        let correlation_id = CorrelationId::new();
        let span = operation_span(operation, &correlation_id);
        let result = body.instrument(span.clone()).await;
        if let Err(err) = &result {
            metrics().operations_failed.inc();
            span.in_scope(|| warn!(category = err.category(), error = %err, "Operation failed"));
        }
        result
    }

    pub async fn resolve(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &dyn WalletSigner,
    ) -> TokenOpResult<SubAccount> {
        self.run("resolve", self.resolver.resolve(mint, owner, payer))
            .await
    }

    /// Create a new mint with the signer as mint and freeze authority
    ///
    /// On [`TokenOpError::TimedOut`] the error's `created` field holds the
    /// mint address, so a landed issuance can still be found.
    pub async fn issue_resource_class(
        &self,
        decimals: u8,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Pubkey> {
        self.issue_resource_class_with(decimals, signer, SubmitOptions::default())
            .await
    }

    pub async fn issue_resource_class_with(
        &self,
        decimals: u8,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Pubkey> {
        self.run("issue_resource_class", async {
            let issuer = signer.pubkey().ok_or(TokenOpError::NotConnected)?;
            let mint = Keypair::new();
            let mint_address = mint.pubkey();

            let rent = self
                .ledger
                .get_minimum_balance_for_rent_exemption(Mint::LEN)
                .await?;
            let instructions = create_mint_ixs(&issuer, &mint_address, &issuer, decimals, rent)?;
            let envelope = Envelope::build(instructions, issuer)?.with_co_signer(mint);

            let confirmation = self
                .pipeline
                .submit_with(envelope, signer, options)
                .await
                .map_err(|err| err.with_created(mint_address))?;
            info!(
                mint = %mint_address,
                decimals,
                signature = %confirmation.signature,
                "Resource class issued"
            );
            Ok(mint_address)
        })
        .await
    }

    pub async fn mint_units(
        &self,
        mint: &Pubkey,
        destination_owner: &Pubkey,
        amount: u64,
        decimals: u8,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.mint_units_with(
            mint,
            destination_owner,
            amount,
            decimals,
            signer,
            SubmitOptions::default(),
        )
        .await
    }

    pub async fn mint_units_with(
        &self,
        mint: &Pubkey,
        destination_owner: &Pubkey,
        amount: u64,
        decimals: u8,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        self.run("mint_units", async {
            let base_units = to_base_units(amount, decimals)?;
            let authority = signer.pubkey().ok_or(TokenOpError::NotConnected)?;
            self.check_decimals(mint, decimals).await?;

            let destination = self.resolver.resolve(mint, destination_owner, signer).await?;
            let ix =
                mint_to_checked_ix(mint, &destination.address, &authority, base_units, decimals)?;

            info!(mint = %mint, destination = %destination.address, base_units, "Minting");
            self.pipeline
                .submit_with(Envelope::build(vec![ix], authority)?, signer, options)
                .await
        })
        .await
    }

    /// Move units from `from`'s account to `to`'s, creating the destination if absent
    ///
    /// `from` must be the signer; the signer also pays for a new destination account.
    pub async fn transfer_units(
        &self,
        mint: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u64,
        decimals: u8,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.transfer_units_with(mint, from, to, amount, decimals, signer, SubmitOptions::default())
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn transfer_units_with(
        &self,
        mint: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u64,
        decimals: u8,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        self.run("transfer_units", async {
            let base_units = to_base_units(amount, decimals)?;
            require_signer_owner(signer, from)?;
            self.check_decimals(mint, decimals).await?;

            let source = self.resolver.resolve(mint, from, signer).await?;
            let destination = self.resolver.resolve(mint, to, signer).await?;
            let ix = transfer_checked_ix(
                &source.address,
                mint,
                &destination.address,
                from,
                base_units,
                decimals,
            )?;

            info!(
                mint = %mint,
                source = %source.address,
                destination = %destination.address,
                base_units,
                "Transferring"
            );
            self.pipeline
                .submit_with(Envelope::build(vec![ix], *from)?, signer, options)
                .await
        })
        .await
    }

    pub async fn burn_units(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
        amount: u64,
        decimals: u8,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.burn_units_with(mint, owner, amount, decimals, signer, SubmitOptions::default())
            .await
    }

    pub async fn burn_units_with(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
        amount: u64,
        decimals: u8,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        self.run("burn_units", async {
            let base_units = to_base_units(amount, decimals)?;
            require_signer_owner(signer, owner)?;
            self.check_decimals(mint, decimals).await?;

            let account = self.resolver.resolve(mint, owner, signer).await?;
            let ix = burn_checked_ix(&account.address, mint, owner, base_units, decimals)?;

            info!(mint = %mint, account = %account.address, base_units, "Burning");
            self.pipeline
                .submit_with(Envelope::build(vec![ix], *owner)?, signer, options)
                .await
        })
        .await
    }

    /// Ask the escrow program to lock the signer's holding of `mint`
    pub async fn lock_resource(
        &self,
        mint: &Pubkey,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.lock_resource_with(mint, signer, SubmitOptions::default())
            .await
    }

    pub async fn lock_resource_with(
        &self,
        mint: &Pubkey,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        self.run(
            "lock_resource",
            self.call_escrow(EscrowMethod::Lock, mint, signer, options),
        )
        .await
    }

    /// Ask the escrow program to release a previous lock
    pub async fn unlock_resource(
        &self,
        mint: &Pubkey,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.unlock_resource_with(mint, signer, SubmitOptions::default())
            .await
    }

    pub async fn unlock_resource_with(
        &self,
        mint: &Pubkey,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        self.run(
            "unlock_resource",
            self.call_escrow(EscrowMethod::Unlock, mint, signer, options),
        )
        .await
    }

    async fn call_escrow(
        &self,
        method: EscrowMethod,
        mint: &Pubkey,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        let owner = signer.pubkey().ok_or(TokenOpError::NotConnected)?;
        let owner_account = derive_associated_address(mint, &owner);
        let ix = self.escrow.instruction(method, &owner, &owner_account, mint)?;

        info!(method = method.name(), mint = %mint, owner = %owner, "Invoking escrow");
        self.invoke_program_with(ix.program_id, ix.accounts, ix.data, signer, options)
            .await
    }

    /// Opaque remote call into an on-ledger program
    pub async fn invoke_program(
        &self,
        program_id: Pubkey,
        accounts: Vec<AccountMeta>,
        data: Vec<u8>,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.invoke_program_with(program_id, accounts, data, signer, SubmitOptions::default())
            .await
    }

    pub async fn invoke_program_with(
        &self,
        program_id: Pubkey,
        accounts: Vec<AccountMeta>,
        data: Vec<u8>,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        let payer = signer.pubkey().ok_or(TokenOpError::NotConnected)?;
        let ix = Instruction {
            program_id,
            accounts,
            data,
        };
        self.pipeline
            .submit_with(Envelope::build(vec![ix], payer)?, signer, options)
            .await
    }

    pub async fn get_resource_class_info(&self, mint: &Pubkey) -> TokenOpResult<ResourceClassInfo> {
        self.run("get_resource_class_info", self.read_mint(mint))
            .await
    }

    async fn read_mint(&self, mint: &Pubkey) -> TokenOpResult<ResourceClassInfo> {
        let account = self
            .ledger
            .get_account(mint)
            .await?
            .ok_or(TokenOpError::AccountNotFound { address: *mint })?;
        if account.owner != spl_token::id() {
            return Err(TokenOpError::invalid_data(
                *mint,
                format!("owned by {} instead of the token program", account.owner),
            ));
        }

        let state = Mint::unpack_unchecked(&account.data)
            .map_err(|e| TokenOpError::invalid_data(*mint, e.to_string()))?;
        Ok(ResourceClassInfo {
            address: *mint,
            decimals: state.decimals,
            supply: state.supply,
            mint_authority: key_of(state.mint_authority),
            freeze_authority: key_of(state.freeze_authority),
            is_initialized: state.is_initialized,
        })
    }

    async fn check_decimals(&self, mint: &Pubkey, supplied: u8) -> TokenOpResult<()> {
        let info = self.read_mint(mint).await?;
        if !info.is_initialized {
            return Err(TokenOpError::invalid_data(*mint, "mint is not initialized"));
        }
        if info.decimals != supplied {
            return Err(TokenOpError::DecimalsMismatch {
                mint: *mint,
                expected: info.decimals,
                supplied,
            });
        }
        Ok(())
    }

    /// Native balance in lamports
    pub async fn get_balance(&self, address: &Pubkey) -> TokenOpResult<u64> {
        self.run("get_balance", self.ledger.get_balance(address)).await
    }

    /// Balance of `owner`'s account for `mint`, creating the account if absent
    pub async fn get_token_balance(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &dyn WalletSigner,
    ) -> TokenOpResult<TokenBalance> {
        self.run("get_token_balance", async {
            let info = self.read_mint(mint).await?;
            let account = self.resolver.resolve(mint, owner, payer).await?;
            Ok(TokenBalance {
                address: account.address,
                amount: account.amount,
                decimals: info.decimals,
                ui_amount: account.amount as f64 / 10f64.powi(i32::from(info.decimals)),
            })
        })
        .await
    }

    pub async fn transfer_native(
        &self,
        to: &Pubkey,
        lamports: u64,
        signer: &dyn WalletSigner,
    ) -> TokenOpResult<Confirmation> {
        self.transfer_native_with(to, lamports, signer, SubmitOptions::default())
            .await
    }

    pub async fn transfer_native_with(
        &self,
        to: &Pubkey,
        lamports: u64,
        signer: &dyn WalletSigner,
        options: SubmitOptions,
    ) -> TokenOpResult<Confirmation> {
        self.run("transfer_native", async {
            if lamports == 0 {
                return Err(TokenOpError::InvalidArgument(
                    "lamports must be greater than zero".to_string(),
                ));
            }
            let from = signer.pubkey().ok_or(TokenOpError::NotConnected)?;
            info!(from = %from, to = %to, lamports, "Sending native transfer");
            self.pipeline
                .submit_with(
                    Envelope::build(vec![native_transfer_ix(&from, to, lamports)], from)?,
                    signer,
                    options,
                )
                .await
        })
        .await
    }

    /// Token-metadata record address for `mint`
    pub fn metadata_address(&self, mint: &Pubkey) -> TokenOpResult<ProgramAddress> {
        derive_program_address(
            &[METADATA_SEED, self.metadata_program.as_ref(), mint.as_ref()],
            &self.metadata_program,
        )
    }

    /// Raw bytes of the metadata record for `mint`
    pub async fn get_metadata_raw(&self, mint: &Pubkey) -> TokenOpResult<Vec<u8>> {
        self.run("get_metadata_raw", async {
            let address = self.metadata_address(mint)?.address;
            self.ledger
                .get_account(&address)
                .await?
                .map(|account| account.data)
                .ok_or(TokenOpError::AccountNotFound { address })
        })
        .await
    }

    /// Re-query a submission, typically after [`TokenOpError::TimedOut`]
    pub async fn transaction_status(
        &self,
        signature: &Signature,
    ) -> TokenOpResult<TransactionState> {
        self.run("transaction_status", self.pipeline.requery(signature))
            .await
    }
}

fn key_of(authority: COption<Pubkey>) -> Option<Pubkey> {
    match authority {
        COption::Some(key) => Some(key),
        COption::None => None,
    }
}

fn require_signer_owner(signer: &dyn WalletSigner, owner: &Pubkey) -> TokenOpResult<()> {
    let key = signer.pubkey().ok_or(TokenOpError::NotConnected)?;
    if key != *owner {
        return Err(TokenOpError::InvalidArgument(format!(
            "owner {} is not the connected signer {}",
            owner, key
        )));
    }
    Ok(())
}
