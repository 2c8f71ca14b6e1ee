//! Test Utilities Module
//!
//! In-memory stand-ins for the ledger gateway and the wallet signer, so the
//! resolver, pipeline and catalog can be exercised deterministically with no
//! network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::address::derive_associated_address;
use crate::errors::{TokenOpError, TokenOpResult};
use crate::escrow::{EscrowMethod, EscrowProgram};
use crate::rpc::{LedgerClient, TransactionState};
use crate::signer::WalletSigner;
use async_trait::async_trait;
use solana_commitment_config::CommitmentLevel;
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use solana_system_interface::{instruction::SystemInstruction, program as system_program};
use spl_token::{
    instruction::TokenInstruction,
    solana_program::{program_option::COption, program_pack::Pack},
    state::{Account as TokenAccount, AccountState, Mint},
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Rent-exempt minimum under the default rent parameters
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (data_len as u64 + 128) * 6_960
}

fn token_account_data(mint: Pubkey, owner: Pubkey, amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; TokenAccount::LEN];
    TokenAccount {
        mint,
        owner,
        amount,
        state: AccountState::Initialized,
        ..TokenAccount::default()
    }
    .pack_into_slice(&mut data);
    data
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Pubkey, Account>,
    statuses: HashMap<Signature, TransactionState>,
    creations: HashMap<Pubkey, usize>,
    blockhashes: HashSet<Hash>,
    sent: usize,
    reject_next: Option<String>,
    hold_pending: bool,
    skip_preflight: bool,
    failing_status_reads: usize,
}

/// Ledger that applies transactions to an in-process account map
///
/// Interprets the system, SPL Token, associated-token and escrow
/// instructions this crate emits. A transaction either applies completely or
/// not at all. Every gateway call yields once before touching state, so
/// concurrently polled futures interleave the way remote calls would.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    landing_level: Mutex<CommitmentLevel>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            landing_level: Mutex::new(CommitmentLevel::Confirmed),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    pub fn airdrop(&self, to: &Pubkey, lamports: u64) {
        let mut state = self.state();
        let account = state
            .accounts
            .entry(*to)
            .or_insert_with(|| Account::new(0, 0, &system_program::id()));
        account.lamports += lamports;
    }

    pub fn set_account(&self, address: Pubkey, account: Account) {
        self.state().accounts.insert(address, account);
    }

    pub fn account(&self, address: &Pubkey) -> Option<Account> {
        self.state().accounts.get(address).cloned()
    }

    /// Create an initialized mint directly, bypassing transactions
    pub fn plant_mint(&self, decimals: u8, authority: &Pubkey) -> Pubkey {
        let address = Pubkey::new_unique();
        let mut data = vec![0u8; Mint::LEN];
        Mint {
            mint_authority: COption::Some(*authority),
            supply: 0,
            decimals,
            is_initialized: true,
            freeze_authority: COption::Some(*authority),
        }
        .pack_into_slice(&mut data);
        self.set_account(
            address,
            Account {
                lamports: rent_exempt_minimum(Mint::LEN),
                data,
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
        address
    }

    /// Write a token account at an arbitrary address, bypassing transactions
    pub fn plant_token_account(&self, address: Pubkey, mint: Pubkey, owner: Pubkey, amount: u64) {
        self.set_account(
            address,
            Account {
                lamports: rent_exempt_minimum(TokenAccount::LEN),
                data: token_account_data(mint, owner, amount),
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
    }

    pub fn lamports(&self, address: &Pubkey) -> u64 {
        self.account(address).map(|a| a.lamports).unwrap_or(0)
    }

    /// Token amount held at `address`, `None` if it is not a token account
    pub fn token_amount(&self, address: &Pubkey) -> Option<u64> {
        let account = self.account(address)?;
        if account.owner != spl_token::id() {
            return None;
        }
        TokenAccount::unpack(&account.data).ok().map(|a| a.amount)
    }

    /// Token balance of `owner`'s associated account for `mint`
    pub fn associated_amount(&self, mint: &Pubkey, owner: &Pubkey) -> Option<u64> {
        self.token_amount(&derive_associated_address(mint, owner))
    }

    /// Successful associated-account creations at `address`
    pub fn creations(&self, address: &Pubkey) -> usize {
        self.state().creations.get(address).copied().unwrap_or(0)
    }

    /// `send_transaction` calls received
    pub fn sent_count(&self) -> usize {
        self.state().sent
    }

    /// Refuse the next submission at ingestion with `detail`
    pub fn reject_next(&self, detail: impl Into<String>) {
        self.state().reject_next = Some(detail.into());
    }

    /// Accept submissions but never apply or report them
    pub fn hold_pending(&self, hold: bool) {
        self.state().hold_pending = hold;
    }

    /// With preflight off, execution errors surface through status polling
    pub fn set_preflight(&self, enabled: bool) {
        self.state().skip_preflight = !enabled;
    }

    /// Fail the next `count` status reads with a transport error
    pub fn fail_status_reads(&self, count: usize) {
        self.state().failing_status_reads = count;
    }

    /// Commitment level reported for landed transactions
    pub fn set_landing_level(&self, level: CommitmentLevel) {
        *self.landing_level.lock().unwrap() = level;
    }

    fn reject(signature: Option<Signature>, detail: impl Into<String>) -> TokenOpError {
        TokenOpError::rejected(signature, detail)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_account(&self, address: &Pubkey) -> TokenOpResult<Option<Account>> {
        tokio::task::yield_now().await;
        Ok(self.account(address))
    }

    async fn get_balance(&self, address: &Pubkey) -> TokenOpResult<u64> {
        tokio::task::yield_now().await;
        Ok(self.lamports(address))
    }

    async fn get_latest_blockhash(&self) -> TokenOpResult<Hash> {
        tokio::task::yield_now().await;
        let hash = Hash::new_unique();
        self.state().blockhashes.insert(hash);
        Ok(hash)
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> TokenOpResult<u64> {
        tokio::task::yield_now().await;
        Ok(rent_exempt_minimum(data_len))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> TokenOpResult<Signature> {
        tokio::task::yield_now().await;
        let landing_level = *self.landing_level.lock().unwrap();
        let mut state = self.state();
        state.sent += 1;

        let signature = transaction.signatures.first().copied().unwrap_or_default();
        if let Some(detail) = state.reject_next.take() {
            return Err(Self::reject(Some(signature), detail));
        }
        if !state.blockhashes.contains(&transaction.message.recent_blockhash) {
            return Err(Self::reject(Some(signature), "Blockhash not found"));
        }
        if transaction.verify().is_err() || !transaction.is_signed() {
            return Err(Self::reject(Some(signature), "Transaction signature verification failure"));
        }
        if state.statuses.contains_key(&signature) {
            return Err(Self::reject(Some(signature), "AlreadyProcessed"));
        }

        if state.hold_pending {
            state.statuses.insert(signature, TransactionState::Unknown);
            return Ok(signature);
        }

        match Execution::run(&state.accounts, transaction) {
            Ok(execution) => {
                state.accounts = execution.accounts;
                for address in execution.created {
                    *state.creations.entry(address).or_insert(0) += 1;
                }
                state
                    .statuses
                    .insert(signature, TransactionState::Landed(landing_level));
                Ok(signature)
            }
            Err(detail) if state.skip_preflight => {
                state.statuses.insert(signature, TransactionState::Failed(detail));
                Ok(signature)
            }
            Err(detail) => Err(Self::reject(
                Some(signature),
                format!("Transaction simulation failed: {}", detail),
            )),
        }
    }

    async fn get_transaction_status(
        &self,
        signature: &Signature,
    ) -> TokenOpResult<TransactionState> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if state.failing_status_reads > 0 {
            state.failing_status_reads -= 1;
            return Err(TokenOpError::Rpc("connection reset by peer".to_string()));
        }
        Ok(state
            .statuses
            .get(signature)
            .cloned()
            .unwrap_or(TransactionState::Unknown))
    }
}

/// Working copy of the account map for one transaction
struct Execution {
    accounts: HashMap<Pubkey, Account>,
    signers: HashSet<Pubkey>,
    created: Vec<Pubkey>,
}

type ExecResult<T> = Result<T, String>;

fn key_at(keys: &[Pubkey], index: usize) -> ExecResult<Pubkey> {
    keys.get(index)
        .copied()
        .ok_or_else(|| format!("missing account at index {}", index))
}

impl Execution {
    fn run(accounts: &HashMap<Pubkey, Account>, transaction: &Transaction) -> ExecResult<Self> {
        let message = &transaction.message;
        let required = message.header.num_required_signatures as usize;
        let mut execution = Self {
            accounts: accounts.clone(),
            signers: message.account_keys.iter().take(required).copied().collect(),
            created: Vec::new(),
        };

        for (index, ix) in message.instructions.iter().enumerate() {
            let program_id = key_at(&message.account_keys, ix.program_id_index as usize)?;
            let keys = ix
                .accounts
                .iter()
                .map(|i| key_at(&message.account_keys, *i as usize))
                .collect::<ExecResult<Vec<_>>>()?;
            execution
                .apply(program_id, &keys, &ix.data)
                .map_err(|e| format!("Error processing Instruction {}: {}", index, e))?;
        }
        Ok(execution)
    }

    fn apply(&mut self, program_id: Pubkey, keys: &[Pubkey], data: &[u8]) -> ExecResult<()> {
        if program_id == system_program::id() {
            self.apply_system(keys, data)
        } else if program_id == spl_token::id() {
            self.apply_token(keys, data)
        } else if program_id == spl_associated_token_account::id() {
            self.apply_associated(keys, data)
        } else if let Some(method) = EscrowProgram::decode_method(data) {
            self.apply_escrow(program_id, method, keys, data)
        } else {
            Err(format!("unsupported program {}", program_id))
        }
    }

    fn require_signer(&self, key: &Pubkey) -> ExecResult<()> {
        if self.signers.contains(key) {
            Ok(())
        } else {
            Err(format!("missing required signature for {}", key))
        }
    }

    fn debit(&mut self, key: &Pubkey, lamports: u64) -> ExecResult<()> {
        let account = self
            .accounts
            .get_mut(key)
            .ok_or_else(|| {
                format!(
                    "attempt to debit an account but found no record of a prior credit: {}",
                    key
                )
            })?;
        account.lamports = account
            .lamports
            .checked_sub(lamports)
            .ok_or_else(|| format!("insufficient lamports in {}", key))?;
        Ok(())
    }

    fn credit(&mut self, key: &Pubkey, lamports: u64) {
        self.accounts
            .entry(*key)
            .or_insert_with(|| Account::new(0, 0, &system_program::id()))
            .lamports += lamports;
    }

    fn read_mint(&self, key: &Pubkey) -> ExecResult<Mint> {
        let account = self
            .accounts
            .get(key)
            .filter(|a| a.owner == spl_token::id())
            .ok_or_else(|| format!("invalid mint {}", key))?;
        Mint::unpack(&account.data).map_err(|e| e.to_string())
    }

    fn write_mint(&mut self, key: &Pubkey, mint: Mint) -> ExecResult<()> {
        let account = self
            .accounts
            .get_mut(key)
            .ok_or_else(|| format!("invalid mint {}", key))?;
        Mint::pack(mint, &mut account.data).map_err(|e| e.to_string())
    }

    fn read_token(&self, key: &Pubkey) -> ExecResult<TokenAccount> {
        let account = self
            .accounts
            .get(key)
            .filter(|a| a.owner == spl_token::id())
            .ok_or_else(|| format!("invalid token account {}", key))?;
        TokenAccount::unpack(&account.data).map_err(|e| e.to_string())
    }

    fn write_token(&mut self, key: &Pubkey, state: TokenAccount) -> ExecResult<()> {
        let account = self
            .accounts
            .get_mut(key)
            .ok_or_else(|| format!("invalid token account {}", key))?;
        TokenAccount::pack(state, &mut account.data).map_err(|e| e.to_string())
    }

    /// Allocate a token account, keeping lamports already sent to the address
    fn create_token_account(
        &mut self,
        payer: &Pubkey,
        address: &Pubkey,
        mint: Pubkey,
        owner: Pubkey,
    ) -> ExecResult<()> {
        let rent = rent_exempt_minimum(TokenAccount::LEN);
        let existing = match self.accounts.get(address) {
            Some(a) if a.owner != system_program::id() || !a.data.is_empty() => {
                return Err(format!("account {} already in use", address))
            }
            Some(a) => a.lamports,
            None => 0,
        };
        self.debit(payer, rent.saturating_sub(existing))?;
        self.accounts.insert(
            *address,
            Account {
                lamports: rent.max(existing),
                data: token_account_data(mint, owner, 0),
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
        Ok(())
    }

    fn apply_system(&mut self, keys: &[Pubkey], data: &[u8]) -> ExecResult<()> {
        let instruction: SystemInstruction =
            bincode::deserialize(data).map_err(|e| format!("invalid system instruction: {}", e))?;
        match instruction {
            SystemInstruction::CreateAccount {
                lamports,
                space,
                owner,
            } => {
                let (funder, new) = (key_at(keys, 0)?, key_at(keys, 1)?);
                self.require_signer(&funder)?;
                self.require_signer(&new)?;
                if self
                    .accounts
                    .get(&new)
                    .is_some_and(|a| a.lamports > 0 || !a.data.is_empty())
                {
                    return Err(format!("account {} already in use", new));
                }
                self.debit(&funder, lamports)?;
                self.accounts
                    .insert(new, Account::new(lamports, space as usize, &owner));
                Ok(())
            }
            SystemInstruction::Transfer { lamports } => {
                let (from, to) = (key_at(keys, 0)?, key_at(keys, 1)?);
                self.require_signer(&from)?;
                self.debit(&from, lamports)?;
                self.credit(&to, lamports);
                Ok(())
            }
            other => Err(format!("unsupported system instruction {:?}", other)),
        }
    }

    fn apply_token(&mut self, keys: &[Pubkey], data: &[u8]) -> ExecResult<()> {
        let instruction = TokenInstruction::unpack(data).map_err(|e| e.to_string())?;
        match instruction {
            TokenInstruction::InitializeMint {
                decimals,
                mint_authority,
                freeze_authority,
            }
            | TokenInstruction::InitializeMint2 {
                decimals,
                mint_authority,
                freeze_authority,
            } => {
                let address = key_at(keys, 0)?;
                let account = self
                    .accounts
                    .get(&address)
                    .filter(|a| a.owner == spl_token::id() && a.data.len() == Mint::LEN)
                    .ok_or_else(|| format!("invalid mint account {}", address))?;
                let current = Mint::unpack_unchecked(&account.data).map_err(|e| e.to_string())?;
                if current.is_initialized {
                    return Err("mint already initialized".to_string());
                }
                self.write_mint(
                    &address,
                    Mint {
                        mint_authority: COption::Some(mint_authority),
                        supply: 0,
                        decimals,
                        is_initialized: true,
                        freeze_authority,
                    },
                )
            }
            TokenInstruction::MintToChecked { amount, decimals } => {
                let (mint_key, dest_key, authority) =
                    (key_at(keys, 0)?, key_at(keys, 1)?, key_at(keys, 2)?);
                self.require_signer(&authority)?;
                let mut mint = self.read_mint(&mint_key)?;
                if mint.decimals != decimals {
                    return Err("custom program error: 0x12".to_string());
                }
                if mint.mint_authority != COption::Some(authority) {
                    return Err("owner does not match".to_string());
                }
                let mut dest = self.read_token(&dest_key)?;
                if dest.mint != mint_key || dest.state == AccountState::Frozen {
                    return Err("invalid destination account".to_string());
                }
                mint.supply = mint.supply.checked_add(amount).ok_or("overflow")?;
                dest.amount = dest.amount.checked_add(amount).ok_or("overflow")?;
                self.write_mint(&mint_key, mint)?;
                self.write_token(&dest_key, dest)
            }
            TokenInstruction::TransferChecked { amount, decimals } => {
                let (source_key, mint_key, dest_key, owner) = (
                    key_at(keys, 0)?,
                    key_at(keys, 1)?,
                    key_at(keys, 2)?,
                    key_at(keys, 3)?,
                );
                self.require_signer(&owner)?;
                let mint = self.read_mint(&mint_key)?;
                if mint.decimals != decimals {
                    return Err("custom program error: 0x12".to_string());
                }
                let mut source = self.read_token(&source_key)?;
                if source.owner != owner {
                    return Err("owner does not match".to_string());
                }
                if source.mint != mint_key {
                    return Err("account not associated with this mint".to_string());
                }
                if source.amount < amount {
                    return Err("insufficient funds".to_string());
                }
                source.amount -= amount;
                self.write_token(&source_key, source)?;

                let mut dest = self.read_token(&dest_key)?;
                if dest.mint != mint_key {
                    return Err("account not associated with this mint".to_string());
                }
                dest.amount = dest.amount.checked_add(amount).ok_or("overflow")?;
                self.write_token(&dest_key, dest)
            }
            TokenInstruction::BurnChecked { amount, decimals } => {
                let (account_key, mint_key, owner) =
                    (key_at(keys, 0)?, key_at(keys, 1)?, key_at(keys, 2)?);
                self.require_signer(&owner)?;
                let mut mint = self.read_mint(&mint_key)?;
                if mint.decimals != decimals {
                    return Err("custom program error: 0x12".to_string());
                }
                let mut account = self.read_token(&account_key)?;
                if account.owner != owner {
                    return Err("owner does not match".to_string());
                }
                if account.amount < amount {
                    return Err("insufficient funds".to_string());
                }
                account.amount -= amount;
                mint.supply = mint.supply.saturating_sub(amount);
                self.write_token(&account_key, account)?;
                self.write_mint(&mint_key, mint)
            }
            other => Err(format!("unsupported token instruction {:?}", other)),
        }
    }

    fn apply_associated(&mut self, keys: &[Pubkey], data: &[u8]) -> ExecResult<()> {
        let idempotent = match data.first() {
            None | Some(0) => false,
            Some(1) => true,
            Some(tag) => return Err(format!("unsupported associated-token instruction {}", tag)),
        };
        let (payer, address, wallet, mint) = (
            key_at(keys, 0)?,
            key_at(keys, 1)?,
            key_at(keys, 2)?,
            key_at(keys, 3)?,
        );
        self.require_signer(&payer)?;
        if address != derive_associated_address(&mint, &wallet) {
            return Err("associated address does not match seed derivation".to_string());
        }
        self.read_mint(&mint)?;

        if self.read_token(&address).is_ok() {
            return if idempotent {
                Ok(())
            } else {
                Err(format!("account {} already in use", address))
            };
        }
        self.create_token_account(&payer, &address, mint, wallet)?;
        self.created.push(address);
        Ok(())
    }

    fn apply_escrow(
        &mut self,
        program_id: Pubkey,
        method: EscrowMethod,
        keys: &[Pubkey],
        data: &[u8],
    ) -> ExecResult<()> {
        let signer = key_at(keys, 0)?;
        let owner_account = key_at(keys, 1)?;
        let mint = key_at(keys, 2)?;
        self.require_signer(&signer)?;

        let expected = EscrowProgram::new(program_id)
            .derive_addresses(&mint)
            .map_err(|e| e.to_string())?;
        if key_at(keys, 3)? != expected.exchange.address
            || key_at(keys, 4)? != expected.configuration.address
            || key_at(keys, 5)? != expected.locked_holding.address
        {
            return Err("A seeds constraint was violated".to_string());
        }
        if data.get(8..11)
            != Some(&[
                expected.configuration.bump,
                expected.exchange.bump,
                expected.locked_holding.bump,
            ][..])
        {
            return Err("bump seed mismatch".to_string());
        }

        let exchange = expected.exchange.address;
        let locked = expected.locked_holding.address;
        let is_locked = self
            .accounts
            .get(&exchange)
            .is_some_and(|a| a.data.first() == Some(&1));

        let mut holder = self.read_token(&owner_account)?;
        if holder.owner != signer || holder.mint != mint {
            return Err("owner account constraint violated".to_string());
        }

        match method {
            EscrowMethod::Lock => {
                if is_locked {
                    return Err("resource already locked".to_string());
                }
                if holder.amount == 0 {
                    return Err("nothing to lock".to_string());
                }
                if self.read_token(&locked).is_err() {
                    self.create_token_account(&signer, &locked, mint, locked)?;
                }
                let mut holding = self.read_token(&locked)?;
                holding.amount += holder.amount;
                holder.amount = 0;
                self.write_token(&locked, holding)?;
                self.write_token(&owner_account, holder)?;
            }
            EscrowMethod::Unlock => {
                if !is_locked {
                    return Err("resource is not locked".to_string());
                }
                let mut holding = self.read_token(&locked)?;
                holder.amount += holding.amount;
                holding.amount = 0;
                self.write_token(&locked, holding)?;
                self.write_token(&owner_account, holder)?;
            }
        }

        let flag = u8::from(method == EscrowMethod::Lock);
        let record = self
            .accounts
            .entry(exchange)
            .or_insert_with(|| Account::new(rent_exempt_minimum(1), 1, &program_id));
        record.data = vec![flag];
        record.owner = program_id;
        Ok(())
    }
}

/// How a [`MockSigner`] answers signing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockBehavior {
    Approve,
    Reject,
}

/// Wallet signer double: connected, disconnected, or always refusing
pub struct MockSigner {
    keypair: Option<Keypair>,
    behavior: MockBehavior,
    requests: AtomicUsize,
}

impl MockSigner {
    pub fn connected(keypair: Keypair) -> Self {
        Self {
            keypair: Some(keypair),
            behavior: MockBehavior::Approve,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            keypair: None,
            behavior: MockBehavior::Approve,
            requests: AtomicUsize::new(0),
        }
    }

    /// Identity is connected but every request is declined
    pub fn rejecting(keypair: Keypair) -> Self {
        Self {
            keypair: Some(keypair),
            behavior: MockBehavior::Reject,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn sign_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    fn pubkey(&self) -> Option<Pubkey> {
        self.keypair.as_ref().map(|k| k.pubkey())
    }

    async fn sign_transaction(&self, mut transaction: Transaction) -> TokenOpResult<Transaction> {
        tokio::task::yield_now().await;
        self.requests.fetch_add(1, Ordering::SeqCst);
        let keypair = self.keypair.as_ref().ok_or(TokenOpError::NotConnected)?;
        if self.behavior == MockBehavior::Reject {
            return Err(TokenOpError::UserRejected);
        }
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[keypair], blockhash)
            .map_err(|e| TokenOpError::Signing(e.to_string()))?;
        Ok(transaction)
    }
}
