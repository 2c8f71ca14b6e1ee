//! Ledger gateway boundary
//!
//! The core never holds a connection object of its own: every component that
//! reads from or submits to the ledger receives an `Arc<dyn LedgerClient>`.
//! [`RpcLedger`] is the JSON-RPC implementation; tests use the in-memory
//! ledger from `test_utils`.

use crate::errors::TokenOpResult;
use async_trait::async_trait;
use solana_commitment_config::CommitmentLevel;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};

pub mod rpc_errors;
pub mod rpc_ledger;

pub use rpc_errors::classify_client_error;
pub use rpc_ledger::{ReadRetryConfig, RpcLedger};

/// What the ledger currently reports for a submitted signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    /// Not (yet) visible to the gateway
    Unknown,
    /// Executed successfully and observed at the given commitment level
    Landed(CommitmentLevel),
    /// Executed and failed; carries the ledger's error payload verbatim
    Failed(String),
}

/// Calls the core makes on the ledger gateway
///
/// Reads are idempotent and implementations may retry them internally.
/// `send_transaction` must never be retried by an implementation: each
/// transaction carries a single-use blockhash, and a silent resend of a
/// transfer could apply it twice.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch an account, `None` if nothing exists at `address`
    async fn get_account(&self, address: &Pubkey) -> TokenOpResult<Option<Account>>;

    /// Native balance in lamports
    async fn get_balance(&self, address: &Pubkey) -> TokenOpResult<u64>;

    /// Blockhash used as the freshness token of a new transaction
    async fn get_latest_blockhash(&self) -> TokenOpResult<Hash>;

    /// Lamports required to keep an account of `data_len` bytes rent exempt
    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize)
        -> TokenOpResult<u64>;

    /// Submit a fully signed transaction, returning its signature
    async fn send_transaction(&self, transaction: &Transaction) -> TokenOpResult<Signature>;

    /// Current status of a previously submitted signature
    async fn get_transaction_status(&self, signature: &Signature)
        -> TokenOpResult<TransactionState>;
}
