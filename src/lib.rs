//! Token Ledger - associated-account resolution and transaction commit for SPL tokens
//!
//! Layers, leaf first:
//! - **address**: deterministic associated and program-derived addresses
//! - **resolver**: read, maybe-create, re-read of associated token accounts
//! - **tx_builder**: instruction builders and the atomic [`tx_builder::Envelope`]
//! - **submission**: sign once, send once, poll to a terminal commitment
//! - **catalog**: issue, mint, transfer, burn, lock and unlock
//!
//! The ledger gateway ([`rpc::LedgerClient`]) and the wallet
//! ([`signer::WalletSigner`]) are passed in as capabilities; nothing here
//! holds a global connection.

pub mod address;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod escrow;
pub mod metrics;
pub mod observability;
pub mod resolver;
pub mod rpc;
pub mod signer;
pub mod submission;
pub mod test_utils;
pub mod tx_builder;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use catalog::{ResourceClassInfo, TokenBalance, TokenCatalog};
pub use errors::{TokenOpError, TokenOpResult};
pub use resolver::SubAccount;
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
