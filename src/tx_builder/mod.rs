//! Transaction building
//!
//! - **instructions**: stateless builders for every instruction the catalog emits
//! - **envelope**: ordered instruction batch plus fee payer and co-signers
//!
//! Building never talks to the network. The blockhash is bound only when the
//! submission pipeline turns an [`Envelope`] into a transaction.

pub mod envelope;
pub mod instructions;

pub use envelope::Envelope;
pub use instructions::{
    burn_checked_ix, create_associated_account_ix, create_mint_ixs, mint_to_checked_ix,
    native_transfer_ix, transfer_checked_ix,
};
