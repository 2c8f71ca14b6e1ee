//! Deterministic address derivation
//!
//! Pure functions, no I/O:
//! - **derive**: associated token account addresses and program-derived
//!   addresses (bounded bump-seed search)
//! - **book**: memoizing parser for caller-supplied base58 address strings
//!
//! Every address produced here is re-derivable from its inputs alone, which is
//! what lets the resolver find an account without any registry or index.

pub mod book;
pub mod derive;

pub use book::{parse_address, AddressBook};
pub use derive::{derive_associated_address, derive_program_address, ProgramAddress};
