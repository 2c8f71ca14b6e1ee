//! Memoizing parser for caller-supplied address strings

use crate::errors::{TokenOpError, TokenOpResult};
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Parse a base58 address string
///
/// Fails fast with `InvalidAddressFormat`; no network call is involved.
pub fn parse_address(input: &str) -> TokenOpResult<Pubkey> {
    Pubkey::from_str(input).map_err(|_| TokenOpError::invalid_address(input))
}

/// Concurrent string → address memo cache
///
/// Keyed by the raw input string. Entries are pure function results, so the
/// cache is never invalidated and a miss simply recomputes. Safe to share
/// across tasks behind an `Arc`.
#[derive(Debug, Default)]
pub struct AddressBook {
    entries: DashMap<String, Pubkey>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `input`, reusing a previous result for the same raw string
    pub fn parse(&self, input: &str) -> TokenOpResult<Pubkey> {
        if let Some(hit) = self.entries.get(input) {
            return Ok(*hit);
        }
        let address = parse_address(input)?;
        self.entries.insert(input.to_string(), address);
        Ok(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
