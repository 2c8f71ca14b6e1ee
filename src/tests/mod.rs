//! Cross-module scenario tests driving the catalog against the in-memory ledger

mod escrow_tests;
mod helpers;
