//! Associated-account and program-address derivation

use crate::errors::{TokenOpError, TokenOpResult};
use solana_sdk::pubkey::{Pubkey, PubkeyError, MAX_SEEDS, MAX_SEED_LEN};
use spl_associated_token_account::get_associated_token_address_with_program_id;

/// A program-derived address together with the bump seed that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramAddress {
    pub address: Pubkey,
    pub bump: u8,
}

/// Address of the associated token account holding `mint` for `owner`
///
/// Hashes the associated-token program id, the owner, the token program id and
/// the mint. Identical inputs always yield the identical address.
#[inline]
#[must_use]
pub fn derive_associated_address(mint: &Pubkey, owner: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(owner, mint, &spl_token::id())
}

/// Find the canonical program-derived address for `seeds` under `program_id`
///
/// Appends a single bump byte to `seeds`, trying 255 down to 0, and returns
/// the first candidate that falls off the ed25519 curve.
///
/// # Errors
///
/// - `InvalidArgument` if there are too many seeds or a seed is too long
/// - `NoValidAddress` if all 256 candidates land on the curve
pub fn derive_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> TokenOpResult<ProgramAddress> {
    // One slot is reserved for the bump seed
    if seeds.len() >= MAX_SEEDS {
        return Err(TokenOpError::InvalidArgument(format!(
            "{} seeds supplied, at most {} allowed",
            seeds.len(),
            MAX_SEEDS - 1
        )));
    }
    if let Some(seed) = seeds.iter().find(|seed| seed.len() > MAX_SEED_LEN) {
        return Err(TokenOpError::InvalidArgument(format!(
            "seed of {} bytes exceeds the {} byte limit",
            seed.len(),
            MAX_SEED_LEN
        )));
    }

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut candidate: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        candidate.extend_from_slice(seeds);
        candidate.push(&bump_seed);

        match Pubkey::create_program_address(&candidate, program_id) {
            Ok(address) => return Ok(ProgramAddress { address, bump }),
            // On-curve candidate, try the next bump
            Err(PubkeyError::InvalidSeeds) => continue,
            Err(e) => {
                return Err(TokenOpError::InvalidArgument(format!(
                    "program address derivation failed: {}",
                    e
                )))
            }
        }
    }

    Err(TokenOpError::NoValidAddress {
        program_id: *program_id,
    })
}
