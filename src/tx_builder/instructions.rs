//! Instruction builders
//!
//! Thin wrappers over the system, SPL Token and associated-token program
//! builders. Every token movement uses the decimals-checked variant so the
//! ledger itself rejects a stale decimals value.

use crate::errors::{TokenOpError, TokenOpResult};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use solana_system_interface::instruction as system_instruction;
use spl_token::{solana_program::program_pack::Pack, state::Mint};

const TOKEN_PROGRAM: &str = "spl_token";

/// Create the associated token account for (`mint`, `owner`), paid by `payer`
///
/// Non-idempotent variant: fails on the ledger if the account already exists.
/// The resolver absorbs that failure and re-reads.
pub fn create_associated_account_ix(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    spl_associated_token_account::instruction::create_associated_token_account(
        payer,
        owner,
        mint,
        &spl_token::id(),
    )
}

/// Allocate and initialize a new mint
///
/// Returns `[create_account, initialize_mint]`. `mint` must co-sign.
pub fn create_mint_ixs(
    payer: &Pubkey,
    mint: &Pubkey,
    authority: &Pubkey,
    decimals: u8,
    rent_lamports: u64,
) -> TokenOpResult<Vec<Instruction>> {
    let create = system_instruction::create_account(
        payer,
        mint,
        rent_lamports,
        Mint::LEN as u64,
        &spl_token::id(),
    );
    let initialize = spl_token::instruction::initialize_mint(
        &spl_token::id(),
        mint,
        authority,
        Some(authority),
        decimals,
    )
    .map_err(|e| TokenOpError::instruction_failed(TOKEN_PROGRAM, e))?;

    Ok(vec![create, initialize])
}

pub fn mint_to_checked_ix(
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> TokenOpResult<Instruction> {
    spl_token::instruction::mint_to_checked(
        &spl_token::id(),
        mint,
        destination,
        authority,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| TokenOpError::instruction_failed(TOKEN_PROGRAM, e))
}

pub fn transfer_checked_ix(
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> TokenOpResult<Instruction> {
    spl_token::instruction::transfer_checked(
        &spl_token::id(),
        source,
        mint,
        destination,
        owner,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| TokenOpError::instruction_failed(TOKEN_PROGRAM, e))
}

pub fn burn_checked_ix(
    account: &Pubkey,
    mint: &Pubkey,
    owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> TokenOpResult<Instruction> {
    spl_token::instruction::burn_checked(
        &spl_token::id(),
        account,
        mint,
        owner,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| TokenOpError::instruction_failed(TOKEN_PROGRAM, e))
}

pub fn native_transfer_ix(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(from, to, lamports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::derive_associated_address;
    use spl_token::instruction::TokenInstruction;
    use spl_token::solana_program::program_option::COption;

    #[test]
    fn test_create_associated_account_targets_derived_address() {
        let payer = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let ix = create_associated_account_ix(&payer, &owner, &mint);
        assert_eq!(ix.program_id, spl_associated_token_account::id());
        assert_eq!(ix.accounts[0].pubkey, payer);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[1].pubkey, derive_associated_address(&mint, &owner));
    }

    #[test]
    fn test_create_mint_sizes_account_and_sets_authorities() {
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ixs = create_mint_ixs(&payer, &mint, &payer, 9, 1_461_600).unwrap();
        assert_eq!(ixs.len(), 2);
        assert_eq!(ixs[0].program_id, solana_system_interface::program::id());
        assert_eq!(ixs[1].program_id, spl_token::id());

        match TokenInstruction::unpack(&ixs[1].data).unwrap() {
            TokenInstruction::InitializeMint {
                decimals,
                mint_authority,
                freeze_authority,
            } => {
                assert_eq!(decimals, 9);
                assert_eq!(mint_authority, payer);
                assert_eq!(freeze_authority, COption::Some(payer));
            }
            other => panic!("unexpected instruction: {:?}", other),
        }
    }

    #[test]
    fn test_token_movements_are_decimals_checked() {
        let (a, b, c) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());

        let mint = mint_to_checked_ix(&a, &b, &c, 5, 6).unwrap();
        assert!(matches!(
            TokenInstruction::unpack(&mint.data).unwrap(),
            TokenInstruction::MintToChecked { amount: 5, decimals: 6 }
        ));

        let transfer = transfer_checked_ix(&a, &b, &c, &a, 7, 6).unwrap();
        assert!(matches!(
            TokenInstruction::unpack(&transfer.data).unwrap(),
            TokenInstruction::TransferChecked { amount: 7, decimals: 6 }
        ));

        let burn = burn_checked_ix(&a, &b, &c, 3, 6).unwrap();
        assert!(matches!(
            TokenInstruction::unpack(&burn.data).unwrap(),
            TokenInstruction::BurnChecked { amount: 3, decimals: 6 }
        ));
    }
}
