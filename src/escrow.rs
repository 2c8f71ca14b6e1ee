//! Escrow program call contract
//!
//! The escrow program owns the lock/unlock state machine. This module only
//! knows where its records live and how to encode a call; current lock state
//! must be read from the exchange record.

use crate::address::{derive_program_address, ProgramAddress};
use crate::errors::TokenOpResult;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    sysvar,
};
use solana_system_interface::program as system_program;

/// Seed of the global configuration record, and suffix of per-mint exchange records
pub const EXCHANGE_SEED: &[u8] = b"exchange";
/// Suffix of the per-mint locked holding account
pub const LOCKED_SEED: &[u8] = b"locked";

/// Remote procedures exposed by the escrow program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowMethod {
    Lock,
    Unlock,
}

impl EscrowMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

/// Program-derived records the escrow program keeps for one mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowAddresses {
    pub configuration: ProgramAddress,
    pub exchange: ProgramAddress,
    pub locked_holding: ProgramAddress,
}

/// Anchor-style method discriminator: first 8 bytes of `sha256("global:<name>")`
pub fn sighash(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowProgram {
    program_id: Pubkey,
}

impl EscrowProgram {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn derive_addresses(&self, mint: &Pubkey) -> TokenOpResult<EscrowAddresses> {
        let configuration = derive_program_address(&[EXCHANGE_SEED], &self.program_id)?;
        let exchange = derive_program_address(&[mint.as_ref(), EXCHANGE_SEED], &self.program_id)?;
        let locked_holding =
            derive_program_address(&[mint.as_ref(), LOCKED_SEED], &self.program_id)?;
        Ok(EscrowAddresses {
            configuration,
            exchange,
            locked_holding,
        })
    }

    /// Instruction data: discriminator followed by the three bump seeds
    pub fn encode_args(method: EscrowMethod, addresses: &EscrowAddresses) -> Vec<u8> {
        let mut data = Vec::with_capacity(11);
        data.extend_from_slice(&sighash(method.name()));
        data.push(addresses.configuration.bump);
        data.push(addresses.exchange.bump);
        data.push(addresses.locked_holding.bump);
        data
    }

    /// Accounts in the order the program expects, shared by lock and unlock
    pub fn accounts(
        signer: &Pubkey,
        owner_account: &Pubkey,
        mint: &Pubkey,
        addresses: &EscrowAddresses,
    ) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(*signer, true),
            AccountMeta::new(*owner_account, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(addresses.exchange.address, false),
            AccountMeta::new(addresses.configuration.address, false),
            AccountMeta::new(addresses.locked_holding.address, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ]
    }

    pub fn instruction(
        &self,
        method: EscrowMethod,
        signer: &Pubkey,
        owner_account: &Pubkey,
        mint: &Pubkey,
    ) -> TokenOpResult<Instruction> {
        let addresses = self.derive_addresses(mint)?;
        Ok(Instruction {
            program_id: self.program_id,
            accounts: Self::accounts(signer, owner_account, mint, &addresses),
            data: Self::encode_args(method, &addresses),
        })
    }

    /// Which method an instruction's data invokes, if any
    pub fn decode_method(data: &[u8]) -> Option<EscrowMethod> {
        let tag = data.get(..8)?;
        [EscrowMethod::Lock, EscrowMethod::Unlock]
            .into_iter()
            .find(|method| sighash(method.name()) == tag)
    }
}
