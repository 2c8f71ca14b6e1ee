//! Atomic instruction batch

use crate::errors::{TokenOpError, TokenOpResult};
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};

/// Ordered instructions committed all-or-nothing, plus who pays and who co-signs
///
/// Order is preserved exactly as given; later instructions may depend on
/// state written by earlier ones. Co-signers are keypairs generated locally
/// (a fresh mint, for instance) that must sign before the wallet does.
pub struct Envelope {
    fee_payer: Pubkey,
    instructions: Vec<Instruction>,
    co_signers: Vec<Keypair>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let co_signers: Vec<Pubkey> = self.co_signers.iter().map(|k| k.pubkey()).collect();
        f.debug_struct("Envelope")
            .field("fee_payer", &self.fee_payer)
            .field("instructions", &self.instructions.len())
            .field("co_signers", &co_signers)
            .finish()
    }
}

impl Envelope {
    pub fn build(instructions: Vec<Instruction>, fee_payer: Pubkey) -> TokenOpResult<Self> {
        if instructions.is_empty() {
            return Err(TokenOpError::InvalidArgument(
                "envelope must contain at least one instruction".to_string(),
            ));
        }
        Ok(Self {
            fee_payer,
            instructions,
            co_signers: Vec::new(),
        })
    }

    pub fn with_co_signer(mut self, keypair: Keypair) -> Self {
        self.co_signers.push(keypair);
        self
    }

    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn co_signer_keys(&self) -> Vec<Pubkey> {
        self.co_signers.iter().map(|k| k.pubkey()).collect()
    }

    /// Every key whose signature the compiled message will demand, fee payer first
    pub fn required_signers(&self) -> Vec<Pubkey> {
        let message = Message::new(&self.instructions, Some(&self.fee_payer));
        let count = message.header.num_required_signatures as usize;
        message.account_keys.into_iter().take(count).collect()
    }

    /// Bind the freshness token and hand back the unsigned transaction with its co-signers
    pub fn into_transaction(self, blockhash: Hash) -> (Transaction, Vec<Keypair>) {
        let message =
            Message::new_with_blockhash(&self.instructions, Some(&self.fee_payer), &blockhash);
        (Transaction::new_unsigned(message), self.co_signers)
    }
}
