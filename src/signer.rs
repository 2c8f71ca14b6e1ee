//! Wallet signing capability
//!
//! The crate never holds user keys directly in its operations: everything that
//! needs the caller's signature goes through [`WalletSigner`]. A signer with no
//! connected identity reports `None` from [`WalletSigner::pubkey`], which the
//! pipeline turns into [`TokenOpError::NotConnected`] before any network call.

use crate::errors::{TokenOpError, TokenOpResult};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::path::Path;
use zeroize::Zeroizing;

/// Capability that signs transactions on behalf of a wallet identity
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Connected identity, or `None` when no wallet is connected
    fn pubkey(&self) -> Option<Pubkey>;

    /// Add this identity's signature to `transaction`
    ///
    /// Signatures already present from co-signers must be preserved.
    /// Interactive signers return [`TokenOpError::UserRejected`] on refusal.
    async fn sign_transaction(&self, transaction: Transaction) -> TokenOpResult<Transaction>;
}

/// Signer holding a local keypair
pub struct LocalSigner {
    keypair: Keypair,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("pubkey", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Build from 64 raw secret+public key bytes
    pub fn from_bytes(bytes: &[u8]) -> TokenOpResult<Self> {
        if bytes.len() != 64 {
            return Err(TokenOpError::Signing(format!(
                "Invalid keypair length: expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        if bytes.iter().all(|&b| b == 0) {
            return Err(TokenOpError::Signing(
                "Invalid keypair: all-zero key rejected".to_string(),
            ));
        }
        let keypair = Keypair::try_from(bytes)
            .map_err(|e| TokenOpError::Signing(format!("Invalid keypair bytes: {}", e)))?;
        Ok(Self { keypair })
    }

    /// Load a keypair file, either the CLI's JSON byte array or 64 raw bytes
    pub fn from_keypair_file(path: impl AsRef<Path>) -> TokenOpResult<Self> {
        let path = path.as_ref();
        let raw = Zeroizing::new(std::fs::read(path).map_err(|e| {
            TokenOpError::Signing(format!(
                "Failed to read keypair file {}: {}",
                path.display(),
                e
            ))
        })?);

        if raw.len() == 64 {
            return Self::from_bytes(&raw);
        }

        let json: Zeroizing<Vec<u8>> =
            Zeroizing::new(serde_json::from_slice(&raw).map_err(|e| {
                TokenOpError::Signing(format!("Failed to parse keypair JSON: {}", e))
            })?);
        Self::from_bytes(&json)
    }

    /// Decode a base58-encoded 64-byte keypair
    pub fn from_base58(encoded: &str) -> TokenOpResult<Self> {
        let bytes = Zeroizing::new(
            bs58::decode(encoded.trim())
                .into_vec()
                .map_err(|e| TokenOpError::Signing(format!("Invalid base58 keypair: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[async_trait]
impl WalletSigner for LocalSigner {
    fn pubkey(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn sign_transaction(&self, mut transaction: Transaction) -> TokenOpResult<Transaction> {
        tokio::task::yield_now().await;
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| TokenOpError::Signing(e.to_string()))?;
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{hash::Hash, message::Message};
    use solana_system_interface::instruction as system_instruction;
    use std::io::Write;

    #[test]
    fn test_rejects_bad_lengths_and_zero_keys() {
        assert!(matches!(
            LocalSigner::from_bytes(&[1u8; 32]),
            Err(TokenOpError::Signing(_))
        ));
        assert!(matches!(
            LocalSigner::from_bytes(&[0u8; 64]),
            Err(TokenOpError::Signing(_))
        ));
    }

    #[test]
    fn test_loads_json_keypair_file() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let signer = LocalSigner::from_keypair_file(file.path()).unwrap();
        assert_eq!(signer.pubkey(), Some(keypair.pubkey()));
    }

    #[test]
    fn test_loads_base58_keypair() {
        let keypair = Keypair::new();
        let encoded = keypair.to_base58_string();
        let signer = LocalSigner::from_base58(&encoded).unwrap();
        assert_eq!(signer.pubkey(), Some(keypair.pubkey()));

        assert!(LocalSigner::from_base58("0OIl").is_err());
    }

    #[tokio::test]
    async fn test_sign_preserves_co_signatures() {
        let wallet = Keypair::new();
        let co_signer = Keypair::new();
        let ix = system_instruction::create_account(
            &wallet.pubkey(),
            &co_signer.pubkey(),
            1_000,
            0,
            &solana_system_interface::program::id(),
        );
        let blockhash = Hash::new_unique();
        let message = Message::new_with_blockhash(&[ix], Some(&wallet.pubkey()), &blockhash);
        let mut tx = Transaction::new_unsigned(message);
        tx.try_partial_sign(&[&co_signer], blockhash).unwrap();
        assert!(!tx.is_signed());

        let signer = LocalSigner::new(wallet);
        let signed = signer.sign_transaction(tx).await.unwrap();
        assert!(signed.is_signed());
        assert!(signed.verify().is_ok());
    }

    #[tokio::test]
    async fn test_sign_fails_for_foreign_transaction() {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        let message =
            Message::new_with_blockhash(&[ix], Some(&payer.pubkey()), &Hash::new_unique());
        let tx = Transaction::new_unsigned(message);

        let stranger = LocalSigner::new(Keypair::new());
        let result = stranger.sign_transaction(tx).await;
        assert!(matches!(result, Err(TokenOpError::Signing(_))));
    }
}
