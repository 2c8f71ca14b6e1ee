//! Error types for token operations
//!
//! Every public operation of this crate returns either a concrete value or one
//! [`TokenOpError`]. No untyped failure crosses the crate boundary.
//!
//! Two variants carry caller obligations that differ from a plain failure:
//! - [`TokenOpError::TimedOut`]: the transaction may still land. Re-query the
//!   signature before doing anything else; never resubmit blindly.
//! - [`TokenOpError::SubmissionRejected`]: the ledger refused or reverted the
//!   transaction. It must be rebuilt (fresh blockhash) to be tried again.

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

/// Result alias used throughout the crate
pub type TokenOpResult<T> = std::result::Result<T, TokenOpError>;

/// Classified failure of a token operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenOpError {
    /// The wallet signer has no connected identity
    #[error("Signer not connected")]
    NotConnected,

    /// A caller-supplied address string did not parse
    #[error("Invalid address format: {input:?}")]
    InvalidAddressFormat { input: String },

    /// A resolved associated account does not belong to the expected mint/owner
    ///
    /// Indicates corrupted ledger state or an adversarial account. Never repaired.
    #[error("Account integrity violated at {address}: {reason}")]
    AccountIntegrity { address: Pubkey, reason: String },

    /// The program-address search exhausted all 256 bump seeds
    #[error("No valid program address found under program {program_id}")]
    NoValidAddress { program_id: Pubkey },

    /// The ledger refused the transaction at ingestion or reported an execution error
    ///
    /// `detail` is the ledger's payload, passed through verbatim.
    #[error("Submission rejected: {detail}")]
    SubmissionRejected {
        signature: Option<Signature>,
        detail: String,
    },

    /// Confirmation was not observed within the bound
    ///
    /// `created` names the account the transaction would create, when there
    /// is one, so a caller can find it after re-querying.
    #[error("Confirmation of {signature} not seen within {waited_ms}ms; re-query first")]
    TimedOut {
        signature: Signature,
        waited_ms: u64,
        created: Option<Pubkey>,
    },

    /// The interactive signer declined the request
    #[error("Signer rejected the request")]
    UserRejected,

    /// No account exists at an address that must hold one
    #[error("Account not found: {address}")]
    AccountNotFound { address: Pubkey },

    /// Account exists but its contents or owning program are not what was expected
    #[error("Invalid account data at {address}: {reason}")]
    InvalidAccountData { address: Pubkey, reason: String },

    /// Caller-supplied decimals differ from the mint's recorded decimals
    #[error("Decimals mismatch for {mint}: ledger has {expected}, caller gave {supplied}")]
    DecimalsMismatch {
        mint: Pubkey,
        expected: u8,
        supplied: u8,
    },

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    /// Local precondition failure, detected before any network call
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level failure talking to the RPC gateway
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Local signing failure (missing keypair, malformed transaction)
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl TokenOpError {
    /// Check if this error is potentially retryable by repeating the same call
    ///
    /// Only transport failures qualify. A timed-out submission is deliberately
    /// not retryable: the caller must re-query, since resubmitting a transfer
    /// could apply it twice.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(_) => true,

            Self::NotConnected
            | Self::InvalidAddressFormat { .. }
            | Self::AccountIntegrity { .. }
            | Self::NoValidAddress { .. }
            | Self::SubmissionRejected { .. }
            | Self::TimedOut { .. }
            | Self::UserRejected
            | Self::AccountNotFound { .. }
            | Self::InvalidAccountData { .. }
            | Self::DecimalsMismatch { .. }
            | Self::InstructionBuild { .. }
            | Self::InvalidArgument(_)
            | Self::Signing(_) => false,
        }
    }

    /// Whether the outcome of a submission is unknown and must be re-queried
    pub fn requires_requery(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::InvalidAddressFormat { .. } => "address_format",
            Self::AccountIntegrity { .. } => "integrity",
            Self::NoValidAddress { .. } => "no_valid_address",
            Self::SubmissionRejected { .. } => "rejected",
            Self::TimedOut { .. } => "timed_out",
            Self::UserRejected => "user_rejected",
            Self::AccountNotFound { .. } => "not_found",
            Self::InvalidAccountData { .. } => "account_data",
            Self::DecimalsMismatch { .. } => "decimals",
            Self::InstructionBuild { .. } => "instruction",
            Self::InvalidArgument(_) => "argument",
            Self::Rpc(_) => "rpc",
            Self::Signing(_) => "signing",
        }
    }
}

// Convenience constructors for common error scenarios
impl TokenOpError {
    pub fn invalid_address(input: impl Into<String>) -> Self {
        Self::InvalidAddressFormat {
            input: input.into(),
        }
    }

    pub fn instruction_failed(program: impl Into<String>, reason: impl ToString) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rejected(signature: Option<Signature>, detail: impl Into<String>) -> Self {
        Self::SubmissionRejected {
            signature,
            detail: detail.into(),
        }
    }

    /// Attach the address a timed-out transaction would have created
    pub fn with_created(self, address: Pubkey) -> Self {
        match self {
            Self::TimedOut {
                signature,
                waited_ms,
                ..
            } => Self::TimedOut {
                signature,
                waited_ms,
                created: Some(address),
            },
            other => other,
        }
    }

    pub fn integrity(address: Pubkey, reason: impl Into<String>) -> Self {
        Self::AccountIntegrity {
            address,
            reason: reason.into(),
        }
    }

    pub fn invalid_data(address: Pubkey, reason: impl Into<String>) -> Self {
        Self::InvalidAccountData {
            address,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TokenOpError::invalid_address("not-a-key");
        assert_eq!(err.to_string(), "Invalid address format: \"not-a-key\"");

        let err = TokenOpError::instruction_failed("spl_token", "bad authority");
        assert_eq!(
            err.to_string(),
            "Instruction build error (program=spl_token): bad authority"
        );
    }

    #[test]
    fn test_timeout_and_rejection_are_distinct() {
        let timed_out = TokenOpError::TimedOut {
            signature: Signature::default(),
            waited_ms: 1_000,
            created: None,
        };
        let rejected = TokenOpError::rejected(None, "custom program error: 0x1");

        assert!(timed_out.requires_requery());
        assert!(!rejected.requires_requery());
        assert_ne!(timed_out.category(), rejected.category());
        assert!(!timed_out.is_retryable());
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn test_with_created_only_touches_timeouts() {
        let mint = Pubkey::new_unique();
        let timed_out = TokenOpError::TimedOut {
            signature: Signature::default(),
            waited_ms: 10,
            created: None,
        }
        .with_created(mint);
        assert!(matches!(
            timed_out,
            TokenOpError::TimedOut { created: Some(m), .. } if m == mint
        ));

        let rejected = TokenOpError::rejected(None, "boom").with_created(mint);
        assert_eq!(rejected, TokenOpError::rejected(None, "boom"));
    }

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(TokenOpError::Rpc("connection reset".to_string()).is_retryable());

        assert!(!TokenOpError::NotConnected.is_retryable());
        assert!(!TokenOpError::UserRejected.is_retryable());
        assert!(!TokenOpError::integrity(Pubkey::new_unique(), "owner").is_retryable());
        assert!(!TokenOpError::InvalidArgument("zero".to_string()).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TokenOpError::NotConnected.category(), "not_connected");
        assert_eq!(
            TokenOpError::DecimalsMismatch {
                mint: Pubkey::new_unique(),
                expected: 9,
                supplied: 6,
            }
            .category(),
            "decimals"
        );
        assert_eq!(TokenOpError::Signing("x".to_string()).category(), "signing");
    }
}
