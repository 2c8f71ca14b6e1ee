//! Classification of gateway errors into the crate taxonomy

use crate::errors::TokenOpError;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};

/// Map a gateway error onto [`TokenOpError`]
///
/// Anything the ledger itself refused (preflight failure, transaction error)
/// becomes `SubmissionRejected` with the ledger's payload. Everything that
/// never reached a verdict becomes `Rpc`.
pub fn classify_client_error(err: &ClientError) -> TokenOpError {
    match err.kind() {
        ClientErrorKind::TransactionError(tx_err) => {
            TokenOpError::rejected(None, tx_err.to_string())
        }
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message,
            data: RpcResponseErrorData::SendTransactionPreflightFailure(sim),
        }) => {
            let detail = match &sim.err {
                Some(tx_err) => format!("{} (code {}): {:?}", message, code, tx_err),
                None => format!("{} (code {})", message, code),
            };
            TokenOpError::rejected(None, detail)
        }
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
            TokenOpError::Rpc(format!("{} (code {})", message, code))
        }
        ClientErrorKind::SigningError(e) => TokenOpError::Signing(e.to_string()),
        _ => TokenOpError::Rpc(err.to_string()),
    }
}

impl From<ClientError> for TokenOpError {
    fn from(err: ClientError) -> Self {
        classify_client_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::transaction::TransactionError;

    #[test]
    fn test_transaction_error_is_rejection() {
        let err = ClientError::from(TransactionError::InsufficientFundsForFee);
        let classified = classify_client_error(&err);

        assert!(matches!(
            classified,
            TokenOpError::SubmissionRejected { signature: None, .. }
        ));
    }

    #[test]
    fn test_request_error_is_transport() {
        let err = ClientError::from(RpcError::RpcRequestError("connection refused".to_string()));
        let classified = classify_client_error(&err);

        assert!(matches!(classified, TokenOpError::Rpc(_)));
        assert!(classified.is_retryable());
    }

    #[test]
    fn test_response_error_without_preflight_is_transport() {
        let err = ClientError::from(RpcError::RpcResponseError {
            code: -32005,
            message: "Node is behind".to_string(),
            data: RpcResponseErrorData::Empty,
        });

        assert!(matches!(classify_client_error(&err), TokenOpError::Rpc(_)));
    }
}
