use mockito::Matcher;
use serde_json::json;
use solana_commitment_config::CommitmentLevel;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::time::Duration;
use token_ledger::rpc::{LedgerClient, ReadRetryConfig, RpcLedger, TransactionState};
use token_ledger::TokenOpError;

fn ledger(url: String) -> RpcLedger {
    RpcLedger::new(url, Duration::from_secs(5), CommitmentLevel::Confirmed).with_read_retry(
        ReadRetryConfig {
            max_retries: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
        },
    )
}

fn rpc_result(result: serde_json::Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

#[tokio::test]
async fn reads_balance() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getBalance" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({ "context": { "slot": 1 }, "value": 500 })))
        .create_async()
        .await;

    let balance = ledger(server.url())
        .get_balance(&Pubkey::new_unique())
        .await
        .unwrap();
    assert_eq!(balance, 500);
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_account_is_none() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getAccountInfo" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({ "context": { "slot": 1 }, "value": null })))
        .create_async()
        .await;

    let account = ledger(server.url())
        .get_account(&Pubkey::new_unique())
        .await
        .unwrap();
    assert!(account.is_none());
}

#[tokio::test]
async fn signature_status_mapping() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getSignatureStatuses" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "context": { "slot": 9 },
            "value": [{
                "slot": 5,
                "confirmations": null,
                "err": null,
                "status": { "Ok": null },
                "confirmationStatus": "finalized"
            }]
        })))
        .create_async()
        .await;

    let state = ledger(server.url())
        .get_transaction_status(&Signature::default())
        .await
        .unwrap();
    assert_eq!(state, TransactionState::Landed(CommitmentLevel::Finalized));
}

#[tokio::test]
async fn unseen_signature_is_unknown() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({ "context": { "slot": 9 }, "value": [null] })))
        .create_async()
        .await;

    let state = ledger(server.url())
        .get_transaction_status(&Signature::default())
        .await
        .unwrap();
    assert_eq!(state, TransactionState::Unknown);
}

#[tokio::test]
async fn transport_failures_are_retried_then_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(503)
        .expect(4)
        .create_async()
        .await;

    let err = ledger(server.url())
        .get_balance(&Pubkey::new_unique())
        .await
        .unwrap_err();
    assert!(matches!(err, TokenOpError::Rpc(_)));
    assert!(err.is_retryable());
    mock.assert_async().await;
}
