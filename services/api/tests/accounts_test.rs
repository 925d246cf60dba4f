mod common;

use common::*;
use reqwest::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;

/// Health check answers without touching the ledger
#[tokio::test]
async fn test_health() {
    let app = TestApp::spawn().await;

    let body = expect_status(app.client.get("/health").await, StatusCode::OK).await;
    assert_eq!(body["status"], "ok");
}

/// Ensuring twice returns the same account and applies new settings
#[tokio::test]
async fn test_ensure_account_is_idempotent() {
    let app = TestApp::spawn().await;
    let owner = TestData::owner();
    let wallet = TestData::wallet();

    let first = app
        .client
        .ensure_account(&owner, json!({ "wallet_address": wallet }))
        .await;
    let second = app
        .client
        .ensure_account(
            &owner,
            json!({ "wallet_address": wallet, "min_balance": "2.5", "required_approvals": 1 }),
        )
        .await;

    assert_eq!(first["id"], second["id"]);
    assert_eq!(decimal(&second["min_balance"]), dec!(2.5));
    assert_eq!(second["required_approvals"], 1);

    let list = expect_status(
        app.client.get(&format!("/v1/accounts/{owner}")).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(list.as_array().expect("Expected an array").len(), 1);
}

/// A wallet bound to one owner cannot be claimed by another
#[tokio::test]
async fn test_wallet_conflict() {
    let app = TestApp::spawn().await;
    let wallet = TestData::wallet();

    app.client
        .ensure_account(&TestData::owner(), json!({ "wallet_address": wallet }))
        .await;
    let response = app
        .client
        .post(
            &format!("/v1/accounts/{}", TestData::owner()),
            json!({ "wallet_address": wallet.to_uppercase() }),
        )
        .await;

    let body = expect_status(response, StatusCode::CONFLICT).await;
    assert_eq!(body["error"]["status"], 409);
}

/// Another owner's account looks exactly like a missing one
#[tokio::test]
async fn test_foreign_account_is_not_found() {
    let app = TestApp::spawn().await;
    let owner = TestData::owner();
    let gas_account_id = app.client.funded_account(&owner, "10").await;

    let stranger = TestData::owner();
    let foreign = app
        .client
        .get(&format!("/v1/accounts/{stranger}?gas_account_id={gas_account_id}"))
        .await;
    let missing = app
        .client
        .get(&format!(
            "/v1/accounts/{stranger}?gas_account_id={}",
            uuid::Uuid::new_v4()
        ))
        .await;

    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let deposit = app
        .client
        .post(
            &format!("/v1/accounts/{stranger}/deposit"),
            json!({ "gas_account_id": gas_account_id, "amount": "1" }),
        )
        .await;
    assert_eq!(deposit.status(), StatusCode::NOT_FOUND);
}

/// Deposits credit balance and available
#[tokio::test]
async fn test_deposit_credits_account() {
    let app = TestApp::spawn().await;
    let owner = TestData::owner();
    let gas_account_id = app.client.funded_account(&owner, "10").await;

    let body = app.client.deposit(&owner, &gas_account_id, "2.5").await;
    assert_eq!(body["transaction"]["type"], "deposit");
    assert_eq!(body["transaction"]["status"], "completed");

    let account = app.client.account(&owner, &gas_account_id).await;
    assert_eq!(decimal(&account["balance"]), dec!(12.5));
    assert_eq!(decimal(&account["available"]), dec!(12.5));
    assert_eq!(decimal(&account["pending"]), dec!(0));
}

/// Zero and negative deposits are rejected
#[tokio::test]
async fn test_deposit_rejects_non_positive_amounts() {
    let app = TestApp::spawn().await;
    let owner = TestData::owner();
    let gas_account_id = app.client.funded_account(&owner, "1").await;

    for amount in ["0", "-1"] {
        let response = app
            .client
            .post(
                &format!("/v1/accounts/{owner}/deposit"),
                json!({ "gas_account_id": gas_account_id, "amount": amount }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

/// Summary totals every account of the owner
#[tokio::test]
async fn test_summary() {
    let app = TestApp::spawn().await;
    let owner = TestData::owner();
    let gas_account_id = app.client.funded_account(&owner, "10").await;
    app.client
        .withdraw_expect_success(&owner, &gas_account_id, "4")
        .await;

    let summary = expect_status(
        app.client.get(&format!("/v1/accounts/{owner}/summary")).await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(summary["account_id"], owner.as_str());
    assert_eq!(decimal(&summary["total_balance"]), dec!(10));
    assert_eq!(decimal(&summary["total_available"]), dec!(6));
    assert_eq!(summary["pending_withdrawals"], 1);
    assert_eq!(decimal(&summary["pending_amount"]), dec!(4));
    assert_eq!(summary["last_withdrawal"]["type"], "withdrawal");
    assert_eq!(summary["last_deposit"]["type"], "deposit");
}
