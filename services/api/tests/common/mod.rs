#![allow(dead_code)]

use std::sync::Arc;

use gasbank::{LedgerService, MemoryStore, Store};
use gasbank_api::{router, AppState};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};

/// A server bound to an ephemeral port over an in-memory ledger
pub struct TestApp {
    pub base_url: String,
    pub ledger: LedgerService,
    pub client: TestClient,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ledger = LedgerService::new(store);
        let app = router(AppState::new(ledger.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Failed to run test server");
        });

        let base_url = format!("http://{addr}");
        Self {
            client: TestClient::new(&base_url),
            base_url,
            ledger,
        }
    }
}

/// Test client wrapper with convenience methods
#[derive(Clone)]
pub struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn patch(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Ensure an account for `owner` and return its JSON
    pub async fn ensure_account(&self, owner: &str, body: Value) -> Value {
        let response = self.post(&format!("/v1/accounts/{owner}"), body).await;
        expect_status(response, StatusCode::OK).await
    }

    /// Ensure an account and credit it, returning the gas account id
    pub async fn funded_account(&self, owner: &str, amount: &str) -> String {
        let account = self
            .ensure_account(owner, json!({ "wallet_address": TestData::wallet() }))
            .await;
        let gas_account_id = account["id"].as_str().expect("Missing id").to_string();
        self.deposit(owner, &gas_account_id, amount).await;
        gas_account_id
    }

    pub async fn deposit(&self, owner: &str, gas_account_id: &str, amount: &str) -> Value {
        let response = self
            .post(
                &format!("/v1/accounts/{owner}/deposit"),
                json!({
                    "gas_account_id": gas_account_id,
                    "amount": amount,
                    "blockchain_tx_id": TestData::chain_tx(),
                    "from_address": "sender",
                }),
            )
            .await;
        expect_status(response, StatusCode::CREATED).await
    }

    pub async fn withdraw(&self, owner: &str, gas_account_id: &str, amount: &str) -> reqwest::Response {
        self.post(
            &format!("/v1/accounts/{owner}/withdraw"),
            json!({
                "gas_account_id": gas_account_id,
                "amount": amount,
                "to_address": "destination",
            }),
        )
        .await
    }

    /// Withdraw and return the created transaction
    pub async fn withdraw_expect_success(&self, owner: &str, gas_account_id: &str, amount: &str) -> Value {
        let response = self.withdraw(owner, gas_account_id, amount).await;
        let body = expect_status(response, StatusCode::CREATED).await;
        body["transaction"].clone()
    }

    pub async fn account(&self, owner: &str, gas_account_id: &str) -> Value {
        let response = self
            .get(&format!("/v1/accounts/{owner}?gas_account_id={gas_account_id}"))
            .await;
        expect_status(response, StatusCode::OK).await
    }
}

/// Asserts the status and returns the JSON body
pub async fn expect_status(response: reqwest::Response, status: StatusCode) -> Value {
    let actual = response.status();
    let text = response.text().await.unwrap_or_default();
    assert_eq!(actual, status, "Expected {status}, got {actual}: {text}");
    if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).expect("Failed to parse JSON response")
    }
}

/// Reads a decimal that was serialized as a JSON string
#[track_caller]
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("Expected a decimal string")
        .parse()
        .expect("Failed to parse decimal")
}

/// Test data generators
pub struct TestData;

impl TestData {
    pub fn owner() -> String {
        format!("owner_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
    }

    pub fn wallet() -> String {
        format!("0x{}", uuid::Uuid::new_v4().simple())
    }

    pub fn chain_tx() -> String {
        format!("chain_{}", uuid::Uuid::new_v4().simple())
    }
}
