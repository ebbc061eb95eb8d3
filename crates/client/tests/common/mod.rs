#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use api_types::{
    Money,
    auth::{SendOtp, VerifyOtp},
    identity::{Identity, Mode},
    profile::ProfileUpdate,
    transaction::{Action, Transaction, TransactionUpdate},
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{NaiveDate, TimeZone, Utc};
use client::{
    Client, ClientConfig, Settings,
    export::MemorySink,
    storage::MemoryStore,
};
use serde_json::json;
use tokio::sync::Notify;

pub const WA_ID: &str = "60123456789";
pub const TOKEN: &str = "T";
pub const OTP: &str = "123456";

/// In-process stand-in for the AliranTunai API.
#[derive(Default)]
pub struct Backend {
    pub transactions: Mutex<Vec<Transaction>>,
    pub requires_message: AtomicBool,
    pub reject_tokens: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_updates: AtomicBool,
    pub delete_gate: Mutex<Option<Arc<Notify>>>,
    pub send_otp_hits: AtomicUsize,
    pub dashboard_hits: AtomicUsize,
    pub page_hits: AtomicUsize,
    pub delete_hits: AtomicUsize,
    pub update_hits: AtomicUsize,
    pub categorize_hits: AtomicUsize,
    pub download_hits: AtomicUsize,
    /// `Authorization` header of the last authenticated route hit.
    pub last_auth: Mutex<Option<String>>,
}

impl Backend {
    pub fn with_transactions(transactions: Vec<Transaction>) -> Arc<Self> {
        let backend = Self::default();
        *backend.transactions.lock().unwrap() = transactions;
        Arc::new(backend)
    }

    /// Deletes block until the returned handle is notified.
    pub fn gate_deletes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.delete_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn ids(&self) -> Vec<String> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .map(|tx| tx.id.clone())
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<Transaction> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.id == id)
            .cloned()
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn authorized(backend: &Backend, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {TOKEN}");
    let sent = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let ok = sent.as_deref() == Some(expected.as_str());
    *backend.last_auth.lock().unwrap() = sent;
    if ok && !backend.reject_tokens.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(error(StatusCode::UNAUTHORIZED, "Invalid token"))
    }
}

pub fn identity(mode: Mode) -> Identity {
    Identity {
        wa_id: WA_ID.to_string(),
        name: Some("Kedai Aisyah".to_string()),
        owner_name: Some("Aisyah".to_string()),
        mode,
    }
}

async fn send_otp(State(backend): State<Arc<Backend>>, Json(body): Json<SendOtp>) -> Response {
    backend.send_otp_hits.fetch_add(1, Ordering::SeqCst);
    if body.phone_number != WA_ID {
        return error(StatusCode::BAD_REQUEST, "Unknown number");
    }
    if backend.requires_message.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Please message the bot first",
                "requiresWhatsAppMessage": true,
            })),
        )
            .into_response();
    }
    Json(json!({ "success": true })).into_response()
}

async fn verify_otp(Json(body): Json<VerifyOtp>) -> Response {
    if body.otp != OTP {
        return error(StatusCode::BAD_REQUEST, "Invalid or expired OTP");
    }
    Json(json!({ "token": TOKEN, "user": identity(Mode::Business) })).into_response()
}

async fn dashboard(
    State(backend): State<Arc<Backend>>,
    Path(wa_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    backend.dashboard_hits.fetch_add(1, Ordering::SeqCst);
    let transactions = backend.transactions.lock().unwrap().clone();
    let total = |action: Action| -> f64 {
        transactions
            .iter()
            .filter(|tx| tx.action == action)
            .map(|tx| tx.amount.as_f64())
            .sum()
    };
    Json(json!({
        "walletId": wa_id,
        "totalTransactions": transactions.len(),
        "ccc": 12,
        "dso": 30,
        "dio": 20,
        "dpo": 38,
        "totalSales": total(Action::Sale),
        "totalPurchases": total(Action::Purchase),
        "totalPaymentsReceived": total(Action::PaymentReceived),
        "totalPaymentsMade": total(Action::PaymentMade),
        "recentTransactions": transactions,
    }))
    .into_response()
}

async fn transactions(
    State(backend): State<Arc<Backend>>,
    Path(_wa_id): Path<String>,
    Query(query): Query<HashMap<String, u32>>,
    headers: HeaderMap,
) -> Response {
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    backend.page_hits.fetch_add(1, Ordering::SeqCst);
    let page = query.get("page").copied().unwrap_or(1).max(1);
    let limit = query.get("limit").copied().unwrap_or(50).max(1);
    let all = backend.transactions.lock().unwrap().clone();
    let start = ((page - 1) * limit) as usize;
    let rows: Vec<_> = all.iter().skip(start).take(limit as usize).cloned().collect();
    Json(json!({
        "transactions": rows,
        "pagination": {
            "currentPage": page,
            "hasMore": start + rows.len() < all.len(),
            "totalCount": all.len(),
        },
    }))
    .into_response()
}

async fn update_transaction(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<TransactionUpdate>,
) -> Response {
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    backend.update_hits.fetch_add(1, Ordering::SeqCst);
    if backend.fail_updates.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "update failed");
    }
    let mut transactions = backend.transactions.lock().unwrap();
    let Some(tx) = transactions.iter_mut().find(|tx| tx.id == id) else {
        return error(StatusCode::NOT_FOUND, "Transaction not found");
    };
    if let Some(action) = update.action {
        tx.action = action;
    }
    if let Some(amount) = update.amount {
        tx.amount = amount;
    }
    if let Some(description) = update.description {
        tx.description = description;
    }
    if update.vendor.is_some() {
        tx.vendor = update.vendor;
    }
    if update.customer.is_some() {
        tx.customer = update.customer;
    }
    if update.category.is_some() {
        tx.category = update.category;
    }
    if update.terms.is_some() {
        tx.terms = update.terms;
    }
    if let Ok(date) = NaiveDate::parse_from_str(&update.date, "%Y-%m-%d") {
        let time = tx.timestamp.time();
        tx.timestamp = date.and_time(time).and_utc();
    }
    Json(json!({ "transaction": tx.clone() })).into_response()
}

async fn delete_transaction(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    backend.delete_hits.fetch_add(1, Ordering::SeqCst);
    let gate = backend.delete_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
    if backend.fail_deletes.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "delete failed");
    }
    let mut transactions = backend.transactions.lock().unwrap();
    match transactions.iter().position(|tx| tx.id == id) {
        Some(index) => {
            transactions.remove(index);
            Json(json!({ "success": true })).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Transaction not found"),
    }
}

async fn categorize(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.categorize_hits.fetch_add(1, Ordering::SeqCst);
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    Json(json!({ "category": "COGS" })).into_response()
}

async fn download_all(
    State(backend): State<Arc<Backend>>,
    Path(wa_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    backend.download_hits.fetch_add(1, Ordering::SeqCst);
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    format!("xlsx:{wa_id}:all").into_response()
}

async fn download_scoped(
    State(backend): State<Arc<Backend>>,
    Path((wa_id, scope)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    backend.download_hits.fetch_add(1, Ordering::SeqCst);
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    format!("xlsx:{wa_id}:{scope}").into_response()
}

async fn update_profile(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    if let Err(res) = authorized(&backend, &headers) {
        return res;
    }
    let mut user = identity(Mode::Business);
    if let Some(mode) = update.mode {
        user.mode = mode;
    }
    if update.name.is_some() {
        user.name = update.name;
    }
    Json(json!({ "user": user })).into_response()
}

pub fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/api/auth/send-otp", post(send_otp))
        .route("/api/auth/verify-otp", post(verify_otp))
        .route("/api/dashboard/{wa_id}", get(dashboard))
        .route(
            "/api/transactions/{id}",
            get(transactions)
                .put(update_transaction)
                .delete(delete_transaction),
        )
        .route("/api/categorize", post(categorize))
        .route("/api/download-excel/{wa_id}", get(download_all))
        .route("/api/download-excel/{wa_id}/{scope}", get(download_scoped))
        .route("/api/user/profile", put(update_profile))
        .with_state(backend)
}

pub struct Harness {
    pub client: Client,
    pub backend: Arc<Backend>,
    pub storage: Arc<MemoryStore>,
    pub sink: Arc<MemorySink>,
}

/// Serves `backend` on an ephemeral port and builds a client against it.
pub async fn harness(backend: Arc<Backend>) -> Harness {
    harness_with(backend, |_| {}).await
}

/// Like [`harness`], with `configure` applied to the settings first.
pub async fn harness_with(backend: Arc<Backend>, configure: impl FnOnce(&mut Settings)) -> Harness {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(backend.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut settings = Settings::default();
    settings.app.build_mode = Some("development".to_string());
    settings.api.dev_origin = format!("http://{addr}");
    configure(&mut settings);
    let config = ClientConfig::resolve(&settings).unwrap();

    let storage = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let client = Client::builder()
        .config(config)
        .storage(storage.clone())
        .sink(sink.clone())
        .build()
        .unwrap();

    Harness {
        client,
        backend,
        storage,
        sink,
    }
}

/// Same as [`harness`], already logged in.
pub async fn logged_in(backend: Arc<Backend>) -> Harness {
    logged_in_with(backend, |_| {}).await
}

pub async fn logged_in_with(
    backend: Arc<Backend>,
    configure: impl FnOnce(&mut Settings),
) -> Harness {
    let harness = harness_with(backend, configure).await;
    harness
        .client
        .session()
        .login(identity(Mode::Business), TOKEN.to_string())
        .unwrap();
    harness
}

pub fn tx(id: &str, day: u32, hour: u32, action: Action, sen: i64, description: &str) -> Transaction {
    Transaction {
        id: id.to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap(),
        action,
        amount: Money::new(sen),
        description: description.to_string(),
        vendor: None,
        customer: None,
        category: None,
        terms: None,
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
