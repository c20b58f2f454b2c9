#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::{mpsc, watch};

use fieldqueue::background_sync::SyncRegistrar;
use fieldqueue::backoff::BackoffPolicy;
use fieldqueue::clock::ManualClock;
use fieldqueue::config::Config;
use fieldqueue::connectivity::Connectivity;
use fieldqueue::db;
use fieldqueue::delivery::{Delivery, Payload};
use fieldqueue::error::{DeliveryError, StorageError};
use fieldqueue::models::{EntryPatch, Envelope, QueueEntry};
use fieldqueue::queue::SubmissionQueue;
use fieldqueue::state::{AppState, SharedState};
use fieldqueue::store::{QueueStore, SqliteStore};
use fieldqueue::worker;

pub const START_MS: i64 = 1_700_000_000_000;
pub const QUEUE_NAME: &str = "test";

/// A fresh in-memory database with migrations applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    db::setup_database(&pool)
        .await
        .expect("Failed to run migrations on test database");

    pool
}

#[derive(Default)]
struct Script {
    fail: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delivered: Mutex<Vec<Value>>,
    tokens: Mutex<Vec<Option<String>>>,
}

/// In-process delivery whose outcome the test controls.
///
/// Fails when `fail(true)` was set or when the body carries `"fail": true`.
#[derive(Clone, Default)]
pub struct ScriptedDelivery {
    script: Arc<Script>,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.script.fail.store(fail, Ordering::SeqCst);
    }

    pub fn delay(&self, delay: Duration) {
        self.script
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.script.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<Value> {
        self.script.delivered.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.script.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl<P: Payload> Delivery<P> for ScriptedDelivery {
    async fn deliver(&self, envelope: &Envelope<P>) -> Result<(), DeliveryError> {
        let script = &self.script;
        script.calls.fetch_add(1, Ordering::SeqCst);
        let running = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = script.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        script.in_flight.fetch_sub(1, Ordering::SeqCst);

        let body = serde_json::to_value(&envelope.body)?;
        if script.fail.load(Ordering::SeqCst) || body["fail"] == json!(true) {
            return Err(DeliveryError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }

        script.delivered.lock().unwrap().push(body);
        script.tokens.lock().unwrap().push(envelope.auth_token.clone());
        Ok(())
    }
}

/// A store whose every operation fails, standing in for a full or locked disk.
pub struct FailingStore;

fn storage_down() -> StorageError {
    StorageError::Database(sqlx::Error::PoolClosed)
}

#[async_trait]
impl QueueStore for FailingStore {
    fn name(&self) -> &str {
        QUEUE_NAME
    }

    async fn add(&self, _: &Value, _: i64, _: i64) -> Result<i64, StorageError> {
        Err(storage_down())
    }

    async fn list(&self) -> Result<Vec<QueueEntry<Value>>, StorageError> {
        Err(storage_down())
    }

    async fn get(&self, _: i64) -> Result<Option<QueueEntry<Value>>, StorageError> {
        Err(storage_down())
    }

    async fn update(&self, _: i64, _: EntryPatch) -> Result<(), StorageError> {
        Err(storage_down())
    }

    async fn remove(&self, _: i64) -> Result<bool, StorageError> {
        Err(storage_down())
    }

    async fn count(&self) -> Result<i64, StorageError> {
        Err(storage_down())
    }

    async fn count_failing(&self) -> Result<i64, StorageError> {
        Err(storage_down())
    }
}

pub type TestQueue = SubmissionQueue<Value, ScriptedDelivery>;

/// A queue over an in-memory store with a manual clock and scripted delivery.
pub struct Harness {
    pub queue: Arc<TestQueue>,
    pub delivery: ScriptedDelivery,
    pub clock: ManualClock,
    pub connectivity: Connectivity,
    pub pool: SqlitePool,
    pub tags: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    pub async fn entries(&self) -> Vec<QueueEntry<Envelope<Value>>> {
        self.queue.list().await.expect("list failed")
    }

    pub async fn only_entry(&self) -> QueueEntry<Envelope<Value>> {
        let mut entries = self.entries().await;
        assert_eq!(entries.len(), 1, "expected exactly one queued entry");
        entries.remove(0)
    }
}

pub async fn harness(ordered: bool) -> Harness {
    let pool = memory_pool().await;
    harness_with_pool(pool, ordered)
}

pub fn harness_with_pool(pool: SqlitePool, ordered: bool) -> Harness {
    let delivery = ScriptedDelivery::new();
    let clock = ManualClock::new(START_MS);
    let connectivity = Connectivity::online();
    let (registrar, tags) = SyncRegistrar::channel();

    let store = Arc::new(SqliteStore::new(pool.clone(), QUEUE_NAME));
    let queue = SubmissionQueue::new(store, delivery.clone(), connectivity.clone())
        .ordered(ordered)
        .clock(Arc::new(clock.clone()))
        .backoff(BackoffPolicy::default())
        .background_sync(Arc::new(registrar));

    Harness {
        queue: Arc::new(queue),
        delivery,
        clock,
        connectivity,
        pool,
        tags,
    }
}

/// A running control API wired to real HTTP delivery against `upstream`.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: SqlitePool,
    pub client: Client,
    pub state: SharedState,
    shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn put(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("put request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn delete(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("delete request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Submit a payload to a queue, return (body, status).
    pub async fn submit(&self, queue: &str, payload: Value) -> (Value, StatusCode) {
        self.post(
            &format!("/api/v1/queues/{queue}/submissions"),
            &json!({ "authToken": "test-token", "payload": payload }),
        )
        .await
    }

    /// Retry one entry. A background pass may hold the queue briefly, so a
    /// conflict is retried.
    pub async fn retry(&self, queue: &str, id: i64) -> (Value, StatusCode) {
        let path = format!("/api/v1/queues/{queue}/entries/{id}/retry");
        loop {
            let (body, status) = self.post(&path, &json!({})).await;
            if status != StatusCode::CONFLICT {
                return (body, status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Run a flush pass, waiting out any pass the worker already started.
    pub async fn flush(&self, queue: &str) -> (Value, StatusCode) {
        let path = format!("/api/v1/queues/{queue}/flush");
        loop {
            let (body, status) = self.post(&path, &json!({})).await;
            if body["status"] != "already_running" {
                return (body, status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll a queue until it holds `expected` entries or a few seconds pass.
    pub async fn wait_for_pending(&self, queue: &str, expected: i64) -> bool {
        for _ in 0..50 {
            let (body, _) = self.get(&format!("/api/v1/queues/{queue}")).await;
            if body["queue"]["pending"] == json!(expected) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

pub fn test_config(upstream: &str) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        field_reports_url: Some(format!("{upstream}/reports")),
        estimating_url: Some(format!("{upstream}/estimates")),
        crm_url: Some(format!("{upstream}/crm")),
        delivery_timeout: Duration::from_secs(5),
        sync_interval: Duration::from_secs(3600),
        probe: None,
        backoff: BackoffPolicy::default(),
        log_level: "warn".to_string(),
    }
}

/// Spawn the control API and sync worker over a fresh in-memory database.
pub async fn spawn_app(upstream: &str) -> TestApp {
    let pool = memory_pool().await;
    let config = test_config(upstream);

    let connectivity = Connectivity::online();
    let (registrar, tags) = SyncRegistrar::channel();
    let queues = fieldqueue::build_queues(
        &pool,
        &config,
        connectivity.clone(),
        Some(Arc::new(registrar)),
    )
    .expect("Failed to build queues");

    let sync_interval = config.sync_interval;
    let state: SharedState = Arc::new(AppState {
        config,
        queues,
        connectivity,
    });

    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(worker::run(state.clone(), tags, sync_interval, shutdown_rx));

    let app = fieldqueue::build_app(state.clone());

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    // Spawn server in background
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        pool,
        client: Client::new(),
        state,
        shutdown,
    }
}
