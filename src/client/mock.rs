//! Mock FishFish registry for testing
//!
//! Provides a scripted implementation of [`RegistryApi`] plus an in-memory
//! change stream, so the sync tasks can be exercised without a network.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Duration;

use super::models::{Category, Credential, Domain, Permission, Record, RecordFields, Url};
use super::{KeepAlive, RegistryApi, StreamConnection, StreamFrame};
use crate::error::{ApiError, Result};

/// Timestamp carried by sample records
pub const SAMPLE_TIMESTAMP: i64 = 1667617118;

/// Mock registry for testing.
///
/// Configure record sets and failures via builder methods, then hand it to
/// the component under test.
///
/// # Example
/// ```ignore
/// let mock = MockRegistry::new()
///     .with_domains(vec![sample_domain("fishfish.gg", Category::Safe)])
///     .await;
/// ```
#[derive(Default)]
pub struct MockRegistry {
    /// Domains returned from fetch_domains
    domains: Mutex<Vec<Domain>>,
    /// URLs returned from fetch_urls
    urls: Mutex<Vec<Url>>,
    /// Error for the next fetch of either family, consumed on first use
    fetch_error: Mutex<Option<ApiError>>,
    /// Error for the next URL fetch only, consumed on first use
    url_error: Mutex<Option<ApiError>>,
    /// Reject every credential request while set
    fail_credentials: Mutex<bool>,
    /// Connections handed out by open_stream, in order
    streams: Mutex<VecDeque<StreamConnection>>,
    /// Holds fetches until released
    gate: Mutex<Option<FetchGate>>,
    issued: AtomicUsize,
    call_count: Mutex<CallCounts>,
    permissions: Mutex<Vec<Vec<Permission>>>,
    fetch_tokens: Mutex<Vec<String>>,
    stream_tokens: Mutex<Vec<String>>,
}

/// Tracks registry call counts for test verification
#[derive(Default, Debug, Clone)]
pub struct CallCounts {
    pub request_credential: usize,
    pub fetch_domains: usize,
    pub fetch_urls: usize,
    pub open_stream: usize,
}

/// Blocks fetches while installed; see [`MockRegistry::hold_fetches`]
#[derive(Clone)]
pub struct FetchGate {
    parked: Arc<AtomicUsize>,
    release: Arc<Semaphore>,
}

impl Default for FetchGate {
    fn default() -> Self {
        Self {
            parked: Arc::new(AtomicUsize::new(0)),
            release: Arc::new(Semaphore::new(0)),
        }
    }
}

impl FetchGate {
    /// Wait until a fetch is parked at the gate
    pub async fn started(&self) {
        self.parked_at_least(1).await;
    }

    /// Wait until `count` fetches have reached the gate in total
    pub async fn parked_at_least(&self, count: usize) {
        while self.parked.load(Ordering::SeqCst) < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Let one parked fetch continue
    pub fn release(&self) {
        self.release.add_permits(1);
    }

    async fn enter(&self) {
        self.parked.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
    }
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure domains to return from fetch_domains.
    pub async fn with_domains(self, domains: Vec<Domain>) -> Self {
        self.set_domains(domains).await;
        self
    }

    /// Configure URLs to return from fetch_urls.
    pub async fn with_urls(self, urls: Vec<Url>) -> Self {
        self.set_urls(urls).await;
        self
    }

    /// Change the authoritative domain set after construction.
    pub async fn set_domains(&self, domains: Vec<Domain>) {
        *self.domains.lock().await = domains;
    }

    /// Change the authoritative URL set after construction.
    pub async fn set_urls(&self, urls: Vec<Url>) {
        *self.urls.lock().await = urls;
    }

    /// Fail the next fetch, whichever family it is for.
    pub async fn fail_next_fetch(&self, error: ApiError) {
        *self.fetch_error.lock().await = Some(error);
    }

    /// Fail the next URL fetch while domain fetches keep succeeding.
    pub async fn fail_next_url_fetch(&self, error: ApiError) {
        *self.url_error.lock().await = Some(error);
    }

    pub async fn fail_credentials(&self, fail: bool) {
        *self.fail_credentials.lock().await = fail;
    }

    /// Queue a connection for a future open_stream call.
    pub async fn push_stream(&self, connection: StreamConnection) {
        self.streams.lock().await.push_back(connection);
    }

    /// Park every subsequent fetch until the returned gate releases it.
    pub async fn hold_fetches(&self) -> FetchGate {
        let gate = FetchGate::default();
        *self.gate.lock().await = Some(gate.clone());
        gate
    }

    /// Stop parking new fetches.
    pub async fn open_fetches(&self) {
        *self.gate.lock().await = None;
    }

    pub async fn call_counts(&self) -> CallCounts {
        self.call_count.lock().await.clone()
    }

    /// Permission sets passed to each credential request
    pub async fn requested_permissions(&self) -> Vec<Vec<Permission>> {
        self.permissions.lock().await.clone()
    }

    /// Tokens presented to each fetch
    pub async fn fetch_tokens(&self) -> Vec<String> {
        self.fetch_tokens.lock().await.clone()
    }

    /// Tokens presented when opening each stream
    pub async fn stream_tokens(&self) -> Vec<String> {
        self.stream_tokens.lock().await.clone()
    }

    async fn before_fetch(&self, credential: &Credential) -> Result<()> {
        self.fetch_tokens.lock().await.push(credential.token.clone());

        let gate = self.gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.enter().await;
        }

        match self.fetch_error.lock().await.take() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RegistryApi for MockRegistry {
    async fn request_credential(&self, permissions: &[Permission]) -> Result<Credential> {
        self.call_count.lock().await.request_credential += 1;
        self.permissions.lock().await.push(permissions.to_vec());

        if *self.fail_credentials.lock().await {
            return Err(ApiError::ServerError("token endpoint unavailable".to_string()).into());
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential {
            token: format!("session-{}", n),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }

    async fn fetch_domains(&self, credential: &Credential) -> Result<Vec<Domain>> {
        self.call_count.lock().await.fetch_domains += 1;
        self.before_fetch(credential).await?;
        Ok(self.domains.lock().await.clone())
    }

    async fn fetch_urls(&self, credential: &Credential) -> Result<Vec<Url>> {
        self.call_count.lock().await.fetch_urls += 1;
        self.before_fetch(credential).await?;
        if let Some(e) = self.url_error.lock().await.take() {
            return Err(e.into());
        }
        Ok(self.urls.lock().await.clone())
    }

    async fn open_stream(&self, credential: &Credential) -> Result<StreamConnection> {
        self.call_count.lock().await.open_stream += 1;
        self.stream_tokens.lock().await.push(credential.token.clone());

        self.streams
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ApiError::Stream("no scripted stream".to_string()).into())
    }
}

/// Remote end of a [`mock_stream`] connection
pub struct MockStreamHandle {
    frames: mpsc::UnboundedSender<std::result::Result<StreamFrame, ApiError>>,
    closed: Arc<AtomicBool>,
    pings: Arc<AtomicUsize>,
}

impl MockStreamHandle {
    pub fn send_text(&self, text: &str) {
        let _ = self.frames.unbounded_send(Ok(StreamFrame::Text(text.to_string())));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.frames.unbounded_send(Ok(StreamFrame::Binary(data)));
    }

    /// Deliver a transport failure after any frames already sent
    pub fn send_error(&self, error: ApiError) {
        let _ = self.frames.unbounded_send(Err(error));
    }

    /// End the stream as a normal remote close, after queued frames drain
    pub fn close_remote(&self) {
        self.frames.close_channel();
    }

    /// Whether the local side has closed the connection
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

struct MockKeepAlive {
    closed: Arc<AtomicBool>,
    pings: Arc<AtomicUsize>,
}

#[async_trait]
impl KeepAlive for MockKeepAlive {
    async fn ping(&mut self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// An in-memory stream connection and the handle that drives it
pub fn mock_stream() -> (StreamConnection, MockStreamHandle) {
    let (tx, rx) = mpsc::unbounded();
    let closed = Arc::new(AtomicBool::new(false));
    let pings = Arc::new(AtomicUsize::new(0));

    let connection = StreamConnection {
        frames: rx.boxed(),
        keepalive: Box::new(MockKeepAlive {
            closed: Arc::clone(&closed),
            pings: Arc::clone(&pings),
        }),
    };
    let handle = MockStreamHandle {
        frames: tx,
        closed,
        pings,
    };
    (connection, handle)
}

fn sample_fields(key: &str, category: Category) -> RecordFields {
    RecordFields {
        category,
        description: format!("{} description", key),
        added: SAMPLE_TIMESTAMP,
        checked: SAMPLE_TIMESTAMP,
        target: None,
    }
}

pub fn sample_domain(domain: &str, category: Category) -> Domain {
    Domain::new(domain.to_string(), sample_fields(domain, category))
}

pub fn sample_url(url: &str, category: Category) -> Url {
    Url::new(url.to_string(), sample_fields(url, category))
}
