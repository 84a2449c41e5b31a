//! Sync lifecycle and the public read API

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::consumer::EventConsumer;
use super::credential::{CredentialRefresher, CredentialStore};
use super::full_sync::{FullSync, SyncReport};
use super::store::RecordCache;
use crate::client::models::{Domain, Family, Url};
use crate::client::{RegistryApi, RegistryClient};
use crate::config::{Config, SyncSettings};
use crate::error::{ConfigError, Error, Result};

/// Tasks launched by one `start`
struct Running {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

enum Lifecycle {
    Stopped,
    /// Initial credential and sync in flight; cancelling the token abandons them
    Starting(CancellationToken),
    Running(Running),
}

/// Keeps a local mirror of the registry in sync and serves reads from it.
///
/// Reads never wait on the sync tasks beyond the store's own lock and are safe
/// before `start`, when they simply find nothing.
pub struct SyncCoordinator<T: RegistryApi> {
    api: Arc<T>,
    settings: SyncSettings,
    cache: Arc<RecordCache>,
    credentials: Arc<CredentialStore>,
    refresher: Arc<CredentialRefresher<T>>,
    full_sync: Arc<FullSync<T>>,
    resync: Arc<Notify>,
    lifecycle: Mutex<Lifecycle>,
}

impl SyncCoordinator<RegistryClient> {
    /// Build a coordinator talking to the FishFish API described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = RegistryClient::from_config(config)?;
        Ok(Self::new(client, SyncSettings::from(config)))
    }
}

impl<T: RegistryApi> SyncCoordinator<T> {
    pub fn new(api: T, settings: SyncSettings) -> Self {
        let api = Arc::new(api);
        let cache = Arc::new(RecordCache::new());
        let credentials = Arc::new(CredentialStore::new());
        let refresher = Arc::new(CredentialRefresher::new(
            Arc::clone(&api),
            Arc::clone(&credentials),
            settings.permissions.clone(),
            settings.token_refresh_interval,
        ));
        let full_sync = Arc::new(FullSync::new(
            Arc::clone(&api),
            Arc::clone(&credentials),
            Arc::clone(&cache),
        ));

        Self {
            api,
            settings,
            cache,
            credentials,
            refresher,
            full_sync,
            resync: Arc::new(Notify::new()),
            lifecycle: Mutex::new(Lifecycle::Stopped),
        }
    }

    /// Obtain a credential, run the initial full sync, then launch the
    /// credential, full-sync and stream tasks.
    ///
    /// Calling `start` while already starting or running does nothing.
    /// Failures of the first credential request or the initial sync are
    /// returned and nothing is launched. The lifecycle lock is not held while
    /// the initial sync runs, so `stop` can abandon it.
    pub async fn start(&self, full_sync_interval: Duration) -> Result<()> {
        if full_sync_interval.is_zero() {
            return Err(ConfigError::Invalid("full sync interval must be positive".to_string()).into());
        }
        self.settings.validate()?;

        let shutdown = {
            let mut lifecycle = self.lifecycle.lock().await;
            if !matches!(*lifecycle, Lifecycle::Stopped) {
                debug!("Sync already started");
                return Ok(());
            }
            let shutdown = CancellationToken::new();
            *lifecycle = Lifecycle::Starting(shutdown.clone());
            shutdown
        };

        let initial = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = self.initial_sync() => Some(result),
        };

        let mut lifecycle = self.lifecycle.lock().await;
        if shutdown.is_cancelled() {
            // `stop` already reset the lifecycle
            return Err(Error::Other("sync stopped while starting".to_string()));
        }
        let report = match initial {
            Some(Ok(report)) => report,
            Some(Err(e)) => {
                *lifecycle = Lifecycle::Stopped;
                return Err(e);
            }
            None => return Err(Error::Other("sync stopped while starting".to_string())),
        };
        info!(
            "Initial sync complete: {} domains, {} urls",
            report.domains, report.urls
        );

        let mut tasks = Vec::with_capacity(3);

        tasks.push(tokio::spawn({
            let refresher = Arc::clone(&self.refresher);
            let shutdown = shutdown.clone();
            async move { refresher.run(shutdown).await }
        }));

        tasks.push(tokio::spawn({
            let full_sync = Arc::clone(&self.full_sync);
            let resync = Arc::clone(&self.resync);
            let shutdown = shutdown.clone();
            async move { full_sync.run(full_sync_interval, resync, shutdown).await }
        }));

        tasks.push(tokio::spawn(supervise_stream(
            Arc::clone(&self.api),
            Arc::clone(&self.credentials),
            EventConsumer::new(
                Arc::clone(&self.cache),
                Arc::clone(&self.resync),
                self.settings.keepalive_interval,
                self.settings.missed_updates_before_resync,
            ),
            self.settings.clone(),
            shutdown.clone(),
        )));

        *lifecycle = Lifecycle::Running(Running { shutdown, tasks });
        info!("Sync started, full sync every {:?}", full_sync_interval);
        Ok(())
    }

    async fn initial_sync(&self) -> Result<SyncReport> {
        self.refresher.refresh().await?;
        self.full_sync.sync().await
    }

    /// Cancel every task and wait for them to exit.
    ///
    /// A full sync in flight is dropped before it replaces anything. A `start`
    /// still waiting on its initial sync is abandoned and returns an error.
    /// Does nothing when stopped.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock().await, Lifecycle::Stopped);

        match previous {
            Lifecycle::Stopped => {}
            Lifecycle::Starting(shutdown) => {
                shutdown.cancel();
                info!("Sync start abandoned");
            }
            Lifecycle::Running(running) => {
                running.shutdown.cancel();
                for task in running.tasks {
                    if let Err(e) = task.await {
                        warn!("Sync task ended abnormally: {}", e);
                    }
                }
                info!("Sync stopped");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running(_))
    }

    /// Run a full sync now, outside the schedule
    pub async fn force_sync(&self) -> Result<SyncReport> {
        self.full_sync.sync().await
    }

    /// When the last fully successful sync finished
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.full_sync.last_synced()
    }

    pub fn get_domain(&self, domain: &str) -> Result<Domain> {
        self.cache.domains.get(domain).ok_or_else(|| Error::NotFound {
            family: Family::Domain,
            key: domain.to_string(),
        })
    }

    pub fn list_domains(&self) -> Vec<Domain> {
        self.cache.domains.list()
    }

    pub fn get_url(&self, url: &str) -> Result<Url> {
        self.cache.urls.get(url).ok_or_else(|| Error::NotFound {
            family: Family::Url,
            key: url.to_string(),
        })
    }

    pub fn list_urls(&self) -> Vec<Url> {
        self.cache.urls.list()
    }

    pub fn domain_count(&self) -> usize {
        self.cache.domains.len()
    }

    pub fn url_count(&self) -> usize {
        self.cache.urls.len()
    }
}

impl<T: RegistryApi> Drop for SyncCoordinator<T> {
    fn drop(&mut self) {
        // Tasks hold their own Arcs; make sure they do not outlive us
        match self.lifecycle.get_mut() {
            Lifecycle::Starting(shutdown) | Lifecycle::Running(Running { shutdown, .. }) => {
                shutdown.cancel()
            }
            Lifecycle::Stopped => {}
        }
    }
}

/// Keep a change stream connected until `shutdown`.
///
/// Each connection attempt reads the credential current at that moment. After
/// a disconnect the stream is reopened with capped exponential backoff, unless
/// reconnecting is disabled, in which case the periodic full sync alone keeps
/// the mirror fresh.
async fn supervise_stream<T: RegistryApi>(
    api: Arc<T>,
    credentials: Arc<CredentialStore>,
    consumer: EventConsumer,
    settings: SyncSettings,
    shutdown: CancellationToken,
) {
    let mut failures = 0u32;

    loop {
        let connected = match credentials.require().await {
            Ok(credential) => tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                connected = api.open_stream(&credential) => connected,
            },
            Err(e) => Err(e),
        };

        match connected {
            Ok(connection) => {
                info!("Change stream connected");
                match consumer.run(connection, &shutdown).await {
                    Ok(()) if shutdown.is_cancelled() => break,
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        warn!("Change stream failed ({:?}): {}", e.class(), e);
                    }
                }
            }
            Err(e) => {
                failures += 1;
                warn!("Change stream connect failed ({:?}): {}", e.class(), e);
            }
        }

        if !settings.reconnect_stream {
            info!("Change stream reconnect disabled, relying on full sync");
            break;
        }

        let delay = calculate_backoff(failures, settings.backoff_initial, settings.backoff_max);
        debug!("Reconnecting change stream in {:?}", delay);
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Change stream supervisor stopped");
}

/// `initial` doubled per consecutive failure, capped at `max`
fn calculate_backoff(failures: u32, initial: Duration, max: Duration) -> Duration {
    initial
        .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1).min(16)))
        .min(max)
}
