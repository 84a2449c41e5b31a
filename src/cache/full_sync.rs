//! Full remote-to-local resynchronization

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::credential::CredentialStore;
use super::store::RecordCache;
use crate::client::RegistryApi;
use crate::client::models::Family;
use crate::error::Result;

/// Record counts installed by a successful sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub domains: usize,
    pub urls: usize,
}

/// Replaces each family with the registry's authoritative set
pub struct FullSync<T: RegistryApi> {
    api: Arc<T>,
    credentials: Arc<CredentialStore>,
    cache: Arc<RecordCache>,
    last_synced: Mutex<Option<DateTime<Utc>>>,
}

impl<T: RegistryApi> FullSync<T> {
    pub fn new(api: Arc<T>, credentials: Arc<CredentialStore>, cache: Arc<RecordCache>) -> Self {
        Self {
            api,
            credentials,
            cache,
            last_synced: Mutex::new(None),
        }
    }

    /// Sync every family.
    ///
    /// Both families are fetched before either is installed, and the two
    /// replacements run back to back with no await between them. A failed
    /// fetch, or cancellation while fetching, leaves every family's previous
    /// snapshot in place.
    pub async fn sync(&self) -> Result<SyncReport> {
        let credential = self.credentials.require().await?;

        let fetched = tokio::try_join!(
            logged(Family::Domain, self.api.fetch_domains(&credential)),
            logged(Family::Url, self.api.fetch_urls(&credential)),
        );
        let (domains, urls) = fetched?;

        let report = SyncReport {
            domains: self.cache.domains.replace_all(domains),
            urls: self.cache.urls.replace_all(urls),
        };

        *self.last_synced.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        info!(
            "Full sync installed {} domains and {} urls",
            report.domains, report.urls
        );
        Ok(report)
    }

    /// When the last fully successful sync finished
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        *self.last_synced.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sync every `period`, or early when `resync` is notified, until
    /// `shutdown` is cancelled. A sync in flight at cancellation is dropped
    /// while still fetching, before it replaces anything.
    pub async fn run(&self, period: Duration, resync: Arc<Notify>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                _ = resync.notified() => {
                    info!("Early full sync requested");
                    ticker.reset();
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Full sync abandoned on shutdown");
                    break;
                }
                result = self.sync() => {
                    if let Err(e) = result {
                        warn!("Scheduled full sync failed, keeping previous snapshot: {}", e);
                    }
                }
            }
        }

        info!("Full sync loop stopped");
    }
}

async fn logged<R>(family: Family, request: impl Future<Output = Result<R>>) -> Result<R> {
    request.await.inspect_err(|e| {
        warn!("Full sync of {} records failed ({:?}): {}", family, e.class(), e);
    })
}
