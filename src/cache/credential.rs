//! Session credential store and proactive renewal

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::RegistryApi;
use crate::client::models::{Credential, Permission};
use crate::error::{ApiError, Result};

/// Holds the single active session credential.
///
/// Starts empty. A renewal publishes a fully obtained credential in one swap,
/// so readers see either the old or the new value and never wait on the
/// remote call.
#[derive(Default)]
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current credential, if one has been obtained
    pub async fn current(&self) -> Option<Credential> {
        self.current.read().await.clone()
    }

    /// The current credential, or `MissingCredential` before the first renewal
    pub async fn require(&self) -> Result<Credential> {
        self.current()
            .await
            .ok_or_else(|| ApiError::MissingCredential.into())
    }

    pub async fn publish(&self, credential: Credential) {
        *self.current.write().await = Some(credential);
    }
}

/// Renews the session credential on a fixed cadence
pub struct CredentialRefresher<T: RegistryApi> {
    api: Arc<T>,
    store: Arc<CredentialStore>,
    permissions: Vec<Permission>,
    interval: Duration,
}

impl<T: RegistryApi> CredentialRefresher<T> {
    pub fn new(
        api: Arc<T>,
        store: Arc<CredentialStore>,
        permissions: Vec<Permission>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            store,
            permissions,
            interval,
        }
    }

    /// Request a new credential and publish it.
    ///
    /// On failure the previously published credential stays in place.
    pub async fn refresh(&self) -> Result<Credential> {
        let credential = self.api.request_credential(&self.permissions).await?;

        if !self.covers_next_interval(&credential) {
            warn!(
                "Session token expires at {}, less than one interval after the next renewal",
                credential.expires_at
            );
        }

        self.store.publish(credential.clone()).await;
        debug!("Session token renewed, expires at {}", credential.expires_at);
        Ok(credential)
    }

    /// Whether `credential` stays valid for one full interval past the next
    /// renewal, so the held token never has less than an interval left.
    fn covers_next_interval(&self, credential: &Credential) -> bool {
        let horizon = chrono::Duration::seconds(2 * self.interval.as_secs() as i64);
        !credential.expires_within(horizon)
    }

    /// Renew every interval until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.refresh() => {
                    if let Err(e) = result {
                        warn!(
                            "Session token renewal failed ({:?}), keeping previous token: {}",
                            e.class(),
                            e
                        );
                    }
                }
            }
        }

        info!("Credential refresher stopped");
    }
}
