//! Change stream consumer
//!
//! Reads frames from one open stream connection, decodes them into change
//! events and applies them to the record cache. A sibling keep-alive task owns
//! the write half. The consumer never reconnects; that policy belongs to the
//! coordinator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::store::{ApplyOutcome, RecordCache};
use crate::client::models::ChangeEvent;
use crate::client::{KeepAlive, StreamConnection, StreamFrame};
use crate::error::Result;

/// Upper bound on waiting for the close handshake at shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct EventConsumer {
    cache: Arc<RecordCache>,
    resync: Arc<Notify>,
    keepalive_interval: Duration,
    missed_updates_before_resync: u32,
}

impl EventConsumer {
    pub fn new(
        cache: Arc<RecordCache>,
        resync: Arc<Notify>,
        keepalive_interval: Duration,
        missed_updates_before_resync: u32,
    ) -> Self {
        Self {
            cache,
            resync,
            keepalive_interval,
            missed_updates_before_resync,
        }
    }

    /// Consume `connection` until it ends.
    ///
    /// Returns `Ok` when `shutdown` is cancelled or the remote closes normally,
    /// and the transport error otherwise. The keep-alive task has finished by
    /// the time this returns.
    pub async fn run(&self, connection: StreamConnection, shutdown: &CancellationToken) -> Result<()> {
        let StreamConnection {
            mut frames,
            keepalive,
        } = connection;

        let keepalive_stop = shutdown.child_token();
        let keepalive_task = tokio::spawn(keep_alive(
            keepalive,
            self.keepalive_interval,
            keepalive_stop.clone(),
        ));

        let mut missed = 0u32;
        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                frame = frames.next() => match frame {
                    Some(Ok(frame)) => self.handle_frame(frame, &mut missed),
                    Some(Err(e)) => break Err(e.into()),
                    None => {
                        info!("Change stream closed by remote");
                        break Ok(());
                    }
                },
            }
        };

        keepalive_stop.cancel();
        if let Err(e) = keepalive_task.await {
            warn!("Keep-alive task ended abnormally: {}", e);
        }

        result
    }

    fn handle_frame(&self, frame: StreamFrame, missed: &mut u32) {
        let text = match frame {
            StreamFrame::Text(text) => text,
            StreamFrame::Binary(data) => {
                debug!("Ignoring {} byte binary frame", data.len());
                return;
            }
        };

        let event = match ChangeEvent::decode(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping undecodable change event: {}", e);
                return;
            }
        };

        let kind = event.kind();
        let key = event.key().to_string();
        let is_update = matches!(
            event,
            ChangeEvent::DomainUpdate(_) | ChangeEvent::UrlUpdate(_)
        );

        match self.cache.apply(event, Utc::now().timestamp()) {
            ApplyOutcome::Applied => debug!("Applied {} for {}", kind, key),
            ApplyOutcome::Missing if is_update => {
                *missed += 1;
                debug!("Ignored {} for unknown key {}", kind, key);
                if *missed >= self.missed_updates_before_resync {
                    info!(
                        "{} updates referenced unknown keys, requesting full sync",
                        missed
                    );
                    *missed = 0;
                    self.resync.notify_one();
                }
            }
            ApplyOutcome::Missing => debug!("Ignored {} for unknown key {}", kind, key),
        }
    }
}

/// Send a liveness frame every `period` until `stop` is cancelled, then close
/// the connection.
async fn keep_alive(mut keepalive: Box<dyn KeepAlive>, period: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sent = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            sent = keepalive.ping() => sent,
        };

        if let Err(e) = sent {
            // The read loop will observe the broken connection
            warn!("Keep-alive failed: {}", e);
            return;
        }
    }

    if tokio::time::timeout(CLOSE_TIMEOUT, keepalive.close())
        .await
        .is_err()
    {
        debug!("Change stream close timed out");
    }
}
