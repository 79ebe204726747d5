//! # Realtime Subscription
//!
//! Scoped ownership of the remote change feed for one business.
//!
//! ## Lifecycle
//! ```text
//! acquire(business A)
//!      │  remote.subscribe(tables, A) ─► ChangeFeed
//!      │  spawn pump: feed ─► merge_event ─► collections + cache
//!      ▼
//!   (active)
//!      │
//! release()                      business switch, sign-out, dispose
//!      │  stop pump (shutdown channel, then join)
//!      │  remote.unsubscribe(handle) for every handle
//!      ▼
//!   (gone: no channel left open for A)
//! ```
//!
//! Dropping without `release` aborts the pump; the remote channels are then
//! closed by the remote when it notices the dead receiver.

use std::sync::Arc;

use tally_core::{ChangeEvent, Table};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::merge::merge_event;
use crate::remote::{with_timeout, ChannelHandle};

pub struct RealtimeSubscription {
    ctx: Arc<SyncContext>,
    business_id: String,
    handles: Vec<ChannelHandle>,
    shutdown_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    /// Opens the feed for `business_id` and starts merging it.
    pub async fn acquire(
        ctx: Arc<SyncContext>,
        business_id: &str,
        tables: &[Table],
    ) -> SyncResult<Self> {
        let feed = with_timeout(
            ctx.request_timeout(),
            ctx.remote().subscribe(tables, business_id),
        )
        .await?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(pump(
            ctx.clone(),
            business_id.to_string(),
            feed.events,
            shutdown_rx,
        ));

        info!(
            business_id,
            channels = feed.handles.len(),
            "Realtime subscription acquired"
        );

        Ok(RealtimeSubscription {
            ctx,
            business_id: business_id.to_string(),
            handles: feed.handles,
            shutdown_tx,
            task: Some(task),
        })
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    pub fn handles(&self) -> &[ChannelHandle] {
        &self.handles
    }

    /// Stops merging and closes every remote channel.
    ///
    /// Unsubscribe failures are logged; the local side is torn down anyway.
    pub async fn release(mut self) {
        // The pump may already have exited if the feed closed.
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(?e, "Realtime pump ended abnormally");
            }
        }

        for handle in &self.handles {
            let result = with_timeout(
                self.ctx.request_timeout(),
                self.ctx.remote().unsubscribe(handle),
            )
            .await;
            if let Err(e) = result {
                warn!(table = %handle.table, error = %e, "Failed to unsubscribe channel");
            }
        }

        info!(business_id = %self.business_id, "Realtime subscription released");
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn pump(
    ctx: Arc<SyncContext>,
    business_id: String,
    mut events: mpsc::Receiver<ChangeEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    debug!(%business_id, "Realtime pump starting");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    warn!(%business_id, "Realtime feed closed by remote");
                    break;
                };
                if let Err(e) = merge_event(&ctx, &event, &business_id).await {
                    error!(table = %event.table, ?e, "Failed to merge realtime change");
                }
            }

            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    debug!(%business_id, "Realtime pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, product, BUSINESS};
    use std::time::Duration;
    use tally_core::{ChangeOperation, Entity};

    #[tokio::test]
    async fn test_feed_is_merged_until_release() {
        let (ctx, remote, _cache) = context().await;
        let subscription = RealtimeSubscription::acquire(ctx.clone(), BUSINESS, &Table::ALL)
            .await
            .unwrap();
        assert_eq!(subscription.handles().len(), 3);
        assert_eq!(remote.active_channels().await, 3);

        remote
            .external_change(
                Table::Products,
                ChangeOperation::Insert,
                product("p1", 100, 4).to_record().unwrap(),
            )
            .await;

        for _ in 0..100 {
            if ctx.collections.read().await.products.get("p1").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ctx.collections.read().await.products.get("p1").unwrap().stock, 4);

        subscription.release().await;
        assert_eq!(remote.active_channels().await, 0);

        remote
            .external_change(
                Table::Products,
                ChangeOperation::Insert,
                product("p2", 100, 1).to_record().unwrap(),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ctx.collections.read().await.products.get("p2").is_none());
    }

    #[tokio::test]
    async fn test_acquire_fails_offline() {
        let (ctx, remote, _cache) = context().await;
        remote.set_online(false);

        let result = RealtimeSubscription::acquire(ctx, BUSINESS, &[Table::Products]).await;
        assert!(result.is_err());
        assert_eq!(remote.active_channels().await, 0);
    }
}
