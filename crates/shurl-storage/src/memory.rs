mod snapshot;
mod table;
mod worker;

use crate::config::MemoryConfig;
use crate::error::MemoryError;
use async_trait::async_trait;
use jiff::Timestamp;
use parking_lot::Mutex;
use shurl_core::{truncate, Context, Created, Error, Kind, Link, LinkStore, Result, Severity};
use table::LinkTable;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};
use worker::Command;

/// Admission state shared by callers and [`close`](LinkStore::close).
#[derive(Debug)]
struct Gate {
    /// `None` once the stop signal has been raised.
    sender: Option<mpsc::Sender<Command>>,
    /// Requests admitted but not yet answered.
    pending: usize,
}

/// In-process link store whose state is owned by a single worker task.
///
/// Every operation, read or write, is a request message on a bounded channel
/// answered by the worker, so operations are linearized in arrival order and
/// the maps need no locking.
///
/// Closing stops admission first, waits until every admitted request has been
/// answered, then lets the worker exit and write its snapshot.
pub struct MemoryLinkStore {
    gate: Mutex<Gate>,
    drained: Notify,
    worker: Mutex<Option<JoinHandle<std::result::Result<(), crate::error::SnapshotError>>>>,
}

impl std::fmt::Debug for MemoryLinkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gate = self.gate.lock();
        f.debug_struct("MemoryLinkStore")
            .field("open", &gate.sender.is_some())
            .field("pending", &gate.pending)
            .finish()
    }
}

/// Proof of admission. Holds a sender clone and counts as pending until dropped.
struct Admission<'a> {
    store: &'a MemoryLinkStore,
    sender: mpsc::Sender<Command>,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        let mut gate = self.store.gate.lock();
        gate.pending -= 1;
        if gate.pending == 0 {
            self.store.drained.notify_waiters();
        }
    }
}

impl MemoryLinkStore {
    /// Starts the worker, seeding it from the snapshot file if one is
    /// configured. A missing snapshot is a fresh start; an unreadable one
    /// fails construction.
    pub async fn open(ctx: &Context, config: MemoryConfig) -> Result<Self> {
        let ctx = ctx.with_operation("mem.Open").with_default_kind(Kind::Store);
        ctx.check_deadline()?;

        let table = match &config.snapshot_path {
            Some(path) => snapshot::load(path).await.map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to load snapshot");
                let e = MemoryError::from(e);
                let kind = e.kind();
                Error::new(&ctx, e)
                    .with_kind(kind)
                    .with_severity(Severity::Critical)
                    .with_message(format!("loading snapshot [{}] failed", path.display()))
            })?,
            None => LinkTable::default(),
        };
        debug!(links = table.len(), snapshot = ?config.snapshot_path, "in-memory link store opened");

        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let worker = tokio::spawn(worker::run(receiver, table, config.snapshot_path));

        Ok(Self {
            gate: Mutex::new(Gate {
                sender: Some(sender),
                pending: 0,
            }),
            drained: Notify::new(),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn admit(&self, ctx: &Context) -> Result<Admission<'_>> {
        let mut gate = self.gate.lock();
        let sender = gate.sender.clone().ok_or_else(|| Error::closed(ctx))?;
        gate.pending += 1;
        Ok(Admission {
            store: self,
            sender,
        })
    }

    /// Sends one command to the worker and waits for its answer.
    async fn request<T>(
        &self,
        ctx: &Context,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        ctx.check_deadline()?;
        let admission = self.admit(ctx)?;

        let (reply, answer) = oneshot::channel();
        admission
            .sender
            .send(command(reply))
            .await
            .map_err(|_| worker_lost(ctx))?;
        let value = answer.await.map_err(|_| worker_lost(ctx))?;

        drop(admission);
        Ok(value)
    }

    /// Number of admitted requests still waiting for an answer.
    pub fn pending(&self) -> usize {
        self.gate.lock().pending
    }
}

fn worker_lost(ctx: &Context) -> Error {
    error!(ops = %ctx.operations(), "link worker is gone");
    Error::new(ctx, MemoryError::WorkerLost)
        .with_kind(Kind::Internal)
        .with_severity(Severity::Critical)
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn create(
        &self,
        ctx: &Context,
        target_url: &str,
        expired_at: Option<Timestamp>,
    ) -> Result<Created> {
        let ctx = ctx.with_operation("mem.Create").with_default_kind(Kind::Store);
        trace!(url = %target_url, ops = %ctx.operations(), "creating link");

        let target = target_url.to_owned();
        let created = self
            .request(&ctx, |reply| Command::Create {
                target_url: target,
                expired_at,
                reply,
            })
            .await?
            .map_err(|e| {
                let kind = e.kind();
                Error::new(&ctx, e).with_kind(kind).with_message(format!(
                    "adding link [{}] failed",
                    truncate(target_url, 24)
                ))
            })?;

        debug!(id = created.id, created = created.created, "link stored");
        Ok(created)
    }

    async fn get(&self, ctx: &Context, id: u64) -> Result<Link> {
        let ctx = ctx.with_operation("mem.Get").with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "getting link");

        self.request(&ctx, |reply| Command::Get { id, reply })
            .await?
            .ok_or_else(|| Error::not_found(&ctx, id))
    }

    async fn hit(&self, ctx: &Context, id: u64) -> Result<Link> {
        let ctx = ctx.with_operation("mem.Hit").with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "hitting link");

        self.request(&ctx, |reply| Command::Hit { id, reply })
            .await?
            .ok_or_else(|| Error::not_found(&ctx, id))
    }

    async fn set_deleted(&self, ctx: &Context, id: u64) -> Result<()> {
        let ctx = ctx
            .with_operation("mem.SetDeleted")
            .with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "soft-deleting link");

        if !self
            .request(&ctx, |reply| Command::SetDeleted { id, reply })
            .await?
        {
            return Err(Error::not_found(&ctx, id));
        }
        debug!(id, "link soft-deleted");
        Ok(())
    }

    async fn delete(&self, ctx: &Context, id: u64) -> Result<()> {
        let ctx = ctx.with_operation("mem.Delete").with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "deleting link");

        if !self
            .request(&ctx, |reply| Command::Delete { id, reply })
            .await?
        {
            return Err(Error::not_found(&ctx, id));
        }
        debug!(id, "link deleted");
        Ok(())
    }

    async fn close(&self, ctx: &Context) -> Result<()> {
        let ctx = ctx
            .with_operation("mem.Close")
            .with_default_kind(Kind::Store)
            .with_default_severity(Severity::Critical);

        // Stop signal: from here on `admit` refuses new requests.
        let sender = self.gate.lock().sender.take();
        let Some(sender) = sender else {
            return Err(Error::closed(&ctx));
        };

        // Wait for every admitted request to be answered.
        loop {
            let drained = self.drained.notified();
            let pending = self.gate.lock().pending;
            if pending == 0 {
                break;
            }
            trace!(pending, "waiting for in-flight requests");
            drained.await;
        }

        // With the last sender gone the worker drains its queue, exits and
        // writes the snapshot.
        drop(sender);
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return Err(Error::closed(&ctx));
        };

        match worker.await {
            Ok(Ok(())) => {
                debug!("in-memory link store closed");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to save snapshot on close");
                let e = MemoryError::from(e);
                let kind = e.kind();
                Err(Error::new(&ctx, e)
                    .with_kind(kind)
                    .with_message("closing mem store failed"))
            }
            Err(_) => Err(worker_lost(&ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn open_fresh() -> MemoryLinkStore {
        MemoryLinkStore::open(&Context::new(), MemoryConfig::builder().build())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_get_hit() {
        let store = open_fresh().await;
        let ctx = Context::new();

        let created = store.create(&ctx, "https://example.com", None).await.unwrap();
        assert_eq!(created, Created { id: 1, created: true });

        assert_eq!(store.hit(&ctx, 1).await.unwrap().hits, 1);
        assert_eq!(store.hit(&ctx, 1).await.unwrap().hits, 2);
        assert_eq!(store.get(&ctx, 1).await.unwrap().hits, 2);
        store.close(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn not_found_carries_the_operation_path() {
        let store = open_fresh().await;
        let ctx = Context::new().with_operation("app.Get");

        let err = store.get(&ctx, 42).await.unwrap_err();
        assert_eq!(err.kind(), Kind::NotFound);
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.operations().to_string(), "app.Get/mem.Get");
        store.close(&Context::new()).await.unwrap();
    }

    #[tokio::test]
    async fn closed_store_refuses_requests_immediately() {
        let store = open_fresh().await;
        let ctx = Context::new();
        store.close(&ctx).await.unwrap();

        let err = store.hit(&ctx, 1).await.unwrap_err();
        assert_eq!(err.kind(), Kind::Closed);
        assert_eq!(store.close(&ctx).await.unwrap_err().kind(), Kind::Closed);
        assert_eq!(store.pending(), 0);
    }

    #[tokio::test]
    async fn expired_deadline_is_rejected_before_admission() {
        let store = open_fresh().await;
        let ctx = Context::new().with_timeout(std::time::Duration::ZERO);

        let err = store.get(&ctx, 1).await.unwrap_err();
        assert_eq!(err.kind(), Kind::Interrupted);
        assert_eq!(store.pending(), 0);
        store.close(&Context::new()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_hits_are_not_lost() {
        let store = Arc::new(open_fresh().await);
        let ctx = Context::new();
        store.create(&ctx, "https://example.com", None).await.unwrap();

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.hit(&Context::new(), 1).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(&ctx, 1).await.unwrap().hits, 200);
        store.close(&ctx).await.unwrap();
    }
}
