use crate::context::Context;
use crate::error::Result;
use crate::link::Link;
use async_trait::async_trait;
use jiff::Timestamp;

/// Outcome of [`LinkStore::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    pub id: u64,
    /// `false` when an existing row for the same URL was updated instead.
    pub created: bool,
}

/// The storage contract every engine implements with identical semantics.
///
/// The store does not apply expiration or soft-delete policy: [`hit`] counts
/// whatever row it is given. Gating belongs to the application service.
///
/// [`hit`]: LinkStore::hit
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Inserts a row for `target_url`, or, if one already exists, only
    /// replaces its `expired_at`.
    async fn create(
        &self,
        ctx: &Context,
        target_url: &str,
        expired_at: Option<Timestamp>,
    ) -> Result<Created>;

    /// Returns the row regardless of its expiration or soft-delete state.
    async fn get(&self, ctx: &Context, id: u64) -> Result<Link>;

    /// Atomically increments `hits` and returns the updated row.
    async fn hit(&self, ctx: &Context, id: u64) -> Result<Link>;

    /// Sets `deleted_at` to now unless already set.
    async fn set_deleted(&self, ctx: &Context, id: u64) -> Result<()>;

    /// Removes the row and its URL index entry for good.
    async fn delete(&self, ctx: &Context, id: u64) -> Result<()>;

    /// Releases the engine. Every call afterwards fails with `Kind::Closed`.
    async fn close(&self, ctx: &Context) -> Result<()>;
}

#[async_trait]
impl<S: LinkStore + ?Sized> LinkStore for Box<S> {
    async fn create(
        &self,
        ctx: &Context,
        target_url: &str,
        expired_at: Option<Timestamp>,
    ) -> Result<Created> {
        (**self).create(ctx, target_url, expired_at).await
    }

    async fn get(&self, ctx: &Context, id: u64) -> Result<Link> {
        (**self).get(ctx, id).await
    }

    async fn hit(&self, ctx: &Context, id: u64) -> Result<Link> {
        (**self).hit(ctx, id).await
    }

    async fn set_deleted(&self, ctx: &Context, id: u64) -> Result<()> {
        (**self).set_deleted(ctx, id).await
    }

    async fn delete(&self, ctx: &Context, id: u64) -> Result<()> {
        (**self).delete(ctx, id).await
    }

    async fn close(&self, ctx: &Context) -> Result<()> {
        (**self).close(ctx).await
    }
}
