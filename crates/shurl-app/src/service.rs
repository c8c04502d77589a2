use crate::error::CompensationFailed;
use jiff::Timestamp;
use serde::Serialize;
use shurl_core::{
    truncate, Cause, Context, Error, Kind, Link, LinkStore, Result, Severity, Tokenizer,
};
use std::sync::Arc;
use tracing::{debug, error, trace};
use url::Url;

/// Outcome of [`LinkService::create_token`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenCreated {
    pub token: String,
    pub id: u64,
    /// `false` if the URL was already stored and only its expiration changed.
    pub created: bool,
}

/// Orchestrates a [`LinkStore`] and a [`Tokenizer`].
///
/// The service holds no state of its own and is safe to share between
/// concurrent callers.
#[derive(Debug)]
pub struct LinkService<S, T> {
    store: Arc<S>,
    tokenizer: Arc<T>,
}

impl<S, T> Clone for LinkService<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tokenizer: Arc::clone(&self.tokenizer),
        }
    }
}

impl<S: LinkStore, T: Tokenizer> LinkService<S, T> {
    pub fn new(store: S, tokenizer: T) -> Self {
        Self {
            store: Arc::new(store),
            tokenizer: Arc::new(tokenizer),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Stores `target_url` and returns the token for its id.
    ///
    /// If the token cannot be produced for a freshly inserted row, the row is
    /// deleted again before the tokenizer error is returned.
    pub async fn create_token(
        &self,
        ctx: &Context,
        target_url: &str,
        expired_at: Option<Timestamp>,
    ) -> Result<TokenCreated> {
        let ctx = ctx.with_operation("app.Create");
        trace!(url = %target_url, ops = %ctx.operations(), "creating token");

        validate_url(&ctx, target_url)?;

        let stored = self
            .store
            .create(&ctx, target_url, expired_at)
            .await
            .map_err(|e| {
                Error::wrap(
                    &ctx,
                    e,
                    format!("creating token for url [{}] failed", truncate(target_url, 32)),
                )
            })?;

        let token = match self.tokenizer.encode(stored.id) {
            Ok(token) => token,
            // The row predates this call and other tokens may point at it.
            Err(e) if !stored.created => {
                return Err(tokenizer_error(&ctx, e)
                    .with_message(format!("encoding id [{}] failed", stored.id)))
            }
            Err(e) => return Err(self.compensate(&ctx, stored.id, e).await),
        };

        debug!(id = stored.id, created = stored.created, token = %token, "token created");
        Ok(TokenCreated {
            token,
            id: stored.id,
            created: stored.created,
        })
    }

    async fn compensate(&self, ctx: &Context, id: u64, encode: shurl_core::TokenizerError) -> Error {
        debug!(id, error = %encode, "encoding failed, removing link");
        // The rollback belongs to an operation already admitted, so the
        // caller's deadline must not refuse it.
        match self.store.delete(&ctx.without_deadline(), id).await {
            Ok(()) => tokenizer_error(ctx, encode)
                .with_message(format!("encoding id [{id}] failed, link removed")),
            Err(delete) => {
                error!(id, error = %delete, "Failed to remove link after encoding failed");
                Error::new(ctx, CompensationFailed::new(id, encode, delete))
                    .with_kind(Kind::Internal)
                    .with_severity(Severity::Critical)
            }
        }
    }

    /// Returns the link behind `token` whether or not it is still live.
    pub async fn get_link(&self, ctx: &Context, token: &str) -> Result<Link> {
        let ctx = ctx.with_operation("app.Get");
        trace!(token, ops = %ctx.operations(), "getting link");

        let id = self.decode(&ctx, token)?;
        self.store.get(&ctx, id).await.map_err(|e| {
            Error::wrap(&ctx, e, format!("getting link for token [{token}] failed"))
        })
    }

    /// Counts a redirect through `token` and returns the updated link.
    ///
    /// Deleted, expired and unknown links all fail with the same not-found
    /// error and leave the hit counter untouched.
    pub async fn hit_link(&self, ctx: &Context, token: &str) -> Result<Link> {
        let ctx = ctx.with_operation("app.Hit");
        trace!(token, ops = %ctx.operations(), "hitting link");

        let id = self.decode(&ctx, token)?;
        let unavailable = || {
            Error::not_found(&ctx, id).with_message(format!("hitting link for token [{token}] failed"))
        };
        let hide_not_found = |e: Error| {
            if e.is_not_found() {
                unavailable()
            } else {
                Error::wrap(&ctx, e, format!("hitting link for token [{token}] failed"))
            }
        };

        let link = self.store.get(&ctx, id).await.map_err(hide_not_found)?;
        let now = Timestamp::now();
        if !link.is_accessible_at(now) {
            debug!(
                id,
                deleted = link.is_deleted_at(now),
                expired = link.is_expired_at(now),
                "link is not accessible"
            );
            return Err(unavailable());
        }

        self.store.hit(&ctx, id).await.map_err(hide_not_found)
    }

    /// Soft-deletes the link behind `token`.
    pub async fn delete_link(&self, ctx: &Context, token: &str) -> Result<()> {
        let ctx = ctx.with_operation("app.Delete");
        trace!(token, ops = %ctx.operations(), "deleting link");

        let id = self.decode(&ctx, token)?;
        self.store.set_deleted(&ctx, id).await.map_err(|e| {
            Error::wrap(&ctx, e, format!("deleting link for token [{token}] failed"))
        })?;

        debug!(id, token, "link soft-deleted");
        Ok(())
    }

    pub async fn close(&self, ctx: &Context) -> Result<()> {
        let ctx = ctx.with_operation("app.Close");
        self.store
            .close(&ctx)
            .await
            .map_err(|e| Error::wrap(&ctx, e, "closing link service failed"))
    }

    fn decode(&self, ctx: &Context, token: &str) -> Result<u64> {
        self.tokenizer.decode(token).map_err(|e| {
            tokenizer_error(ctx, e)
                .with_severity(Severity::Warning)
                .with_message(format!("decoding token [{token}] failed"))
        })
    }
}

fn tokenizer_error(ctx: &Context, e: shurl_core::TokenizerError) -> Error {
    Error::new(ctx, e).with_kind(Kind::Tokenizer)
}

/// Accepts any absolute URL.
fn validate_url(ctx: &Context, target_url: &str) -> Result<()> {
    Url::parse(target_url).map(|_| ()).map_err(|e| {
        Error::new(
            ctx,
            Cause::InvalidUrl {
                url: truncate(target_url, 32),
                reason: e.to_string(),
            },
        )
        .with_kind(Kind::InvalidValue)
        .with_severity(Severity::Warning)
    })
}
