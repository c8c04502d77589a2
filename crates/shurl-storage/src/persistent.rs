use crate::config::PersistentConfig;
use crate::error::PersistentError;
use async_trait::async_trait;
use jiff::Timestamp;
use parking_lot::RwLock;
use redb::{Database, DatabaseError, ReadableTable, Table, TableDefinition};
use shurl_core::{truncate, Context, Created, Error, Kind, Link, LinkStore, Result, Severity};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Link rows keyed by id; values are JSON-encoded [`Link`]s.
const LINKS: TableDefinition<u64, &str> = TableDefinition::new("links_v1");

/// Unique secondary index: target URL to id.
const URL_INDEX: TableDefinition<&str, u64> = TableDefinition::new("url_index_v1");

/// Engine bookkeeping. Holds the last assigned id so ids survive hard deletes
/// and restarts without being reused.
const META: TableDefinition<&str, u64> = TableDefinition::new("meta_v1");
const LAST_ID_KEY: &str = "last_id";

const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Transactional, disk-backed link store built on redb.
///
/// Every write runs in its own redb write transaction; redb admits a single
/// writer at a time, so concurrent hits on the same id are serialized by the
/// database itself and the engine takes no locks of its own beyond the handle
/// slot used by [`close`](LinkStore::close).
pub struct RedbLinkStore {
    path: PathBuf,
    db: RwLock<Option<Arc<Database>>>,
}

impl std::fmt::Debug for RedbLinkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbLinkStore")
            .field("path", &self.path)
            .field("open", &self.db.read().is_some())
            .finish()
    }
}

impl RedbLinkStore {
    /// Opens (or creates) the database file and its tables.
    ///
    /// If another handle holds the file, opening is retried until
    /// `config.open_timeout` elapses.
    pub async fn open(ctx: &Context, config: PersistentConfig) -> Result<Self> {
        let ctx = ctx
            .with_operation("redb.Open")
            .with_default_kind(Kind::Store);
        ctx.check_deadline()?;

        let path = config.path.clone();
        let timeout = config.open_timeout;
        let db = tokio::task::spawn_blocking(move || open_database(&path, timeout))
            .await
            .map_err(|e| PersistentError::Join(e.to_string()))
            .and_then(|opened| opened)
            .map_err(|e| {
                error!(path = %config.path.display(), error = %e, "Failed to open redb database");
                let kind = e.kind();
                Error::new(&ctx, e)
                    .with_kind(kind)
                    .with_message(format!("opening [{}] failed", config.path.display()))
            })?;

        debug!(path = %config.path.display(), "redb link store opened");
        Ok(Self {
            path: config.path,
            db: RwLock::new(Some(Arc::new(db))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn database(&self, ctx: &Context) -> Result<Arc<Database>> {
        self.db.read().clone().ok_or_else(|| Error::closed(ctx))
    }

    /// Runs `f` against the database on the blocking pool.
    async fn run<T, F>(&self, ctx: &Context, f: F) -> std::result::Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> std::result::Result<T, PersistentError> + Send + 'static,
    {
        ctx.check_deadline()?;
        let db = self.database(ctx)?;

        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| PersistentError::Join(e.to_string()))
            .and_then(|result| result)
            .map_err(|e| {
                error!(ops = %ctx.operations(), error = %e, "redb operation failed");
                let kind = e.kind();
                Error::new(ctx, e).with_kind(kind)
            })
    }
}

fn open_database(path: &Path, timeout: Duration) -> std::result::Result<Database, PersistentError> {
    let started = Instant::now();
    let db = loop {
        match Database::create(path) {
            Ok(db) => break db,
            Err(DatabaseError::DatabaseAlreadyOpen) if started.elapsed() < timeout => {
                std::thread::sleep(OPEN_RETRY_INTERVAL);
            }
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                return Err(PersistentError::OpenTimeout {
                    path: path.to_path_buf(),
                    timeout,
                });
            }
            Err(e) => return Err(e.into()),
        }
    };

    let tx = db.begin_write()?;
    {
        tx.open_table(LINKS)?;
        tx.open_table(URL_INDEX)?;
        tx.open_table(META)?;
    }
    tx.commit()?;

    Ok(db)
}

fn read_link<T>(links: &T, id: u64) -> std::result::Result<Option<Link>, PersistentError>
where
    T: ReadableTable<u64, &'static str>,
{
    match links.get(id)? {
        Some(raw) => Ok(Some(serde_json::from_str(raw.value())?)),
        None => Ok(None),
    }
}

fn write_link(
    links: &mut Table<u64, &'static str>,
    link: &Link,
) -> std::result::Result<(), PersistentError> {
    let raw = serde_json::to_string(link)?;
    links.insert(link.id, raw.as_str())?;
    Ok(())
}

fn create_link(
    db: &Database,
    target_url: &str,
    expired_at: Option<Timestamp>,
) -> std::result::Result<Created, PersistentError> {
    // An early return drops `tx` uncommitted, which aborts it.
    let tx = db.begin_write()?;
    let created = {
        let mut links = tx.open_table(LINKS)?;
        let mut index = tx.open_table(URL_INDEX)?;

        let existing = index.get(target_url)?.map(|id| id.value());
        match existing {
            Some(id) => {
                let mut link =
                    read_link(&links, id)?.ok_or(PersistentError::DanglingIndex { id })?;
                link.expired_at = expired_at;
                write_link(&mut links, &link)?;
                Created { id, created: false }
            }
            None => {
                let mut meta = tx.open_table(META)?;
                let last_id = meta.get(LAST_ID_KEY)?.map(|id| id.value()).unwrap_or(0);
                let id = last_id.checked_add(1).ok_or(PersistentError::IdExhausted)?;
                meta.insert(LAST_ID_KEY, id)?;

                let link = Link::new(id, target_url, expired_at);
                write_link(&mut links, &link)?;
                index.insert(target_url, id)?;
                Created { id, created: true }
            }
        }
    };
    tx.commit()?;
    Ok(created)
}

fn get_link(db: &Database, id: u64) -> std::result::Result<Option<Link>, PersistentError> {
    let tx = db.begin_read()?;
    let links = tx.open_table(LINKS)?;
    read_link(&links, id)
}

/// Applies `update` to the row inside one write transaction. Returns `None`
/// without writing anything if the row does not exist.
fn update_link<F>(db: &Database, id: u64, update: F) -> std::result::Result<Option<Link>, PersistentError>
where
    F: FnOnce(&mut Link) -> bool,
{
    let tx = db.begin_write()?;
    let link = {
        let mut links = tx.open_table(LINKS)?;
        let Some(mut link) = read_link(&links, id)? else {
            return Ok(None);
        };
        if update(&mut link) {
            write_link(&mut links, &link)?;
        }
        link
    };
    tx.commit()?;
    Ok(Some(link))
}

fn delete_link(db: &Database, id: u64) -> std::result::Result<bool, PersistentError> {
    let tx = db.begin_write()?;
    {
        let mut links = tx.open_table(LINKS)?;
        let removed: Option<Link> = match links.remove(id)? {
            Some(raw) => Some(serde_json::from_str(raw.value())?),
            None => None,
        };
        let Some(link) = removed else {
            return Ok(false);
        };

        let mut index = tx.open_table(URL_INDEX)?;
        index.remove(link.target_url.as_str())?;
    }
    tx.commit()?;
    Ok(true)
}

#[async_trait]
impl LinkStore for RedbLinkStore {
    async fn create(
        &self,
        ctx: &Context,
        target_url: &str,
        expired_at: Option<Timestamp>,
    ) -> Result<Created> {
        let ctx = ctx
            .with_operation("redb.Create")
            .with_default_kind(Kind::Store);
        trace!(url = %target_url, ops = %ctx.operations(), "creating link");

        let url = target_url.to_owned();
        let created = self
            .run(&ctx, move |db| create_link(db, &url, expired_at))
            .await
            .map_err(|e| e.with_message(format!("adding link [{}] failed", truncate(target_url, 24))))?;

        debug!(id = created.id, created = created.created, "link stored");
        Ok(created)
    }

    async fn get(&self, ctx: &Context, id: u64) -> Result<Link> {
        let ctx = ctx.with_operation("redb.Get").with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "getting link");

        self.run(&ctx, move |db| get_link(db, id))
            .await
            .map_err(|e| e.with_message(format!("getting link with id [{id}] failed")))?
            .ok_or_else(|| Error::not_found(&ctx, id))
    }

    async fn hit(&self, ctx: &Context, id: u64) -> Result<Link> {
        let ctx = ctx.with_operation("redb.Hit").with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "hitting link");

        self.run(&ctx, move |db| {
            update_link(db, id, |link| {
                link.hits = link.hits.saturating_add(1);
                true
            })
        })
        .await
        .map_err(|e| e.with_message(format!("hitting link with id [{id}] failed")))?
        .ok_or_else(|| Error::not_found(&ctx, id))
    }

    async fn set_deleted(&self, ctx: &Context, id: u64) -> Result<()> {
        let ctx = ctx
            .with_operation("redb.SetDeleted")
            .with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "soft-deleting link");

        let deleted_at = Timestamp::now();
        self.run(&ctx, move |db| {
            update_link(db, id, |link| {
                if link.deleted_at.is_some() {
                    return false;
                }
                link.deleted_at = Some(deleted_at);
                true
            })
        })
        .await
        .map_err(|e| e.with_message(format!("soft-deleting link with id [{id}] failed")))?
        .map(|_| debug!(id, "link soft-deleted"))
        .ok_or_else(|| Error::not_found(&ctx, id))
    }

    async fn delete(&self, ctx: &Context, id: u64) -> Result<()> {
        let ctx = ctx
            .with_operation("redb.Delete")
            .with_default_kind(Kind::Store);
        trace!(id, ops = %ctx.operations(), "deleting link");

        let removed = self
            .run(&ctx, move |db| delete_link(db, id))
            .await
            .map_err(|e| e.with_message(format!("deleting link with id [{id}] failed")))?;

        if !removed {
            return Err(Error::not_found(&ctx, id));
        }
        debug!(id, "link deleted");
        Ok(())
    }

    async fn close(&self, ctx: &Context) -> Result<()> {
        let ctx = ctx
            .with_operation("redb.Close")
            .with_default_kind(Kind::Store)
            .with_default_severity(Severity::Critical);

        // Operations still running hold their own handle; the file is released
        // once the last of them finishes.
        let db = self.db.write().take().ok_or_else(|| Error::closed(&ctx))?;
        drop(db);

        debug!(path = %self.path.display(), "redb link store closed");
        Ok(())
    }
}
