use crate::error::{MemoryError, SnapshotError};
use crate::memory::snapshot;
use crate::memory::table::LinkTable;
use jiff::Timestamp;
use shurl_core::{Created, Link};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// A request to the link worker together with the channel its answer goes to.
#[derive(Debug)]
pub(crate) enum Command {
    Create {
        target_url: String,
        expired_at: Option<Timestamp>,
        reply: oneshot::Sender<Result<Created, MemoryError>>,
    },
    Get {
        id: u64,
        reply: oneshot::Sender<Option<Link>>,
    },
    Hit {
        id: u64,
        reply: oneshot::Sender<Option<Link>>,
    },
    SetDeleted {
        id: u64,
        reply: oneshot::Sender<bool>,
    },
    Delete {
        id: u64,
        reply: oneshot::Sender<bool>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Get { .. } => "get",
            Command::Hit { .. } => "hit",
            Command::SetDeleted { .. } => "set_deleted",
            Command::Delete { .. } => "delete",
        }
    }
}

/// Serves commands in arrival order until every sender is gone, then writes
/// the final state to `snapshot_path`.
pub(crate) async fn run(
    mut commands: mpsc::Receiver<Command>,
    mut table: LinkTable,
    snapshot_path: Option<PathBuf>,
) -> Result<(), SnapshotError> {
    debug!(links = table.len(), "link worker started");

    while let Some(command) = commands.recv().await {
        trace!(command = command.name(), "serving command");
        apply(&mut table, command);
    }

    debug!(links = table.len(), "link worker stopped");
    match snapshot_path {
        Some(path) => {
            snapshot::save(path.clone(), table.snapshot()).await?;
            debug!(path = %path.display(), links = table.len(), "snapshot saved");
            Ok(())
        }
        None => Ok(()),
    }
}

// A dropped reply receiver means the caller stopped waiting; the mutation has
// been applied regardless, so send errors are ignored.
fn apply(table: &mut LinkTable, command: Command) {
    match command {
        Command::Create {
            target_url,
            expired_at,
            reply,
        } => {
            let _ = reply.send(table.create(target_url, expired_at));
        }
        Command::Get { id, reply } => {
            let _ = reply.send(table.get(id));
        }
        Command::Hit { id, reply } => {
            let _ = reply.send(table.hit(id));
        }
        Command::SetDeleted { id, reply } => {
            let _ = reply.send(table.set_deleted(id, Timestamp::now()));
        }
        Command::Delete { id, reply } => {
            let _ = reply.send(table.delete(id));
        }
    }
}
