mod cli;

use crate::cli::{Command, LogFormat, StoreArg, CLI};
use anyhow::Context as _;
use clap::Parser;
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use shurl_app::LinkService;
use shurl_core::{Context, Error, Kind, Link, LinkStore};
use shurl_storage::{open_store, MemoryConfig, PersistentConfig, StoreConfig};
use shurl_tokenizer::{ObfuscatedTokenizer, TokenizerSettings};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Readable rendering of a [`Link`] for stdout.
#[derive(Debug, Serialize)]
struct LinkView<'a> {
    token: &'a str,
    id: u64,
    url: &'a str,
    created_at: Timestamp,
    expired_at: Option<Timestamp>,
    deleted_at: Option<Timestamp>,
    hits: u64,
}

impl<'a> LinkView<'a> {
    fn new(token: &'a str, link: &'a Link) -> Self {
        Self {
            token,
            id: link.id,
            url: &link.target_url,
            created_at: link.created_at,
            expired_at: link.expired_at,
            deleted_at: link.deleted_at,
            hits: link.hits,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(store = %config.store, "starting shurl");

    let mut settings = TokenizerSettings::builder().build();
    if let Some(prime) = config.token_prime {
        settings.prime = prime;
    }
    if let Some(mask) = config.token_mask {
        settings.mask = mask;
    }
    if let Some(min_length) = config.token_min_length {
        settings.min_length = min_length;
    }
    let tokenizer = ObfuscatedTokenizer::try_new(settings).context("invalid tokenizer settings")?;

    let store_config = match config.store {
        StoreArg::Persistent => StoreConfig::Persistent(
            PersistentConfig::builder()
                .path(config.db_path)
                .open_timeout(Duration::from_millis(config.db_timeout_ms))
                .build(),
        ),
        StoreArg::Memory => StoreConfig::Memory(MemoryConfig {
            snapshot_path: config.snapshot_path,
            ..MemoryConfig::builder().build()
        }),
    };

    let ctx = Context::with_request_id(format!("cli-{}", Timestamp::now().as_millisecond()));
    let store = match open_store(&ctx, store_config).await {
        Ok(store) => store,
        Err(e) => return Ok(report(&e)),
    };
    let service = LinkService::new(store, tokenizer);

    let outcome = run(&service, &ctx, config.command).await;
    let closed = service.close(&ctx).await;

    match (outcome, closed) {
        (Ok(output), Ok(())) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        (Ok(output), Err(e)) => {
            println!("{output}");
            Ok(report(&e))
        }
        (Err(e), closed) => {
            if let Err(close) = closed {
                close.log();
            }
            Ok(report(&e))
        }
    }
}

async fn run(
    service: &LinkService<Box<dyn LinkStore>, ObfuscatedTokenizer>,
    ctx: &Context,
    command: Command,
) -> Result<String, Error> {
    let output = match command {
        Command::Create { url, expire_in } => {
            let expired_at = match expire_in {
                Some(secs) => Some(expires_after(ctx, secs)?),
                None => None,
            };
            let created = service.create_token(ctx, &url, expired_at).await?;
            serde_json::to_string_pretty(&created)
        }
        Command::Info { token } => {
            let link = service.get_link(ctx, &token).await?;
            serde_json::to_string_pretty(&LinkView::new(&token, &link))
        }
        Command::Hit { token } => {
            let link = service.hit_link(ctx, &token).await?;
            serde_json::to_string_pretty(&LinkView::new(&token, &link))
        }
        Command::Delete { token } => {
            service.delete_link(ctx, &token).await?;
            serde_json::to_string_pretty(&serde_json::json!({ "token": token, "deleted": true }))
        }
    };
    output.map_err(|e| Error::new(ctx, e).with_kind(Kind::Internal))
}

fn expires_after(ctx: &Context, secs: i64) -> Result<Timestamp, Error> {
    Timestamp::now()
        .checked_add(SignedDuration::from_secs(secs))
        .map_err(|e| {
            Error::new(ctx, e)
                .with_kind(Kind::InvalidValue)
                .with_message(format!("expiration {secs}s is out of range"))
        })
}

/// Logs `err` and maps its root kind to the process exit code.
fn report(err: &Error) -> ExitCode {
    err.log();
    let kind = err.root_kind();
    eprintln!("error ({kind}): {err}");
    match kind {
        Kind::InvalidValue | Kind::Tokenizer => ExitCode::from(2),
        Kind::NotFound => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
