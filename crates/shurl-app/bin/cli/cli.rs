use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORE_ENV: &str = "SHURL_STORE";
pub const DB_PATH_ENV: &str = "SHURL_DB_PATH";
pub const DB_TIMEOUT_MS_ENV: &str = "SHURL_DB_TIMEOUT_MS";
pub const SNAPSHOT_PATH_ENV: &str = "SHURL_SNAPSHOT_PATH";
pub const TOKEN_PRIME_ENV: &str = "SHURL_TOKEN_PRIME";
pub const TOKEN_MASK_ENV: &str = "SHURL_TOKEN_MASK";
pub const TOKEN_MIN_LENGTH_ENV: &str = "SHURL_TOKEN_MIN_LENGTH";
pub const LOG_FORMAT_ENV: &str = "SHURL_LOG_FORMAT";

pub const DEFAULT_DB_PATH: &str = "links.redb";
pub const DEFAULT_DB_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreArg {
    #[value(name = "persistent")]
    Persistent,
    #[value(name = "memory")]
    Memory,
}

impl Display for StoreArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreArg::Persistent => write!(f, "persistent"),
            StoreArg::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "shurl", about = "Shorten, resolve and retire links")]
pub struct CLI {
    #[arg(long, env = STORE_ENV, value_enum, default_value_t = StoreArg::Persistent)]
    pub store: StoreArg,

    #[arg(long, env = DB_PATH_ENV, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, env = DB_TIMEOUT_MS_ENV, default_value_t = DEFAULT_DB_TIMEOUT_MS)]
    pub db_timeout_ms: u64,

    /// Snapshot file of the memory store; without it nothing is persisted.
    #[arg(long, env = SNAPSHOT_PATH_ENV)]
    pub snapshot_path: Option<PathBuf>,

    #[arg(long, env = TOKEN_PRIME_ENV, value_parser = parse_u64)]
    pub token_prime: Option<u64>,

    #[arg(long, env = TOKEN_MASK_ENV, value_parser = parse_u64)]
    pub token_mask: Option<u64>,

    #[arg(long, env = TOKEN_MIN_LENGTH_ENV)]
    pub token_min_length: Option<usize>,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a URL and print its token.
    Create {
        url: String,
        /// Seconds until the link stops redirecting.
        #[arg(long)]
        expire_in: Option<i64>,
    },
    /// Show a link, live or not.
    Info { token: String },
    /// Count a redirect and print the target.
    Hit { token: String },
    /// Soft-delete a link.
    Delete { token: String },
}

/// Accepts decimal or `0x`-prefixed hexadecimal.
fn parse_u64(raw: &str) -> Result<u64, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => raw.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number [{raw}]: {e}"))
}
