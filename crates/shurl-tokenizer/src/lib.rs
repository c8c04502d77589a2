//! Reversible id to token codecs.

mod obfuscated;

pub use obfuscated::{ObfuscatedTokenizer, TokenizerSettings, MAX_ID};
pub use shurl_core::{Tokenizer, TokenizerError};
