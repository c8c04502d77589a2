use serde::Deserialize;
use shurl_core::{Tokenizer, TokenizerError};
use typed_builder::TypedBuilder;

const LOWER_40_BITS_MASK: u64 = (1_u64 << 40) - 1;

/// Largest id the obfuscated tokenizer can encode.
pub const MAX_ID: u64 = LOWER_40_BITS_MASK;

/// Length of the decoded payload: 5 bytes of obfuscated id plus a check byte.
const PAYLOAD_LEN: usize = 6;

/// Base58 digit for zero, used to left-pad short tokens.
const PAD: char = '1';

pub const DEFAULT_PRIME: u64 = 0x9E37_79B1;
pub const DEFAULT_MASK: u64 = 0xB5_AD4E_CEDA;
pub const DEFAULT_MIN_LENGTH: usize = 8;

/// Configures an [`ObfuscatedTokenizer`].
///
/// Two tokenizers agree on every token if and only if their settings agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder, Deserialize)]
pub struct TokenizerSettings {
    /// Odd multiplier; only its lower 40 bits are used.
    #[builder(default = DEFAULT_PRIME)]
    #[serde(default = "default_prime")]
    pub prime: u64,
    /// XOR mask; only its lower 40 bits are used.
    #[builder(default = DEFAULT_MASK)]
    #[serde(default = "default_mask")]
    pub mask: u64,
    /// Tokens shorter than this are left-padded with `1`.
    #[builder(default = DEFAULT_MIN_LENGTH)]
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

fn default_prime() -> u64 {
    DEFAULT_PRIME
}

fn default_mask() -> u64 {
    DEFAULT_MASK
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

impl Default for TokenizerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Multiplicative and XOR-based obfuscation of ids in u40 space, rendered in
/// base58 with a trailing check byte.
///
/// Consecutive ids produce unrelated looking tokens, and a token minted under
/// another configuration is rejected by the check byte with probability
/// 255/256 and by the canonical re-encoding otherwise.
#[derive(Debug, Clone)]
pub struct ObfuscatedTokenizer {
    prime: u64,
    inverse: u64,
    mask: u64,
    min_length: usize,
}

impl ObfuscatedTokenizer {
    pub fn try_new(settings: TokenizerSettings) -> Result<Self, TokenizerError> {
        let prime = settings.prime & LOWER_40_BITS_MASK;
        if prime % 2 == 0 {
            return Err(TokenizerError::InvalidConfig(format!(
                "prime {:#x} must be odd",
                settings.prime
            )));
        }

        Ok(Self {
            prime,
            inverse: inverse_mod_2_64(prime) & LOWER_40_BITS_MASK,
            mask: settings.mask & LOWER_40_BITS_MASK,
            min_length: settings.min_length,
        })
    }

    pub fn prime(&self) -> u64 {
        self.prime
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    fn obfuscate(&self, id: u64) -> u64 {
        (id.wrapping_mul(self.prime) & LOWER_40_BITS_MASK) ^ self.mask
    }

    fn reveal(&self, obfuscated: u64) -> u64 {
        ((obfuscated ^ self.mask).wrapping_mul(self.inverse)) & LOWER_40_BITS_MASK
    }

    fn check_byte(&self, obfuscated: u64) -> u8 {
        let mixed = (obfuscated ^ self.prime.rotate_left(23) ^ self.mask.rotate_left(7))
            .wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (mixed >> 56) as u8
    }
}

impl Default for ObfuscatedTokenizer {
    fn default() -> Self {
        let prime = DEFAULT_PRIME & LOWER_40_BITS_MASK;
        Self {
            prime,
            inverse: inverse_mod_2_64(prime) & LOWER_40_BITS_MASK,
            mask: DEFAULT_MASK & LOWER_40_BITS_MASK,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

impl Tokenizer for ObfuscatedTokenizer {
    fn encode(&self, id: u64) -> Result<String, TokenizerError> {
        if id > MAX_ID {
            return Err(TokenizerError::OutOfRange { id, max: MAX_ID });
        }

        let obfuscated = self.obfuscate(id);
        let raw = obfuscated.to_be_bytes();
        let payload = [
            raw[3],
            raw[4],
            raw[5],
            raw[6],
            raw[7],
            self.check_byte(obfuscated),
        ];

        let encoded = bs58::encode(payload).into_string();
        let padding = self.min_length.saturating_sub(encoded.len());
        let mut token = String::with_capacity(encoded.len() + padding);
        token.extend(std::iter::repeat(PAD).take(padding));
        token.push_str(&encoded);
        Ok(token)
    }

    fn decode(&self, token: &str) -> Result<u64, TokenizerError> {
        let invalid = || TokenizerError::InvalidToken(token.to_owned());

        let bytes = bs58::decode(token).into_vec().map_err(|_| invalid())?;
        if bytes.len() < PAYLOAD_LEN {
            return Err(invalid());
        }
        let (padding, payload) = bytes.split_at(bytes.len() - PAYLOAD_LEN);
        if padding.iter().any(|&b| b != 0) {
            return Err(invalid());
        }

        let obfuscated = u64::from_be_bytes([
            0, 0, 0, payload[0], payload[1], payload[2], payload[3], payload[4],
        ]);
        if payload[5] != self.check_byte(obfuscated) {
            return Err(invalid());
        }

        let id = self.reveal(obfuscated);
        // Only the exact token `encode` produces is accepted, so every id has
        // a single spelling.
        if self.encode(id)? != token {
            return Err(invalid());
        }
        Ok(id)
    }
}

/// Inverse of an odd `value` modulo 2^64 by Newton iteration. Each step
/// doubles the number of correct low bits, starting from 3.
fn inverse_mod_2_64(value: u64) -> u64 {
    let mut inverse = value;
    for _ in 0..5 {
        inverse = inverse.wrapping_mul(2_u64.wrapping_sub(value.wrapping_mul(inverse)));
    }
    inverse
}
