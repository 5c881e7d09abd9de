use anyhow::{anyhow, bail, Context, Result};
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::from_hex;
use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use fairroll_types::decode_public_key;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::{ApiConfig, ServiceConfig};

pub const DEFAULT_AUTH_DOMAIN: &str = "ivypowered.com";
pub const DEFAULT_SETTLEMENT_SITE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_ORACLE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the server binary needs to start.
#[derive(Debug)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub oracle_url: Url,
    pub oracle_timeout: Duration,
    pub service: ServiceConfig,
    pub api: ApiConfig,
}

/// Decode the base58 game key.
pub fn decode_game_key(encoded: &str) -> Result<PublicKey> {
    decode_public_key(encoded.trim()).context("invalid game key")
}

/// Decode the withdrawal authority key from hex.
///
/// Accepts the 32-byte seed or the 64-byte `seed || public` form; in the latter
/// the public half must match the key derived from the seed.
pub fn decode_authority_key(hex_str: &str) -> Result<SigningKey> {
    let bytes = from_hex(hex_str.trim().trim_start_matches("0x"))
        .ok_or_else(|| anyhow!("invalid withdraw authority key hex"))?;
    if bytes.len() != SECRET_KEY_LENGTH && bytes.len() != 2 * SECRET_KEY_LENGTH {
        bail!(
            "withdraw authority key must be 32 or 64 bytes, got {}",
            bytes.len()
        );
    }
    let (seed, public) = bytes.split_at(SECRET_KEY_LENGTH);
    let seed: [u8; SECRET_KEY_LENGTH] = seed
        .try_into()
        .context("failed to decode withdraw authority key")?;
    let key = SigningKey::from_bytes(&seed);
    if !public.is_empty() && key.verifying_key().as_bytes().as_slice() != public {
        bail!("withdraw authority public key does not match its seed");
    }
    Ok(key)
}

pub fn parse_url(name: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value.trim()).with_context(|| format!("invalid {name}: {value}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("invalid {name}: expected http(s) URL, got {value}");
    }
    Ok(url)
}
