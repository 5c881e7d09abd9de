//! Ed25519 key generation for a fairroll deployment
//!
//! Usage: cargo run --bin generate-keys -- --output secrets/authority.key
//!
//! Prints the hex seed, the 64-byte `seed || public` form accepted by
//! `WITHDRAW_AUTHORITY_PRIVATE_KEY`, and the base58 public key (usable as `GAME`).

use anyhow::{Context, Result};
use clap::Parser;
use commonware_utils::hex;
use ed25519_dalek::SigningKey;
use fairroll_execution::signing;
use rand::{rngs::OsRng, rngs::StdRng, SeedableRng};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "generate-keys")]
#[command(about = "Generate an Ed25519 keypair for the game or the withdrawal authority")]
struct Args {
    /// Deterministic seed (local testing only; omit for OS randomness)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write the hex seed to this file (for WITHDRAW_AUTHORITY_PRIVATE_KEY_FILE)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("generate-keys failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let private = match args.seed {
        Some(seed) => SigningKey::generate(&mut StdRng::seed_from_u64(seed)),
        None => SigningKey::generate(&mut OsRng),
    };
    let identity = signing::identity(&private).context("derived public key is not a valid point")?;
    let seed_hex = hex(&private.to_bytes());
    let pair_hex = format!("{seed_hex}{}", hex(private.verifying_key().as_bytes()));

    println!("Private seed (hex):     {seed_hex}");
    println!("Keypair (hex):          {pair_hex}");
    println!("Public key (base58):    {}", identity.to_base58());

    if let Some(path) = &args.output {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, format!("{seed_hex}\n"))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!();
        println!("Seed written to {}", path.display());
    }

    Ok(())
}
