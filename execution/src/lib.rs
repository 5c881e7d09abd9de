//! fairroll execution layer.
//!
//! This crate holds the trust core of the dice service:
//! - [`AuthVerifier`]: signed-message authentication against the game key.
//! - [`fairness`]: commit-reveal seeds, rolls and payouts.
//! - [`Ledger`]: compare-and-swap balance updates over an injected [`Store`].
//! - [`SettlementBridge`]: deposits and withdrawals reconciled with a [`SettlementOracle`].
//! - [`DiceTable`]: bet orchestration.
//!
//! ## Concurrency
//! Components hold no in-process locks across store or oracle calls. All
//! coordination between concurrent requests lives in the store's atomic
//! primitives; a lost compare-and-swap surfaces as [`Error::Conflict`].
//!
//! ## Minimal bet flow (example)
//! ```rust,ignore
//! use std::sync::Arc;
//! use fairroll_execution::{AuthVerifier, BetRequest, DiceTable, Memory};
//! use fairroll_types::Direction;
//!
//! # async fn example(verifier: AuthVerifier, message: &str, signature: &str) -> fairroll_execution::Result<()> {
//! let table = DiceTable::new(Arc::new(Memory::default()));
//! let identity = verifier.verify(message, signature)?;
//! let outcome = table
//!     .place_bet(
//!         &identity,
//!         BetRequest {
//!             wager: 0,
//!             direction: Direction::Under,
//!             threshold: 5_000,
//!             client_seed: "my-client-seed".to_string(),
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod dice;
mod error;
pub mod fairness;
mod ledger;
mod oracle;
pub mod settlement;
pub mod signing;
mod store;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use auth::{AuthStatement, AuthVerifier};
pub use dice::{AccountView, BetOutcome, BetRequest, DiceTable};
pub use error::{AuthError, Error, OracleError, Result, StoreError, ValidationError};
pub use ledger::Ledger;
pub use oracle::SettlementOracle;
pub use settlement::{SettlementBridge, DEFAULT_WITHDRAW_ATTEMPTS};
pub use store::Store;
#[cfg(any(test, feature = "mocks"))]
pub use store::{Fault, Memory};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
