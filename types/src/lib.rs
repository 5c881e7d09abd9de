//! Common fairroll types.
//!
//! Accounts, bets, deposits and withdrawals as they are stored and returned to callers,
//! plus the game constants shared by the execution layer and the server.

mod account;
mod bet;
mod constants;
mod page;
mod settlement;

pub use account::{
    decode_key_bytes, decode_public_key, Account, Identity, IdentityError, SecretSeed,
    PUBLIC_KEY_LEN,
};
pub use bet::{BetRecord, Direction};
pub use constants::*;
pub use page::Page;
pub use settlement::{
    Deposit, DepositConfirmation, DepositStatus, SettlementId, SettlementIdError, Withdrawal,
};
