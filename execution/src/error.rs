use fairroll_types::Direction;
use thiserror::Error;

/// Rejections produced while authenticating a caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid auth message format: {0}")]
    Malformed(String),
    #[error("invalid game in auth message (provided {provided}, expected {expected})")]
    WrongGame { provided: String, expected: String },
    #[error("expiry of auth message: only valid from {from} to {to}, but time is {now}")]
    Expired { from: u64, to: u64, now: u64 },
    #[error("invalid auth message signature")]
    BadSignature,
    #[error("record not owned by authenticated user")]
    NotOwner,
}

/// Request parameters that break a game or settlement rule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid threshold: rolling {direction} requires {min}..={max}, but got {got}")]
    ThresholdOutOfRange {
        direction: Direction,
        min: u16,
        max: u16,
        got: u16,
    },
    #[error("incorrect client seed length: got {len}, but must be within [{min}, {max}]")]
    ClientSeedLength { len: usize, min: usize, max: usize },
    #[error("invalid bet: the maximum wager is {max} cents, but got {got}")]
    WagerTooLarge { max: u64, got: u64 },
    #[error("insufficient balance: have {balance} cents, need {requested}")]
    InsufficientBalance { balance: u64, requested: u64 },
    #[error("amount must be greater than 0")]
    ZeroAmount,
    #[error("amount too large: {0} cents")]
    AmountTooLarge(u64),
    #[error("mismatching identities for compare-and-swap")]
    IdentityMismatch,
}

/// Failures reported by a [`crate::Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("compare-and-swap lost: stored row no longer matches the expected snapshot")]
    Conflict,
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("store failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Failures reported by a [`crate::SettlementOracle`].
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("settlement oracle unreachable: {0}")]
    Unreachable(String),
    #[error("settlement oracle returned a malformed response: {0}")]
    Malformed(String),
    #[error("settlement oracle rejected the query: {0}")]
    Rejected(String),
}

/// Error type for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("concurrent update conflict, please retry")]
    Conflict,
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    ExternalService(#[from] OracleError),
    #[error("persistence error: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Error::Conflict,
            StoreError::NotFound { kind, id } => Error::NotFound { kind, id },
            StoreError::Persistence(err) => Error::Persistence(err),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        assert!(matches!(Error::from(StoreError::Conflict), Error::Conflict));
        let err = Error::from(StoreError::not_found("deposit", "abcd"));
        assert_eq!(err.to_string(), "deposit abcd not found");
        let err = Error::from(StoreError::Persistence(anyhow::anyhow!("disk full")));
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn messages_are_human_readable() {
        let err = Error::from(ValidationError::ThresholdOutOfRange {
            direction: Direction::Over,
            min: 197,
            max: 9_899,
            got: 100,
        });
        assert_eq!(
            err.to_string(),
            "invalid threshold: rolling over requires 197..=9899, but got 100"
        );
    }
}
