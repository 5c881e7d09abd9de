//! Deposit and withdrawal records plus the amount-carrying settlement identifier.
//!
//! A settlement identifier is 32 bytes:
//! ```text
//! [0..24)  random
//! [24..32) little-endian u64 = amount_cents * RAW_PER_CENT
//! ```
//! Embedding the amount lets the settlement oracle check the requested amount
//! without trusting a second channel.

use commonware_utils::{from_hex, hex};
use rand::{rngs::OsRng, RngCore};
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error as ThisError;

use crate::{Identity, RAW_PER_CENT, SETTLEMENT_ID_LEN, SETTLEMENT_ID_RANDOM_LEN};

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum SettlementIdError {
    #[error("amount too large to encode (cents={cents})")]
    AmountOverflow { cents: u64 },
    #[error("invalid settlement id hex")]
    InvalidHex,
    #[error("invalid settlement id length (got={got}, expected=32)")]
    InvalidLength { got: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettlementId([u8; SETTLEMENT_ID_LEN]);

impl SettlementId {
    /// Generate a fresh identifier carrying `amount_cents`.
    ///
    /// Panics if the OS entropy source fails.
    pub fn generate(amount_cents: u64) -> Result<Self, SettlementIdError> {
        let mut random = [0u8; SETTLEMENT_ID_RANDOM_LEN];
        if let Err(err) = OsRng.try_fill_bytes(&mut random) {
            panic!("entropy source failed while generating settlement id: {err}");
        }
        Self::from_parts(random, amount_cents)
    }

    pub fn from_parts(
        random: [u8; SETTLEMENT_ID_RANDOM_LEN],
        amount_cents: u64,
    ) -> Result<Self, SettlementIdError> {
        let raw = amount_cents
            .checked_mul(RAW_PER_CENT)
            .ok_or(SettlementIdError::AmountOverflow {
                cents: amount_cents,
            })?;
        let mut id = [0u8; SETTLEMENT_ID_LEN];
        id[..SETTLEMENT_ID_RANDOM_LEN].copy_from_slice(&random);
        id[SETTLEMENT_ID_RANDOM_LEN..].copy_from_slice(&raw.to_le_bytes());
        Ok(Self(id))
    }

    pub fn from_bytes(bytes: [u8; SETTLEMENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SETTLEMENT_ID_LEN] {
        &self.0
    }

    /// Amount in settlement units, as embedded in bytes `[24..32)`.
    pub fn raw_amount(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[SETTLEMENT_ID_RANDOM_LEN..]);
        u64::from_le_bytes(raw)
    }

    pub fn amount_cents(&self) -> u64 {
        self.raw_amount() / RAW_PER_CENT
    }

    pub fn to_hex(&self) -> String {
        hex(&self.0)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, SettlementIdError> {
        let bytes = from_hex(encoded).ok_or(SettlementIdError::InvalidHex)?;
        let got = bytes.len();
        let id: [u8; SETTLEMENT_ID_LEN] = bytes
            .try_into()
            .map_err(|_| SettlementIdError::InvalidLength { got })?;
        Ok(Self(id))
    }
}

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SettlementId({})", self.to_hex())
    }
}

impl Serialize for SettlementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepositStatus {
    Pending,
    Completed,
}

/// Proof from the settlement oracle that a deposit landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositConfirmation {
    pub signature: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deposit {
    pub id: SettlementId,
    pub identity: Identity,
    pub url: String,
    /// Amount in cents.
    pub amount: u64,
    pub status: DepositStatus,
    pub signature: Option<String>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl Deposit {
    pub fn pending(
        id: SettlementId,
        identity: Identity,
        url: String,
        amount: u64,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            identity,
            url,
            amount,
            status: DepositStatus::Pending,
            signature: None,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DepositStatus::Completed
    }
}

/// An authorized withdrawal. The balance is debited before (or atomically with) its creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Withdrawal {
    pub id: SettlementId,
    pub identity: Identity,
    pub url: String,
    /// Amount in cents.
    pub amount: u64,
    /// Hex ed25519 signature by the withdrawal authority.
    pub signature: String,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_id_embeds_raw_amount() {
        let id = SettlementId::generate(1_234).unwrap();
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&id.as_bytes()[24..32]);
        assert_eq!(u64::from_le_bytes(tail), 1_234 * 10_000_000);
        assert_eq!(id.amount_cents(), 1_234);
    }

    #[test]
    fn generated_ids_differ_in_random_prefix() {
        let a = SettlementId::generate(500).unwrap();
        let b = SettlementId::generate(500).unwrap();
        assert_ne!(a.as_bytes()[..24], b.as_bytes()[..24]);
    }

    #[test]
    fn amount_overflow_is_rejected() {
        assert_eq!(
            SettlementId::generate(u64::MAX),
            Err(SettlementIdError::AmountOverflow { cents: u64::MAX })
        );
    }

    #[test]
    fn hex_parsing_checks_length() {
        let id = SettlementId::from_parts([9u8; 24], 10).unwrap();
        assert_eq!(SettlementId::from_hex(&id.to_hex()), Ok(id));
        assert_eq!(
            SettlementId::from_hex("00ff"),
            Err(SettlementIdError::InvalidLength { got: 2 })
        );
        assert_eq!(
            SettlementId::from_hex("zz"),
            Err(SettlementIdError::InvalidHex)
        );
    }

    proptest! {
        #[test]
        fn embedded_amount_survives_any_prefix(
            random in proptest::array::uniform24(any::<u8>()),
            cents in 0u64..=(u64::MAX / 10_000_000),
        ) {
            let id = SettlementId::from_parts(random, cents).unwrap();
            prop_assert_eq!(id.raw_amount(), cents * 10_000_000);
            prop_assert_eq!(&id.as_bytes()[..24], &random[..]);
        }
    }
}
