//! Commit-reveal fairness for the dice game.
//!
//! ## Flow
//!
//! 1. **Commit** - Every account holds a secret seed; only `sha256(seed)` is published.
//! 2. **Roll** - The caller supplies a client seed; the outcome is derived from both.
//! 3. **Reveal** - The consumed seed is returned with the result and a fresh seed replaces it.
//! 4. **Verify** - Anyone can check `sha256(revealed) == commitment` and recompute the roll.
//!
//! ```text
//! digest  = sha256(secret_seed || client_seed)
//! outcome = u64_le(digest[0..8]) mod 10000
//! ```

use commonware_cryptography::{sha256::Sha256, Hasher};
use fairroll_types::{
    Direction, SecretSeed, CLIENT_SEED_MAX_LENGTH, CLIENT_SEED_MIN_LENGTH, HOUSE_EDGE_PCT,
    ROLL_MODULUS, SECRET_SEED_LEN,
};
use rand::{rngs::OsRng, RngCore};

use crate::ValidationError;

/// Draw a fresh secret seed from the OS CSPRNG.
///
/// Panics if the entropy source fails: a degraded seed would break fairness.
pub fn new_secret_seed() -> SecretSeed {
    let mut seed = [0u8; SECRET_SEED_LEN];
    if let Err(err) = OsRng.try_fill_bytes(&mut seed) {
        panic!("entropy source failed while generating secret seed: {err}");
    }
    SecretSeed(seed)
}

/// Commitment published for `seed`: `sha256(seed)`.
pub fn commitment(seed: &SecretSeed) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.finalize().0
}

/// Returns `true` if `commit == sha256(seed)`.
pub fn verify_commitment(commit: &[u8; 32], seed: &SecretSeed) -> bool {
    commit == &commitment(seed)
}

/// Derive an outcome in `[0, ROLL_MODULUS)` from a secret seed and client seed.
pub fn roll(seed: &SecretSeed, client_seed: &[u8]) -> u16 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(client_seed);
    let digest = hasher.finalize().0;

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(head) % ROLL_MODULUS as u64) as u16
}

pub fn validate_threshold(direction: Direction, threshold: u16) -> Result<(), ValidationError> {
    let range = direction.threshold_range();
    if range.contains(&threshold) {
        return Ok(());
    }
    Err(ValidationError::ThresholdOutOfRange {
        direction,
        min: *range.start(),
        max: *range.end(),
        got: threshold,
    })
}

/// Client seeds are bounded in characters, not bytes.
pub fn validate_client_seed(client_seed: &str) -> Result<(), ValidationError> {
    let len = client_seed.chars().count();
    if (CLIENT_SEED_MIN_LENGTH..=CLIENT_SEED_MAX_LENGTH).contains(&len) {
        return Ok(());
    }
    Err(ValidationError::ClientSeedLength {
        len,
        min: CLIENT_SEED_MIN_LENGTH,
        max: CLIENT_SEED_MAX_LENGTH,
    })
}

pub fn wins(direction: Direction, threshold: u16, outcome: u16) -> bool {
    match direction {
        Direction::Under => outcome < threshold,
        Direction::Over => outcome > threshold,
    }
}

/// Number of winning outcomes out of `ROLL_MODULUS`.
pub fn basis(direction: Direction, threshold: u16) -> u16 {
    match direction {
        Direction::Under => threshold,
        Direction::Over => ROLL_MODULUS - threshold,
    }
}

/// Gross payout for a winning `wager`: `floor(wager * 10000 * (100 - edge) / (basis * 100))`.
///
/// Saturates at `u64::MAX`; callers cap wagers well below that.
pub fn payout(wager: u64, basis: u16) -> u64 {
    let numerator = wager as u128 * ROLL_MODULUS as u128 * (100 - HOUSE_EDGE_PCT) as u128;
    let denominator = basis as u128 * 100;
    u64::try_from(numerator / denominator).unwrap_or(u64::MAX)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: u16,
    pub won: bool,
    /// Gross payout (zero on a loss).
    pub payout: u64,
    /// Signed balance change in cents.
    pub delta: i64,
}

/// Settle an already-rolled outcome. `threshold` must have been validated.
pub fn settle(wager: u64, direction: Direction, threshold: u16, outcome: u16) -> Resolution {
    let won = wins(direction, threshold, outcome);
    let payout = if won {
        payout(wager, basis(direction, threshold))
    } else {
        0
    };
    let delta = clamp_i64(payout as i128 - wager as i128);
    Resolution {
        outcome,
        won,
        payout,
        delta,
    }
}

/// Validate the threshold, roll, and settle.
pub fn resolve(
    seed: &SecretSeed,
    client_seed: &[u8],
    wager: u64,
    direction: Direction,
    threshold: u16,
) -> Result<Resolution, ValidationError> {
    validate_threshold(direction, threshold)?;
    Ok(settle(wager, direction, threshold, roll(seed, client_seed)))
}

/// Apply a signed delta to a balance, clamping at zero.
pub fn apply_delta(balance: u64, delta: i64) -> u64 {
    let next = balance as i128 + delta as i128;
    u64::try_from(next.max(0)).unwrap_or(u64::MAX)
}

fn clamp_i64(value: i128) -> i64 {
    if value > i64::MAX as i128 {
        i64::MAX
    } else if value < i64::MIN as i128 {
        i64::MIN
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairroll_types::{OVER_MAX, OVER_MIN, UNDER_MAX, UNDER_MIN};
    use proptest::prelude::*;

    #[test]
    fn test_payout_law() {
        let win = settle(1000, Direction::Under, 5000, 3000);
        assert!(win.won);
        assert_eq!(win.payout, 1980);
        assert_eq!(win.delta, 980);

        let loss = settle(1000, Direction::Under, 5000, 6000);
        assert!(!loss.won);
        assert_eq!(loss.payout, 0);
        assert_eq!(loss.delta, -1000);
    }

    #[test]
    fn test_over_uses_complement_basis() {
        assert_eq!(basis(Direction::Over, 5000), 5000);
        assert_eq!(basis(Direction::Over, 9_899), 101);
        let win = settle(1000, Direction::Over, 5000, 5001);
        assert!(win.won);
        assert_eq!(win.payout, 1980);
        // Equal to threshold loses in both directions.
        assert!(!wins(Direction::Over, 5000, 5000));
        assert!(!wins(Direction::Under, 5000, 5000));
    }

    #[test]
    fn test_payout_uses_wide_arithmetic() {
        // 2^40 * 10000 * 99 overflows u64.
        let wager = 1u64 << 40;
        assert_eq!(
            payout(wager, 5000),
            ((wager as u128 * 10_000 * 99) / 500_000) as u64
        );
    }

    #[test]
    fn test_threshold_validation() {
        for (direction, low, high) in [
            (Direction::Under, UNDER_MIN, UNDER_MAX),
            (Direction::Over, OVER_MIN, OVER_MAX),
        ] {
            assert!(validate_threshold(direction, low).is_ok());
            assert!(validate_threshold(direction, high).is_ok());
            assert_eq!(
                validate_threshold(direction, low - 1),
                Err(ValidationError::ThresholdOutOfRange {
                    direction,
                    min: low,
                    max: high,
                    got: low - 1,
                })
            );
            assert!(validate_threshold(direction, high + 1).is_err());
        }
    }

    #[test]
    fn test_client_seed_counts_characters() {
        assert!(validate_client_seed("abcdef").is_ok());
        assert!(validate_client_seed("abcde").is_err());
        assert!(validate_client_seed(&"x".repeat(32)).is_ok());
        assert!(validate_client_seed(&"x".repeat(33)).is_err());
        // Six characters, twelve bytes.
        assert!(validate_client_seed("éééééé").is_ok());
    }

    #[test]
    fn test_commitment_matches_reveal() {
        let seed = new_secret_seed();
        let commit = commitment(&seed);
        assert!(verify_commitment(&commit, &seed));
        assert!(!verify_commitment(&commit, &new_secret_seed()));
    }

    #[test]
    fn test_apply_delta_clamps_at_zero() {
        assert_eq!(apply_delta(500, -1000), 0);
        assert_eq!(apply_delta(500, 980), 1480);
        assert_eq!(apply_delta(1000, -1000), 0);
    }

    #[test]
    fn test_resolve_rejects_bad_threshold() {
        let seed = SecretSeed([1; 32]);
        assert!(resolve(&seed, b"client", 10, Direction::Over, 100).is_err());
        let resolution = resolve(&seed, b"client", 10, Direction::Over, 500).unwrap();
        assert_eq!(resolution.outcome, roll(&seed, b"client"));
    }

    proptest! {
        #[test]
        fn roll_is_pure_and_in_range(
            seed in proptest::array::uniform32(any::<u8>()),
            client in "[ -~]{6,32}",
        ) {
            let secret = SecretSeed(seed);
            let outcome = roll(&secret, client.as_bytes());
            prop_assert!(outcome < ROLL_MODULUS);
            prop_assert_eq!(outcome, roll(&secret, client.as_bytes()));

            let mut hasher = Sha256::new();
            hasher.update(&seed);
            hasher.update(client.as_bytes());
            let digest = hasher.finalize().0;
            let expected = u64::from_le_bytes(digest[..8].try_into().unwrap()) % 10_000;
            prop_assert_eq!(outcome as u64, expected);
        }

        #[test]
        fn winning_delta_is_never_below_loss(
            wager in 0u64..=30_000_000,
            threshold in UNDER_MIN..=UNDER_MAX,
            outcome in 0u16..10_000,
        ) {
            let resolution = settle(wager, Direction::Under, threshold, outcome);
            prop_assert!(resolution.delta >= -(wager as i64));
            prop_assert_eq!(resolution.won, outcome < threshold);
        }
    }
}
