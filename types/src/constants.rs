/// Length of a per-account secret seed in bytes.
pub const SECRET_SEED_LEN: usize = 32;

/// Rolls are drawn uniformly from `[0, ROLL_MODULUS)`.
pub const ROLL_MODULUS: u16 = 10_000;

/// House edge applied to every winning payout, in percent.
pub const HOUSE_EDGE_PCT: u64 = 1;

/// Valid thresholds when rolling under.
pub const UNDER_MIN: u16 = 1;
pub const UNDER_MAX: u16 = 9_802;

/// Valid thresholds when rolling over.
pub const OVER_MIN: u16 = 197;
pub const OVER_MAX: u16 = 9_899;

/// Largest single wager, in cents.
pub const MAX_WAGER_CENTS: u64 = 300000_00;

/// Client seed length bounds (characters, inclusive).
pub const CLIENT_SEED_MIN_LENGTH: usize = 6;
pub const CLIENT_SEED_MAX_LENGTH: usize = 32;

/// Settlement units per cent (1 unit = 10^9 raw, 1 cent = 10^7 raw).
pub const RAW_PER_CENT: u64 = 10_000_000;

/// Settlement identifiers are 32 bytes: 24 random bytes followed by the raw amount.
pub const SETTLEMENT_ID_LEN: usize = 32;
pub const SETTLEMENT_ID_RANDOM_LEN: usize = 24;

/// List pagination.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
