use commonware_cryptography::ed25519::PublicKey;
use fairroll_types::{DepositConfirmation, SettlementId};
use std::future::Future;

use crate::OracleError;

/// External service of record for deposit confirmation.
pub trait SettlementOracle: Send + Sync + 'static {
    /// Returns `None` while the deposit has not landed.
    fn deposit_status(
        &self,
        game: &PublicKey,
        id: &SettlementId,
    ) -> impl Future<Output = Result<Option<DepositConfirmation>, OracleError>> + Send;
}
