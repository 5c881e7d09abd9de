use anyhow::Context;
use commonware_cryptography::ed25519::PublicKey;
use fairroll_execution::{OracleError, SettlementOracle};
use fairroll_types::{DepositConfirmation, Identity, SettlementId};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Settlement oracle reached over HTTP.
///
/// `GET <base>/games/<game base58>/deposits/<id hex>` answers with
/// `{"status":"ok","data":{"signature":..,"timestamp":..}|null}` or
/// `{"status":"err","msg":..}`.
#[derive(Clone, Debug)]
pub struct HttpOracle {
    client: Client,
    base: Url,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum OracleResponse {
    Ok { data: Option<ConfirmationBody> },
    Err { msg: String },
}

#[derive(Deserialize)]
struct ConfirmationBody {
    signature: String,
    timestamp: u64,
}

impl HttpOracle {
    pub fn new(base: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build oracle http client")?;
        Ok(Self { client, base })
    }

    fn deposit_url(&self, game: &PublicKey, id: &SettlementId) -> String {
        format!(
            "{}/games/{}/deposits/{}",
            self.base.as_str().trim_end_matches('/'),
            Identity::from_public_key(game.clone()).to_base58(),
            id.to_hex()
        )
    }
}

fn parse_deposit_response(
    body: &str,
    status: u16,
) -> Result<Option<DepositConfirmation>, OracleError> {
    let parsed: OracleResponse = serde_json::from_str(body)
        .map_err(|err| OracleError::Malformed(format!("{err} (HTTP {status})")))?;
    match parsed {
        OracleResponse::Ok { data } => Ok(data.map(|data| DepositConfirmation {
            signature: data.signature,
            timestamp: data.timestamp,
        })),
        OracleResponse::Err { msg } => Err(OracleError::Rejected(msg)),
    }
}

impl SettlementOracle for HttpOracle {
    async fn deposit_status(
        &self,
        game: &PublicKey,
        id: &SettlementId,
    ) -> Result<Option<DepositConfirmation>, OracleError> {
        let url = self.deposit_url(game, id);
        debug!(url = %url, "querying settlement oracle");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| OracleError::Unreachable(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| OracleError::Unreachable(err.to_string()))?;
        parse_deposit_response(&body, status)
    }
}
