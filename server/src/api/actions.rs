use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use commonware_utils::hex;
use fairroll_execution::{
    AccountView, AuthError, BetOutcome, BetRequest, Error, SettlementOracle, Store,
};
use fairroll_types::{
    BetRecord, Deposit, Direction, Identity, Page, SecretSeed, SettlementId, Withdrawal,
    MAX_WAGER_CENTS,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::Service;

/// Simple health response for basic liveness checks
#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Persistence(err) => ApiError::Internal(format!("{err:#}")),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Error::from(err).into()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("invalid request: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Internal(detail) => {
                error!(error = %detail, "request failed on persistence");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "internal error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: String,
}

#[derive(Deserialize)]
struct AuthParams {
    message: String,
    signature: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BetParams {
    #[serde(flatten)]
    auth: AuthParams,
    wager_cents: u64,
    roll_under: bool,
    threshold: u16,
    client_seed: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmountParams {
    #[serde(flatten)]
    auth: AuthParams,
    amount_cents: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositStatusParams {
    #[serde(flatten)]
    auth: AuthParams,
    deposit_id: String,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(flatten)]
    auth: AuthParams,
    #[serde(default)]
    count: i64,
    #[serde(default)]
    skip: i64,
}

#[derive(Serialize)]
struct PingResponse {
    response: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MaxBetResponse {
    max_bet_cents: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    id: Identity,
    server_seed_hash: String,
    balance_cents: u64,
}

impl From<AccountView> for UserResponse {
    fn from(view: AccountView) -> Self {
        Self {
            id: view.identity,
            server_seed_hash: hex(&view.commitment),
            balance_cents: view.balance,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BetResponse {
    won: bool,
    delta_cents: i64,
    server_seed: SecretSeed,
    result: u16,
    next_server_seed_hash: String,
    balance_cents: u64,
}

impl From<BetOutcome> for BetResponse {
    fn from(outcome: BetOutcome) -> Self {
        Self {
            won: outcome.won,
            delta_cents: outcome.delta,
            server_seed: outcome.secret_seed,
            result: outcome.outcome,
            next_server_seed_hash: hex(&outcome.next_commitment),
            balance_cents: outcome.balance,
        }
    }
}

#[derive(Serialize)]
struct SettlementLink {
    id: SettlementId,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BetEntry {
    id: u64,
    user_id: Identity,
    amount_cents: u64,
    roll_under: bool,
    threshold: u16,
    result: u16,
    won: bool,
    server_seed: SecretSeed,
    created_at: u64,
}

impl From<BetRecord> for BetEntry {
    fn from(bet: BetRecord) -> Self {
        Self {
            id: bet.id,
            user_id: bet.identity,
            amount_cents: bet.wager,
            roll_under: bet.direction.is_under(),
            threshold: bet.threshold,
            result: bet.outcome,
            won: bet.won,
            server_seed: bet.secret_seed,
            created_at: bet.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositEntry {
    id: SettlementId,
    user_id: Identity,
    url: String,
    amount_cents: u64,
    completed: bool,
    signature: String,
    created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<u64>,
}

impl From<Deposit> for DepositEntry {
    fn from(deposit: Deposit) -> Self {
        Self {
            completed: deposit.is_completed(),
            id: deposit.id,
            user_id: deposit.identity,
            url: deposit.url,
            amount_cents: deposit.amount,
            signature: deposit.signature.unwrap_or_default(),
            created_at: deposit.created_at,
            completed_at: deposit.completed_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalEntry {
    id: SettlementId,
    user_id: Identity,
    url: String,
    amount_cents: u64,
    signature: String,
    created_at: u64,
}

impl From<Withdrawal> for WithdrawalEntry {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            id: withdrawal.id,
            user_id: withdrawal.identity,
            url: withdrawal.url,
            amount_cents: withdrawal.amount,
            signature: withdrawal.signature,
            created_at: withdrawal.created_at,
        }
    }
}

fn params<T: DeserializeOwned>(request: Value) -> Result<T, ApiError> {
    Ok(serde_json::from_value(request)?)
}

fn reply<T: Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::Internal(err.to_string()))
}

fn list<T, U: Serialize + From<T>>(items: Vec<T>) -> Result<Value, ApiError> {
    reply(items.into_iter().map(U::from).collect::<Vec<_>>())
}

fn authenticate<S: Store, O: SettlementOracle>(
    service: &Service<S, O>,
    auth: &AuthParams,
) -> Result<Identity, ApiError> {
    Ok(service.auth().verify(&auth.message, &auth.signature)?)
}

async fn handle<S: Store, O: SettlementOracle>(
    service: &Service<S, O>,
    body: &[u8],
) -> Result<Value, ApiError> {
    let request: Value = serde_json::from_slice(body)?;
    let ActionEnvelope { action } = serde_json::from_value(request.clone())?;

    match action.as_str() {
        "ping" => reply(PingResponse { response: "pong" }),
        "max_bet" => reply(MaxBetResponse {
            max_bet_cents: MAX_WAGER_CENTS,
        }),
        "user_get" => {
            let p: AuthParams = params(request)?;
            let identity = authenticate(service, &p)?;
            let view = service.dice().account(&identity).await?;
            reply(UserResponse::from(view))
        }
        "bet" => {
            let p: BetParams = params(request)?;
            let identity = authenticate(service, &p.auth)?;
            let outcome = service
                .dice()
                .place_bet(
                    &identity,
                    BetRequest {
                        wager: p.wager_cents,
                        direction: Direction::from_roll_under(p.roll_under),
                        threshold: p.threshold,
                        client_seed: p.client_seed,
                    },
                )
                .await?;
            reply(BetResponse::from(outcome))
        }
        "deposit" => {
            let p: AmountParams = params(request)?;
            let identity = authenticate(service, &p.auth)?;
            let deposit = service
                .bridge()
                .create_deposit(&identity, p.amount_cents)
                .await?;
            reply(SettlementLink {
                id: deposit.id,
                url: deposit.url,
            })
        }
        "withdraw" => {
            let p: AmountParams = params(request)?;
            let identity = authenticate(service, &p.auth)?;
            let withdrawal = service
                .bridge()
                .create_withdrawal(&identity, p.amount_cents)
                .await?;
            reply(SettlementLink {
                id: withdrawal.id,
                url: withdrawal.url,
            })
        }
        "deposit_status" => {
            let p: DepositStatusParams = params(request)?;
            let identity = authenticate(service, &p.auth)?;
            let id = SettlementId::from_hex(&p.deposit_id)
                .map_err(|err| ApiError::BadRequest(format!("invalid deposit id: {err}")))?;
            let deposit = service.bridge().deposit_status(&identity, &id).await?;
            reply(DepositEntry::from(deposit))
        }
        "bet_list" => {
            let p: ListParams = params(request)?;
            let identity = authenticate(service, &p.auth)?;
            let bets = service
                .dice()
                .list_bets(&identity, Page::new(p.count, p.skip))
                .await?;
            list::<_, BetEntry>(bets)
        }
        "deposit_list" => {
            let p: ListParams = params(request)?;
            let identity = authenticate(service, &p.auth)?;
            let deposits = service
                .bridge()
                .list_deposits(&identity, Page::new(p.count, p.skip))
                .await?;
            list::<_, DepositEntry>(deposits)
        }
        "withdraw_list" => {
            let p: ListParams = params(request)?;
            let identity = authenticate(service, &p.auth)?;
            let withdrawals = service
                .bridge()
                .list_withdrawals(&identity, Page::new(p.count, p.skip))
                .await?;
            list::<_, WithdrawalEntry>(withdrawals)
        }
        other => Err(ApiError::BadRequest(format!("unknown action {other}"))),
    }
}

pub(super) async fn dispatch<S: Store, O: SettlementOracle>(
    AxumState(service): AxumState<Arc<Service<S, O>>>,
    body: Bytes,
) -> Response {
    match handle(&service, &body).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}
