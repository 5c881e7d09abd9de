use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use fairroll_execution::{signing, DEFAULT_WITHDRAW_ATTEMPTS};
use fairroll_server::{
    decode_authority_key, decode_game_key, parse_url, Api, ApiConfig, HttpOracle, ServerConfig,
    Service, ServiceConfig, SqliteStore, DEFAULT_AUTH_DOMAIN, DEFAULT_ORACLE_TIMEOUT,
    DEFAULT_ORACLE_URL, DEFAULT_SETTLEMENT_SITE_URL,
};
use fairroll_types::Identity;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "fairroll-server".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("fairroll-server");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Path to the SQLite database (created when missing).
    #[arg(long, env = "DB_PATH", default_value = "./fairroll.db")]
    db_path: PathBuf,

    /// Base58 public key of the game this server operates.
    #[arg(long, env = "GAME")]
    game: String,

    /// Hex withdrawal authority key (32-byte seed or 64-byte seed || public).
    #[arg(long, env = "WITHDRAW_AUTHORITY_PRIVATE_KEY", hide_env_values = true)]
    withdraw_authority_key: Option<String>,

    /// File holding the hex withdrawal authority key.
    #[arg(long, env = "WITHDRAW_AUTHORITY_PRIVATE_KEY_FILE")]
    withdraw_authority_key_file: Option<PathBuf>,

    /// Where users complete deposits and withdrawals.
    #[arg(long, env = "SETTLEMENT_SITE_URL", default_value = DEFAULT_SETTLEMENT_SITE_URL)]
    settlement_site_url: String,

    /// Settlement oracle queried for deposit confirmations.
    #[arg(long, env = "ORACLE_URL", default_value = DEFAULT_ORACLE_URL)]
    oracle_url: String,

    /// Domain users authenticate against.
    #[arg(long, env = "AUTH_DOMAIN", default_value = DEFAULT_AUTH_DOMAIN)]
    auth_domain: String,

    /// Oracle request timeout in milliseconds (must be > 0 when set).
    #[arg(long)]
    oracle_timeout_ms: Option<u64>,

    /// Attempts for a withdrawal losing the balance race (must be > 0 when set).
    #[arg(long)]
    withdraw_retry_attempts: Option<usize>,

    /// HTTP rate limit per IP in requests per second (0 disables rate limiting).
    #[arg(long, env = "RATE_LIMIT_HTTP_PER_SEC")]
    http_rate_limit_per_second: Option<u64>,

    /// HTTP rate limit burst size (0 disables rate limiting).
    #[arg(long, env = "RATE_LIMIT_HTTP_BURST")]
    http_rate_limit_burst: Option<u32>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,

    /// Comma-separated allowed browser origins (`*` allows any).
    #[arg(long, env = "ALLOWED_HTTP_ORIGINS", default_value = "*")]
    allowed_origins: String,

    /// Accept requests without an Origin header.
    #[arg(long, env = "ALLOW_HTTP_NO_ORIGIN", value_parser = clap::value_parser!(bool))]
    allow_no_origin: Option<bool>,
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn read_secret_file(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read secret file {}", path.display()))?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        bail!("Secret file is empty: {}", path.display());
    }
    Ok(trimmed.to_string())
}

fn resolve_authority_key(args: &Args) -> Result<String> {
    if let Some(value) = args
        .withdraw_authority_key
        .as_ref()
        .filter(|value| !value.trim().is_empty())
    {
        return Ok(value.clone());
    }
    if let Some(path) = &args.withdraw_authority_key_file {
        return read_secret_file(path);
    }
    Err(anyhow!(
        "Missing WITHDRAW_AUTHORITY_PRIVATE_KEY or WITHDRAW_AUTHORITY_PRIVATE_KEY_FILE (flag or env var)"
    ))
}

fn parse_origins(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(|origin| origin.to_string())
        .collect()
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ApiConfig::default();
    if let Some(0) = args.oracle_timeout_ms {
        bail!("oracle_timeout_ms must be > 0 when set");
    }
    if let Some(0) = args.withdraw_retry_attempts {
        bail!("withdraw_retry_attempts must be > 0 when set");
    }

    let game = decode_game_key(&args.game)?;
    let authority = decode_authority_key(&resolve_authority_key(args)?)?;

    Ok(ServerConfig {
        db_path: args.db_path.clone(),
        oracle_url: parse_url("oracle url", &args.oracle_url)?,
        oracle_timeout: args
            .oracle_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_ORACLE_TIMEOUT),
        service: ServiceConfig {
            game,
            authority,
            auth_domain: args.auth_domain.trim().to_string(),
            settlement_site_url: parse_url("settlement site url", &args.settlement_site_url)?,
            withdraw_attempts: args
                .withdraw_retry_attempts
                .unwrap_or(DEFAULT_WITHDRAW_ATTEMPTS),
        },
        api: ApiConfig {
            allowed_origins: parse_origins(&args.allowed_origins),
            allow_no_origin: args.allow_no_origin.unwrap_or(defaults.allow_no_origin),
            rate_limit_per_second: map_optional_limit(
                args.http_rate_limit_per_second,
                defaults.rate_limit_per_second,
            ),
            rate_limit_burst: map_optional_limit(
                args.http_rate_limit_burst,
                defaults.rate_limit_burst,
            ),
            body_limit_bytes: map_optional_limit(
                args.http_body_limit_bytes,
                defaults.body_limit_bytes,
            ),
        },
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing()?;

    let config = build_config(&args)?;
    info!(
        game = %Identity::from_public_key(config.service.game.clone()),
        authority = %signing::identity(&config.service.authority)?,
        domain = %config.service.auth_domain,
        "fairroll configuration loaded"
    );

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("open database {}", config.db_path.display()))?;
    info!(path = %config.db_path.display(), "SQLite store ready");
    let oracle = HttpOracle::new(config.oracle_url.clone(), config.oracle_timeout)?;
    info!(url = %config.oracle_url, "settlement oracle configured");

    let service = Arc::new(Service::new(
        Arc::new(store),
        Arc::new(oracle),
        config.service,
    ));
    let api = Api::new(service, config.api);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("server failed")?;

    Ok(())
}
