//! HTTP backend for the fairroll dice game.
//!
//! Wires the execution layer to a SQLite store and an HTTP settlement oracle, and
//! exposes everything through a single JSON `POST /` endpoint keyed on `action`.

mod api;
pub use api::{Api, ApiConfig};

mod config;
pub use config::{
    decode_authority_key, decode_game_key, parse_url, ServerConfig, DEFAULT_AUTH_DOMAIN,
    DEFAULT_ORACLE_TIMEOUT, DEFAULT_ORACLE_URL, DEFAULT_SETTLEMENT_SITE_URL,
};

mod oracle;
pub use oracle::HttpOracle;

mod service;
pub use service::{Service, ServiceConfig};

mod sqlite;
pub use sqlite::SqliteStore;
