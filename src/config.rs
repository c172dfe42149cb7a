/// Agent configuration, read from the process environment (and `.env`).
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LABEL: &str = "SSI Prototype";
const DEFAULT_WALLET_ID: &str = "my-wallet";

/// Ed25519 private keys are 32 bytes; the seed is used as the key verbatim.
pub const SEED_LENGTH: usize = 32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("SEED must be exactly {SEED_LENGTH} bytes, got {0}")]
    InvalidSeed(usize),
    #[error("ENDORSER_DID and SEED must be set together")]
    IncompleteEndorser,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// DID (and its key seed) imported into an empty wallet at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct EndorserConfig {
    pub did: String,
    pub seed: [u8; SEED_LENGTH],
}

impl std::fmt::Debug for EndorserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndorserConfig")
            .field("did", &self.did)
            .field("seed", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub host: IpAddr,
    pub port: u16,
    pub label: String,
    pub wallet_id: String,
    /// Directory for the DID cache file; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Externally reachable base URL, without a trailing slash.
    pub public_url: String,
    pub endorser: Option<EndorserConfig>,
    pub log_format: LogFormat,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            label: DEFAULT_LABEL.to_string(),
            wallet_id: DEFAULT_WALLET_ID.to_string(),
            data_dir: None,
            public_url: format!("http://127.0.0.1:{DEFAULT_PORT}"),
            endorser: None,
            log_format: LogFormat::Text,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment, after applying any `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host_raw = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host_raw.parse::<IpAddr>().map_err(|_| ConfigError::InvalidValue {
            name: "HOST",
            value: host_raw.clone(),
        })?;

        let port = match var("PORT") {
            Some(p) => p.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value: p.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        let endorser = match (var("ENDORSER_DID"), var("SEED")) {
            (Some(did), Some(seed)) => Some(EndorserConfig {
                did,
                seed: seed_bytes(&seed)?,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteEndorser),
        };

        let public_url = var("PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}"));

        Ok(Self {
            host,
            port,
            label: var("AGENT_LABEL").unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            wallet_id: var("WALLET_ID").unwrap_or_else(|| DEFAULT_WALLET_ID.to_string()),
            data_dir: var("DATA_DIR").map(PathBuf::from),
            public_url,
            endorser,
            log_format,
        })
    }

    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Location of the persisted DID cache, if persistence is enabled.
    pub fn did_cache_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}-dids.json", self.wallet_id)))
    }
}

/// Interpret a seed string as raw key bytes.
pub fn seed_bytes(seed: &str) -> Result<[u8; SEED_LENGTH], ConfigError> {
    seed.as_bytes()
        .try_into()
        .map_err(|_| ConfigError::InvalidSeed(seed.len()))
}
