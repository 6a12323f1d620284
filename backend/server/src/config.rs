use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use tracing::{info, warn};

pub const SESSION_SECRET: &str = "SESSION_SECRET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store {other:?}, expected redis or memory")),
        }
    }
}

/// Retry discipline for feedback upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnPolicy {
    pub attempts: u32,
    pub timeout: Duration,
}

impl Default for TxnPolicy {
    fn default() -> Self {
        Self {
            attempts: 8,
            timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreBackend,
    pub redis_url: String,
    pub txn: TxnPolicy,
}

impl Config {
    pub fn load() -> Self {
        let attempts: u32 = try_load("FEEDBACK_TXN_ATTEMPTS", "8");

        Self {
            port: try_load("RUST_PORT", "1111"),
            store: try_load("STORE", "redis"),
            redis_url: try_load("REDIS_URL", "redis://redis:6379"),
            txn: TxnPolicy {
                attempts: attempts.max(1),
                timeout: Duration::from_millis(try_load("FEEDBACK_TXN_TIMEOUT_MS", "5000")),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            store: StoreBackend::Memory,
            redis_url: "redis://redis:6379".to_string(),
            txn: TxnPolicy::default(),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Reads a docker secret, falling back to an environment variable of the
/// same name outside of swarm.
pub fn read_secret(secret_name: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .or_else(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
            var(secret_name)
        })
        .expect("Secrets misconfigured!")
}
