use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// How the client proves itself to the backend. Two deployments exist: one
/// announces itself with a signed `auth` frame right after connect, the other
/// carries an API key header on the websocket upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Signed,
    ApiKey,
}

/// Whether the reconnect supervisor retries forever or gives up once a
/// connect attempt fails after a full wait at maximum backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    Unbounded,
    AbandonAtMax,
}

/// Typed configuration for the client.
#[derive(Clone, Debug)]
pub struct Config {
    // Backend endpoint
    pub server_addr: String,
    pub server_port: u16,

    // Credentials
    pub secret: String,
    pub api_key: Option<String>,
    pub auth_mode: AuthMode,

    // Link behavior
    pub connect_timeout: Duration,
    pub reconnect_min_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub heartbeat_timeout: Duration,
    pub liveness_check_interval: Duration,
    pub expiry_tolerance_secs: i64,
    pub retry_policy: RetryPolicy,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let server_addr = env_str("SERVER_ADDR").unwrap_or_default();
        if server_addr.trim().is_empty() {
            return Err(Error::Config(
                "SERVER_ADDR environment variable is required".to_string(),
            ));
        }
        let server_port = env_str("SERVER_PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .ok_or_else(|| {
                Error::Config("SERVER_PORT environment variable is required".to_string())
            })?;
        let secret = env_str("SECRET").and_then(non_empty).ok_or_else(|| {
            Error::Config("SECRET environment variable is required".to_string())
        })?;

        // Auth strategy
        let api_key = env_str("API_KEY").and_then(non_empty);
        let auth_mode = parse_auth_mode(env_str("AUTH_MODE").as_deref())?;
        if auth_mode == AuthMode::ApiKey && api_key.is_none() {
            return Err(Error::Config(
                "API_KEY environment variable is required when AUTH_MODE=api-key".to_string(),
            ));
        }

        // Link timing
        let connect_timeout = Duration::from_secs(env_u64("CONNECT_TIMEOUT_SECS").unwrap_or(10));
        let reconnect_min_delay =
            Duration::from_secs(env_u64("RECONNECT_MIN_DELAY_SECS").unwrap_or(5));
        let reconnect_max_delay =
            Duration::from_secs(env_u64("RECONNECT_MAX_DELAY_SECS").unwrap_or(30));
        let heartbeat_timeout =
            Duration::from_secs(env_u64("HEARTBEAT_TIMEOUT_SECS").unwrap_or(90));
        let liveness_check_interval =
            Duration::from_secs(env_u64("LIVENESS_CHECK_INTERVAL_SECS").unwrap_or(30));
        let expiry_tolerance_secs = env_u64("EXPIRY_TOLERANCE_SECS").unwrap_or(30) as i64;

        let retry_policy = if env_bool("RETRY_UNBOUNDED").unwrap_or(false) {
            RetryPolicy::Unbounded
        } else {
            RetryPolicy::AbandonAtMax
        };

        Ok(Self {
            server_addr,
            server_port,
            secret,
            api_key,
            auth_mode,
            connect_timeout,
            reconnect_min_delay,
            reconnect_max_delay,
            heartbeat_timeout,
            liveness_check_interval,
            expiry_tolerance_secs,
            retry_policy,
        })
    }

    /// Websocket endpoint the backend exposes for client links.
    pub fn ws_uri(&self) -> String {
        format!("ws://{}:{}/ws", self.server_addr, self.server_port)
    }
}

fn parse_auth_mode(v: Option<&str>) -> Result<AuthMode> {
    match v.map(|s| s.trim().to_lowercase()) {
        None => Ok(AuthMode::Signed),
        Some(s) if s.is_empty() || s == "signed" => Ok(AuthMode::Signed),
        Some(s) if s == "api-key" || s == "api_key" => Ok(AuthMode::ApiKey),
        Some(other) => Err(Error::Config(format!(
            "invalid AUTH_MODE '{other}': expected 'signed' or 'api-key'"
        ))),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
