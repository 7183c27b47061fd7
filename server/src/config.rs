use std::{net::SocketAddr, time::Duration};

/// Runtime settings, all read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub token_secret: String,
    pub regulator_base_url: String,
    pub regulator_api_key: String,
    pub regulator_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env_or("DISPATCH_BIND_ADDR", "0.0.0.0:8080").parse()?;

        let token_secret = match std::env::var("DISPATCH_TOKEN_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("DISPATCH_TOKEN_SECRET is not set, using the development secret");
                "development-secret-do-not-deploy".to_string()
            }
        };

        let regulator_timeout =
            Duration::from_secs(env_or("REGULATOR_TIMEOUT_SECS", "10").parse()?);

        Ok(Self {
            bind_addr,
            token_secret,
            regulator_base_url: env_or("REGULATOR_API_BASE_URL", "http://127.0.0.1:9090"),
            regulator_api_key: env_or("REGULATOR_API_KEY", ""),
            regulator_timeout,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
