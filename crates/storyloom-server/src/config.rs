use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "your-refresh-secret-key",
    "secret",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub frontend_url: Option<String>,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("STORYLOOM_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let host: IpAddr = host
            .trim()
            .parse()
            .with_context(|| format!("STORYLOOM_HOST must be an IP address, got '{}'", host))?;
        let port: u16 = parse_or(&var, "STORYLOOM_PORT", 5000)?;
        let addr = SocketAddr::new(host, port);

        let db_path: PathBuf = var("STORYLOOM_DB_PATH")
            .unwrap_or_else(|| "storyloom.db".into())
            .into();

        let jwt_secret = secret(&var, "STORYLOOM_JWT_SECRET")?;
        let jwt_refresh_secret = secret(&var, "STORYLOOM_JWT_REFRESH_SECRET")?;
        if jwt_secret == jwt_refresh_secret {
            bail!("STORYLOOM_JWT_SECRET and STORYLOOM_JWT_REFRESH_SECRET must differ");
        }

        let access_minutes: i64 = parse_or(&var, "STORYLOOM_ACCESS_TOKEN_MINUTES", 15)?;
        let refresh_days: i64 = parse_or(&var, "STORYLOOM_REFRESH_TOKEN_DAYS", 7)?;
        if access_minutes <= 0 || refresh_days <= 0 {
            bail!("token lifetimes must be positive");
        }
        let access_token_ttl = lifetime(chrono::Duration::try_minutes(access_minutes))
            .context("STORYLOOM_ACCESS_TOKEN_MINUTES is too large")?;
        let refresh_token_ttl = lifetime(chrono::Duration::try_days(refresh_days))
            .context("STORYLOOM_REFRESH_TOKEN_DAYS is too large")?;

        let environment = match var("STORYLOOM_ENV").as_deref() {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => bail!("STORYLOOM_ENV must be development or production, got '{}'", other),
        };

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            jwt_refresh_secret,
            access_token_ttl,
            refresh_token_ttl,
            frontend_url: var("STORYLOOM_FRONTEND_URL"),
            environment,
        })
    }

    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn secret(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match var(key) {
        Some(value) if !PLACEHOLDER_SECRETS.contains(&value.as_str()) => Ok(value),
        _ => bail!("{} is unset or still a placeholder", key),
    }
}

/// A token lifetime is usable only if an expiry issued now still fits the calendar.
fn lifetime(ttl: Option<chrono::Duration>) -> Result<chrono::Duration> {
    match ttl {
        Some(ttl) if chrono::Utc::now().checked_add_signed(ttl).is_some() => Ok(ttl),
        _ => bail!("token lifetime out of range"),
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", key, raw)),
        None => Ok(default),
    }
}
