use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use tandem_core::CoreConfig;

/// Secrets that ship in examples and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "changeme", "secret"];

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Base URL of the profile service. Without one, peers show as placeholders.
    pub profile_url: Option<String>,
    pub core: CoreConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("TANDEM_JWT_SECRET").context("TANDEM_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) || jwt_secret.len() < MIN_SECRET_LEN {
            bail!("TANDEM_JWT_SECRET is a placeholder or shorter than {} bytes", MIN_SECRET_LEN);
        }

        let port = match get("TANDEM_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid TANDEM_PORT '{}'", raw))?,
            None => 3000,
        };

        let mut core = CoreConfig::default();
        if let Some(raw) = get("TANDEM_REQUIRE_CONNECTION") {
            core.require_connection_for_messaging = parse_flag(&raw)
                .with_context(|| format!("invalid TANDEM_REQUIRE_CONNECTION '{}'", raw))?;
        }
        if let Some(raw) = get("TANDEM_MAX_MESSAGE_LEN") {
            core.max_message_len = raw
                .parse()
                .with_context(|| format!("invalid TANDEM_MAX_MESSAGE_LEN '{}'", raw))?;
        }

        Ok(Self {
            host: get("TANDEM_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: PathBuf::from(get("TANDEM_DB_PATH").unwrap_or_else(|| "tandem.db".into())),
            jwt_secret,
            profile_url: get("TANDEM_PROFILE_URL").filter(|url| !url.trim().is_empty()),
            core,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
