use std::path::PathBuf;

use anyhow::Context;

/// Process configuration, read from the environment (a `.env` file is honoured).
pub struct Config {
    /// SQLite connection URL, e.g. `sqlite://prochat.db?mode=rwc`.
    pub database_url: String,
    /// The port to listen for HTTP requests on.
    pub port: u16,
    /// HMAC secret used to sign access and refresh tokens.
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    /// Redis connection URL. The in-process cache is used when unset.
    pub redis_url: Option<String>,
    /// SMTP relay. Mail is only logged when unset.
    pub smtp: Option<SmtpConfig>,
    pub email_from: String,
    pub zoom: ZoomConfig,
    /// JSON file holding the `google` / `github` OAuth client credentials.
    pub oauth_clients_file: Option<PathBuf>,
    pub oauth_redirect_base: String,
    pub settings: Settings,
}

pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Default)]
pub struct ZoomConfig {
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub oauth_url: String,
    pub api_url: String,
}

/// Tunables handlers read at request time.
#[derive(Clone, Debug)]
pub struct Settings {
    pub otp_ttl_minutes: i64,
    pub presence_ttl_seconds: u64,
    pub google_userinfo_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            otp_ttl_minutes: 10,
            presence_ttl_seconds: 120,
            google_userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_owned(),
        }
    }
}

fn var(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(v) => v.parse().with_context(|| format!("{key} is not valid")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL").context("DATABASE_URL must be provided")?;
        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be provided")?;

        let smtp = match (var("SMTP_HOST"), var("SMTP_USERNAME"), var("SMTP_PASSWORD")) {
            (Some(host), Some(username), Some(password)) => Some(SmtpConfig { host, username, password }),
            (None, _, _) => None,
            _ => anyhow::bail!("SMTP_HOST needs SMTP_USERNAME and SMTP_PASSWORD"),
        };

        let defaults = Settings::default();
        let settings = Settings {
            otp_ttl_minutes: parse_or("OTP_TTL_MINUTES", defaults.otp_ttl_minutes)?,
            presence_ttl_seconds: parse_or("PRESENCE_TTL_SECONDS", defaults.presence_ttl_seconds)?,
            google_userinfo_url: var("GOOGLE_USERINFO_URL").unwrap_or(defaults.google_userinfo_url),
        };

        Ok(Config {
            database_url,
            port: parse_or("PORT", 8080)?,
            jwt_secret,
            access_token_minutes: parse_or("ACCESS_TOKEN_MINUTES", 60)?,
            refresh_token_days: parse_or("REFRESH_TOKEN_DAYS", 1)?,
            redis_url: var("REDIS_URL"),
            smtp,
            email_from: var("EMAIL_FROM").unwrap_or_else(|| "support@prochat.local".to_owned()),
            zoom: ZoomConfig {
                account_id: var("ZOOM_ACCOUNT_ID"),
                client_id: var("ZOOM_CLIENT_ID"),
                client_secret: var("ZOOM_CLIENT_SECRET"),
                oauth_url: var("ZOOM_OAUTH_URL").unwrap_or_else(|| "https://zoom.us".to_owned()),
                api_url: var("ZOOM_API_URL").unwrap_or_else(|| "https://api.zoom.us".to_owned()),
            },
            oauth_clients_file: var("OAUTH_CLIENTS_FILE").map(PathBuf::from),
            oauth_redirect_base: var("OAUTH_REDIRECT_BASE")
                .unwrap_or_else(|| "http://localhost:8080".to_owned()),
            settings,
        })
    }
}
