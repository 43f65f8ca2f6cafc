use anyhow::Context;
use prochat::{
    AppState, auth, cache::Cache, channels::ChannelLayer, config::Config, db, mail::Mailer,
    notifications::reminders, presence::Presence, zoom::ZoomClient,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prochat=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let db_pool = db::connect(&config.database_url).await?;

    let cache = match &config.redis_url {
        Some(url) => Cache::redis(url).await.context("could not connect to redis")?,
        None => {
            tracing::warn!("REDIS_URL unset, using in-process cache");
            Cache::memory()
        }
    };

    let mailer = match &config.smtp {
        Some(smtp) => Mailer::smtp(smtp, &config.email_from)?,
        None => {
            tracing::warn!("SMTP_HOST unset, mail goes to the log only");
            Mailer::outbox()
        }
    };

    let clients = match &config.oauth_clients_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("could not read {}", path.display()))?;
            let json: serde_json::Value = serde_json::from_str(&raw)?;
            auth::Clients::from_json(&json, &config.oauth_redirect_base)
                .map_err(|e| anyhow::anyhow!("invalid OAuth clients file: {e}"))?
        }
        None => auth::Clients::default(),
    };

    let http = reqwest::Client::new();
    let zoom = ZoomClient::new(http.clone(), cache.clone(), config.zoom.clone());
    if !zoom.is_configured() {
        tracing::warn!("Zoom credentials unset, meeting creation will fail");
    }

    let channels = ChannelLayer::default();
    let app_state = AppState {
        db_pool: db_pool.clone(),
        clients,
        jwt: auth::JwtKeys::new(
            config.jwt_secret.as_bytes(),
            time::Duration::minutes(config.access_token_minutes),
            time::Duration::days(config.refresh_token_days),
        ),
        channels: channels.clone(),
        presence: Presence::new(cache, config.settings.presence_ttl_seconds),
        mailer,
        zoom,
        http,
        settings: config.settings,
    };

    reminders::spawn(db_pool, channels);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("could not bind port {}", config.port))?;
    tracing::info!(port = config.port, "listening");
    axum::serve(listener, prochat::app(app_state)).await?;
    Ok(())
}
