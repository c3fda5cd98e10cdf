use clap::Parser;
use miette::{IntoDiagnostic, Result};
use privacydesk::settings::{self, DEFAULT_SESSION_SECRET};
use privacydesk::storage::{self, RecordStore, Role};
use privacydesk::{user_sync, web};
use rand::distributions::{Alphanumeric, DistString};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Parser, Debug)]
#[command(
    name = "privacydesk",
    version,
    about = "Personal-data compliance backend"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "PRIVACYDESK_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // load settings before logging so `server.debug` can pick the default level
    let settings = settings::Settings::load(&cli.config)?;

    let default_level = if settings.server.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(env_filter).init();

    tracing::info!(
        host = %settings.server.host,
        port = settings.server.port,
        database_configured = settings.database.url.is_some(),
        "Loaded configuration"
    );
    if settings.session.secret == DEFAULT_SESSION_SECRET {
        tracing::warn!("session.secret is the built-in default; set PRIVACYDESK__SESSION__SECRET");
    }

    // connect to the record store; failure leaves the API in degraded mode
    let store = RecordStore::from_settings(&settings.database);
    match store.initialize().await {
        Ok(()) if store.is_connected() => {
            provision_users(&store, settings.users.file.as_deref()).await?;
            match storage::cleanup_expired_sessions(&store).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired session(s)", n),
                Err(e) => tracing::warn!(error = %e, "expired session cleanup failed"),
            }
        }
        Ok(()) => tracing::warn!("Record store unconfigured; data endpoints will answer 503"),
        Err(e) => {
            tracing::warn!(error = %e, "Record store unreachable; data endpoints will answer 503")
        }
    }

    web::serve(settings, store).await?;
    Ok(())
}

async fn provision_users(store: &RecordStore, users_file: Option<&str>) -> Result<()> {
    if let Some(path) = users_file {
        user_sync::sync_users_from_file(store, path).await?;
        return Ok(());
    }

    let counts = storage::collection_counts(store).await.into_diagnostic()?;
    if counts.users == 0 {
        let password = Alphanumeric.sample_string(&mut rand::thread_rng(), 20);
        storage::create_user(store, DEFAULT_ADMIN_EMAIL, &password, "Administrador", Role::Admin)
            .await
            .into_diagnostic()?;
        tracing::warn!(
            "Created initial admin account (email: {}, password: {}); change it or provision users.file",
            DEFAULT_ADMIN_EMAIL,
            password
        );
    }
    Ok(())
}
