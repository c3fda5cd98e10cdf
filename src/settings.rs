use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SESSION_SECRET: &str = "change-me";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub users: Users,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Verbose logging and debug-level request tracing
    pub debug: bool,
    /// Directory holding the login and dashboard pages
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    /// SeaORM/SQLx connection string. When unset the record store runs unconfigured
    /// and data endpoints answer 503.
    /// Examples:
    /// - SQLite: sqlite://privacydesk.db?mode=rwc
    /// - PostgreSQL: postgresql://user@localhost/privacydesk
    pub url: Option<String>,
    /// Access key, injected as the password of PostgreSQL URLs
    pub key: Option<String>,
    /// Connection attempts made by `RecordStore::initialize`
    pub connect_attempts: u32,
    /// Upper bound on rows returned by list, query and metrics endpoints
    pub page_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Key mixed into the digest under which session tokens are stored
    pub secret: String,
    /// Hard cap on session lifetime
    pub ttl_secs: i64,
    /// Force the Secure cookie attribute (defaults to off for plain-HTTP development)
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Users {
    /// Optional JSON file with staff accounts to provision at startup
    pub file: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            debug: false,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            connect_attempts: 3,
            page_size: 500,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SESSION_SECRET.to_string(),
            ttl_secs: 8 * 3600,
            secure_cookie: false,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default("server.debug", Server::default().debug)
            .into_diagnostic()?
            .set_default(
                "server.static_dir",
                Server::default().static_dir.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default(
                "database.connect_attempts",
                Database::default().connect_attempts,
            )
            .into_diagnostic()?
            .set_default("database.page_size", Database::default().page_size)
            .into_diagnostic()?
            .set_default("session.secret", Session::default().secret)
            .into_diagnostic()?
            .set_default("session.ttl_secs", Session::default().ttl_secs)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PRIVACYDESK__DATABASE__URL=sqlite://..., etc.
        builder =
            builder.add_source(config::Environment::with_prefix("PRIVACYDESK").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        if s.server.static_dir.is_relative() {
            s.server.static_dir = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.server.static_dir);
        }
        if s.database.connect_attempts == 0 {
            s.database.connect_attempts = 1;
        }

        Ok(s)
    }
}

impl Database {
    /// Connection URL with `key` applied as the password of PostgreSQL URLs.
    /// Returns `None` when no database is configured.
    pub fn connection_url(&self) -> Option<String> {
        let raw = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;

        let Some(key) = self.key.as_deref().filter(|k| !k.is_empty()) else {
            return Some(raw.to_string());
        };
        if !raw.starts_with("postgres") {
            return Some(raw.to_string());
        }

        match url::Url::parse(raw) {
            Ok(mut parsed) => {
                if parsed.set_password(Some(key)).is_err() {
                    tracing::warn!("database.key ignored: URL does not accept a password");
                }
                Some(parsed.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "database.url is not a valid URL, using it verbatim");
                Some(raw.to_string())
            }
        }
    }
}
