use anyhow::{Context, Result};
use chrono::Duration;
use std::env;

use crate::auth::jwt::AccessTokenSettings;
use crate::auth::keys::KeySources;
use crate::auth::rotation::RefreshLifetimes;

/// Variable lookup; `std::env::var` in the binary, a map in tests.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Détecte automatiquement l'environnement
    fn detect_from(lookup: Lookup<'_>) -> Self {
        // Méthode 1: Vérifier si on est dans AWS Lambda
        if lookup("AWS_LAMBDA_FUNCTION_NAME").is_some() {
            return Self::Production;
        }

        // Méthode 2: Vérifier la variable APP_ENV
        match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// How the refresh secret is carried in cookies. Handed to the router as a value.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieSettings {
    pub domain: Option<String>,
    pub secure: bool,
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            domain: None,
            secure: true,
            path: "/auth".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub database_url: String,
    pub key_sources: KeySources,
    pub access_token: AccessTokenSettings,
    pub refresh: RefreshLifetimes,
    /// How long expired refresh rows are kept before the sweep deletes them.
    pub retention: Duration,
    pub sweep_interval: std::time::Duration,
    pub cookies: CookieSettings,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Charge la configuration depuis les variables d'environnement
    /// avec détection automatique de l'environnement
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let environment = Environment::detect_from(lookup);

        tracing::info!(
            "🌍 Environment detected: {}",
            environment.as_str().to_uppercase()
        );

        let database_url = Self::get_database_url(lookup, &environment)?;
        let key_sources = Self::get_key_sources(lookup)?;

        let access_token = AccessTokenSettings {
            lifetime: minutes(lookup, "ACCESS_TOKEN_MINUTES", 15)?,
            issuer: non_blank(lookup, "TOKEN_ISSUER").unwrap_or_else(|| "session-guard".to_string()),
            audience: non_blank(lookup, "TOKEN_AUDIENCE"),
        };
        let refresh = RefreshLifetimes {
            token: minutes(lookup, "REFRESH_TOKEN_MINUTES", 7 * 24 * 60)?,
            family: minutes(lookup, "REFRESH_FAMILY_MINUTES", 30 * 24 * 60)?,
        };
        let retention = Duration::days(bounded(
            lookup,
            "REFRESH_RETENTION_DAYS",
            30,
            MAX_LIFETIME_DAYS,
        )?);
        let sweep_interval = std::time::Duration::from_secs(
            bounded(
                lookup,
                "SWEEP_INTERVAL_SECONDS",
                3600,
                MAX_LIFETIME_DAYS * 24 * 60 * 60,
            )?
            .unsigned_abs(),
        );

        let cookies = CookieSettings {
            domain: non_blank(lookup, "COOKIE_DOMAIN"),
            secure: flag(lookup, "COOKIE_SECURE", environment.is_production())?,
            ..CookieSettings::default()
        };

        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("SERVER_PORT must be a port number, got {raw:?}"))?,
            None => 3000,
        };

        tracing::info!("✅ Configuration loaded successfully");
        tracing::debug!("   Database: {}", Self::mask_credentials(&database_url));
        tracing::debug!(
            "   Tokens: access {}m, refresh {}m, family {}m",
            access_token.lifetime.num_minutes(),
            refresh.token.num_minutes(),
            refresh.family.num_minutes()
        );
        tracing::debug!("   Server: {}:{}", server_host, server_port);

        Ok(Self {
            environment,
            database_url,
            key_sources,
            access_token,
            refresh,
            retention,
            sweep_interval,
            cookies,
            server_host,
            server_port,
        })
    }

    /// Récupère DATABASE_URL avec logique intelligente
    fn get_database_url(lookup: Lookup<'_>, environment: &Environment) -> Result<String> {
        if let Some(url) = non_blank(lookup, "DATABASE_URL") {
            return Ok(url);
        }

        // Si en prod et DATABASE_URL manque, erreur critique
        if environment.is_production() {
            anyhow::bail!(
                "DATABASE_URL must be set in production! \
                 Configure it in Lambda environment variables."
            );
        }

        // En dev, construire l'URL depuis les composants
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        Ok(format!(
            "postgres://{}:{}@{}:{}/{}",
            var("POSTGRES_USER", "postgres"),
            var("POSTGRES_PASSWORD", "postgres"),
            var("DB_HOST", "localhost"),
            var("DB_PORT", "5432"),
            var("POSTGRES_DB", "session_guard"),
        ))
    }

    /// The inline secret and the key file are both kept; the key provider picks.
    fn get_key_sources(lookup: Lookup<'_>) -> Result<KeySources> {
        let configured_secret = match non_blank(lookup, "AUTH_SIGNING_KEY_FILE") {
            Some(path) => Some(
                std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read AUTH_SIGNING_KEY_FILE at {path}"))?,
            ),
            None => None,
        };

        Ok(KeySources {
            environment_secret: lookup("AUTH_SIGNING_KEY"),
            configured_secret,
        })
    }

    /// Masque les credentials dans les logs
    fn mask_credentials(url: &str) -> String {
        if let Some(at_pos) = url.find('@')
            && let Some(scheme_end) = url.find("://")
        {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos..];
            return format!("{}***:***{}", scheme, after_at);
        }
        url.to_string()
    }
}

fn non_blank(lookup: Lookup<'_>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Longest lifetime or retention accepted, about a century.
const MAX_LIFETIME_DAYS: i64 = 36_500;

/// A positive integer no larger than `max`, or `default` when unset.
fn bounded(lookup: Lookup<'_>, name: &str, default: i64, max: i64) -> Result<i64> {
    let Some(raw) = non_blank(lookup, name) else {
        return Ok(default);
    };
    let value: i64 = raw
        .parse()
        .with_context(|| format!("{name} must be an integer, got {raw:?}"))?;
    if value <= 0 {
        anyhow::bail!("{name} must be positive, got {value}");
    }
    if value > max {
        anyhow::bail!("{name} must be at most {max}, got {value}");
    }
    Ok(value)
}

fn minutes(lookup: Lookup<'_>, name: &str, default: i64) -> Result<Duration> {
    let value = bounded(lookup, name, default, MAX_LIFETIME_DAYS * 24 * 60)?;
    Duration::try_minutes(value).with_context(|| format!("{name} is out of range: {value}"))
}

fn flag(lookup: Lookup<'_>, name: &str, default: bool) -> Result<bool> {
    match non_blank(lookup, name).as_deref() {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => anyhow::bail!("{name} must be true or false, got {other:?}"),
    }
}
