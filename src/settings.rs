//! Process settings from environment variables (a `.env` file is loaded first when present).

use crate::error::ConfigError;
use crate::i18n::Locale;
use crate::pagination::DEFAULT_ITEMS_PER_PAGE;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
    Test,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            "test" | "testing" => Ok(Environment::Test),
            other => Err(ConfigError::Load(format!("APP_ENV: unknown environment '{}'", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(ConfigError::Load(format!("STORE: unknown store '{}'", other))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub store: StoreKind,
    pub resources_path: PathBuf,
    pub route_prefix: String,
    pub default_locale: Locale,
    pub sql_echo: bool,
    pub default_items_per_page: u64,
    pub body_limit_bytes: usize,
    pub max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            environment: Environment::Dev,
            host: "0.0.0.0".into(),
            port: 5050,
            database_url: None,
            store: StoreKind::Memory,
            resources_path: PathBuf::from("resources"),
            route_prefix: "api".into(),
            default_locale: Locale::En,
            sql_echo: false,
            default_items_per_page: DEFAULT_ITEMS_PER_PAGE,
            body_limit_bytes: 1024 * 1024,
            max_connections: 5,
        }
    }
}

impl Settings {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Settings::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |k: &str| vars.get(k).map(|v| v.trim()).filter(|v| !v.is_empty());
        let defaults = Settings::default();
        let environment = get("APP_ENV").map(str::parse::<Environment>).transpose()?.unwrap_or(Environment::Dev);
        let store = get("STORE").map(str::parse::<StoreKind>).transpose()?.unwrap_or(StoreKind::Postgres);
        let database_url = get("DATABASE_URL").map(str::to_string).or_else(|| match environment {
            Environment::Dev => Some("postgres://localhost/rest_scaffold".into()),
            Environment::Test => Some("postgres://localhost/rest_scaffold_test".into()),
            Environment::Prod => None,
        });
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Load("DATABASE_URL is required in prod".into()));
        }
        let default_locale = match get("DEFAULT_LOCALE") {
            Some(tag) => Locale::parse(tag)
                .ok_or_else(|| ConfigError::Load(format!("DEFAULT_LOCALE: unsupported locale '{}'", tag)))?,
            None => defaults.default_locale,
        };
        let default_items_per_page = number(get("DEFAULT_ITEMS_PER_PAGE"), "DEFAULT_ITEMS_PER_PAGE")?
            .unwrap_or(defaults.default_items_per_page);
        if default_items_per_page == 0 {
            return Err(ConfigError::Load("DEFAULT_ITEMS_PER_PAGE must be at least 1".into()));
        }
        Ok(Settings {
            environment,
            host: get("HOST").map(str::to_string).unwrap_or(defaults.host),
            port: number(get("PORT"), "PORT")?.unwrap_or(defaults.port),
            database_url,
            store,
            resources_path: get("RESOURCES_PATH").map(PathBuf::from).unwrap_or(defaults.resources_path),
            route_prefix: get("ROUTE_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or(defaults.route_prefix),
            default_locale,
            sql_echo: match get("SQL_ECHO") {
                Some(v) => flag(v, "SQL_ECHO")?,
                None => environment == Environment::Dev,
            },
            default_items_per_page,
            body_limit_bytes: number(get("BODY_LIMIT_BYTES"), "BODY_LIMIT_BYTES")?
                .unwrap_or(defaults.body_limit_bytes),
            max_connections: number(get("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `/api` for prefix `api`; empty when no prefix is configured.
    pub fn route_base(&self) -> String {
        if self.route_prefix.is_empty() {
            String::new()
        } else {
            format!("/{}", self.route_prefix)
        }
    }
}

fn number<T: FromStr>(raw: Option<&str>, name: &str) -> Result<Option<T>, ConfigError> {
    raw.map(|v| {
        v.parse::<T>()
            .map_err(|_| ConfigError::Load(format!("{}: not a number: '{}'", name, v)))
    })
    .transpose()
}

fn flag(raw: &str, name: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Load(format!("{}: not a boolean: '{}'", name, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_for_dev() {
        let s = Settings::from_vars(&vars(&[])).unwrap();
        assert_eq!(s.environment, Environment::Dev);
        assert_eq!(s.port, 5050);
        assert_eq!(s.store, StoreKind::Postgres);
        assert!(s.sql_echo);
        assert_eq!(s.route_base(), "/api");
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/rest_scaffold"));
    }

    #[test]
    fn prod_requires_database_url_for_postgres() {
        assert!(Settings::from_vars(&vars(&[("APP_ENV", "prod")])).is_err());
        let s = Settings::from_vars(&vars(&[("APP_ENV", "prod"), ("STORE", "memory")])).unwrap();
        assert!(!s.sql_echo);
        assert!(s.database_url.is_none());
    }

    #[test]
    fn overrides_and_bad_values() {
        let s = Settings::from_vars(&vars(&[
            ("PORT", "8080"),
            ("ROUTE_PREFIX", "/v1/"),
            ("DEFAULT_LOCALE", "nl-BE"),
            ("SQL_ECHO", "off"),
            ("DEFAULT_ITEMS_PER_PAGE", "25"),
        ]))
        .unwrap();
        assert_eq!(s.bind_addr(), "0.0.0.0:8080");
        assert_eq!(s.route_base(), "/v1");
        assert_eq!(s.default_locale, Locale::Nl);
        assert!(!s.sql_echo);
        assert_eq!(s.default_items_per_page, 25);

        assert!(Settings::from_vars(&vars(&[("PORT", "x")])).is_err());
        assert!(Settings::from_vars(&vars(&[("DEFAULT_ITEMS_PER_PAGE", "0")])).is_err());
        assert!(Settings::from_vars(&vars(&[("STORE", "redis")])).is_err());
    }
}
