use crate::IsolationLevel;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const FACTORY_NAME_VAR: &str = "UOW_SESSION_FACTORY_NAME";
pub const MAX_CONNECTIONS_VAR: &str = "UOW_MAX_CONNECTIONS";
pub const ISOLATION_LEVEL_VAR: &str = "UOW_ISOLATION_LEVEL";

const DEFAULT_FACTORY_NAME: &str = "default";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Unknown isolation level: {0:?}")]
    UnknownIsolationLevel(String),
}

/// Connection settings for a [`PgSessionFactory`](crate::PgSessionFactory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    /// Reported to failure handlers as the session factory identity.
    pub name: String,
    pub max_connections: u32,
    /// Default isolation level for units of work built from this config.
    pub isolation_level: IsolationLevel,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: DEFAULT_FACTORY_NAME.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            isolation_level: IsolationLevel::default(),
        }
    }

    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let url = lookup(DATABASE_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;
        let mut config = Self::new(url);

        if let Some(name) = lookup(FACTORY_NAME_VAR) {
            config.name = name;
        }

        if let Some(raw) = lookup(MAX_CONNECTIONS_VAR) {
            config.max_connections = match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: MAX_CONNECTIONS_VAR,
                        value: raw,
                    })
                }
            };
        }

        if let Some(raw) = lookup(ISOLATION_LEVEL_VAR) {
            config.isolation_level = raw.parse()?;
        }

        Ok(config)
    }
}
