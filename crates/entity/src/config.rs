//! Connection configuration
//!
//! Connections are described per named environment, either in YAML or as a
//! single `DATABASE_URL`. Values are only read here; opening the connection
//! is the driver's job.

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::backends::BackendKind;
use crate::error::{OrmError, OrmResult};

/// Environment variable holding a single connection URL
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Environment variable naming the active environment
pub const DATABASE_ENV_VAR: &str = "DATABASE_ENV";

const DEFAULT_ENVIRONMENT: &str = "default";

/// Settings for one backend connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver identifier looked up in the driver registry
    pub driver: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Database name, or file path / `:memory:` for SQLite
    pub database: String,
    /// PostgreSQL search path applied after connecting
    #[serde(default)]
    pub schema: Option<String>,
    /// Client encoding applied after connecting
    #[serde(default)]
    pub encoding: Option<String>,
    /// Extra query-string options passed through to the backend
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            database: database.into(),
            schema: None,
            encoding: None,
            options: BTreeMap::new(),
        }
    }

    /// SQLite connection to a file path or `:memory:`
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self::new(BackendKind::SQLite.to_string(), database)
    }

    /// PostgreSQL connection to `database` on `host`
    pub fn postgres(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::new(BackendKind::PostgreSQL.to_string(), database)
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Backend kind named by `driver`
    pub fn kind(&self) -> OrmResult<BackendKind> {
        self.driver.parse()
    }

    /// Parse a connection URL such as `postgres://user:pw@host:5432/app` or
    /// `sqlite::memory:`.
    ///
    /// The `search_path`/`schema` and `encoding`/`client_encoding` query
    /// parameters are lifted into their fields; everything else lands in
    /// `options`.
    pub fn from_url(url: &str) -> OrmResult<Self> {
        let parsed = url::Url::parse(url)?;
        let kind: BackendKind = parsed.scheme().parse()?;

        let mut config = match kind {
            BackendKind::SQLite => {
                let rest = &url[parsed.scheme().len() + 1..];
                let rest = rest.strip_prefix("//").unwrap_or(rest);
                let database = rest.split('?').next().unwrap_or("").to_string();
                if database.is_empty() {
                    return Err(OrmError::Configuration("Missing database path in SQLite URL".to_string()));
                }
                Self::sqlite(database)
            }
            BackendKind::PostgreSQL => {
                let host = parsed
                    .host_str()
                    .ok_or_else(|| OrmError::Configuration("Missing host in database URL".to_string()))?;

                let database = parsed.path().trim_start_matches('/').to_string();
                if database.is_empty() {
                    return Err(OrmError::Configuration("Missing database name in URL".to_string()));
                }

                let mut config = Self::postgres(host, database);
                config.port = parsed.port();
                if !parsed.username().is_empty() {
                    config.username = Some(parsed.username().to_string());
                }
                config.password = parsed.password().map(|p| p.to_string());
                config
            }
        };

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "search_path" | "schema" => config.schema = Some(value.into_owned()),
                "encoding" | "client_encoding" => config.encoding = Some(value.into_owned()),
                _ => {
                    config.options.insert(key.into_owned(), value.into_owned());
                }
            }
        }

        Ok(config)
    }

    /// Render the URL handed to the backend driver.
    ///
    /// Schema and encoding are not part of the URL; drivers apply them
    /// once the connection is open.
    pub fn to_url(&self) -> OrmResult<String> {
        match self.kind()? {
            BackendKind::SQLite => {
                let mut url = if self.database == ":memory:" {
                    "sqlite::memory:".to_string()
                } else {
                    format!("sqlite://{}", self.database)
                };
                if !self.options.is_empty() {
                    url.push('?');
                    url.push_str(&encode_options(&self.options));
                }
                Ok(url)
            }
            BackendKind::PostgreSQL => {
                let host = self.host.as_deref().unwrap_or("localhost");
                let mut url = url::Url::parse(&format!("postgres://{}", host))?;

                let invalid = |what: &str| OrmError::Configuration(format!("Invalid {} in connection config", what));
                if let Some(username) = &self.username {
                    url.set_username(username).map_err(|_| invalid("username"))?;
                }
                if let Some(password) = &self.password {
                    url.set_password(Some(password)).map_err(|_| invalid("password"))?;
                }
                url.set_port(self.port).map_err(|_| invalid("port"))?;
                url.set_path(&format!("/{}", self.database));
                if !self.options.is_empty() {
                    url.query_pairs_mut().extend_pairs(self.options.iter());
                }
                Ok(url.to_string())
            }
        }
    }
}

fn encode_options(options: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(options.iter())
        .finish()
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

/// Named connections plus the environment selected by default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_environment")]
    pub default: String,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default: default_environment(),
            connections: BTreeMap::new(),
        }
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named connection
    pub fn with_connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    /// Select the default environment
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = name.into();
        self
    }

    /// Parse the YAML form:
    ///
    /// ```yaml
    /// default: development
    /// connections:
    ///   development:
    ///     driver: sqlite
    ///     database: ":memory:"
    /// ```
    pub fn from_yaml_str(yaml: &str) -> OrmResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load the YAML form from a file
    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OrmError::Configuration(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&contents)
    }

    /// Build a single-connection config from `DATABASE_URL`, registered
    /// under `DATABASE_ENV` (or `default`).
    pub fn from_env() -> OrmResult<Self> {
        let url = std::env::var(DATABASE_URL_VAR)
            .map_err(|_| OrmError::MissingConnection(format!("{} is not set", DATABASE_URL_VAR)))?;
        let environment = std::env::var(DATABASE_ENV_VAR).unwrap_or_else(|_| default_environment());

        let connection = ConnectionConfig::from_url(&url)?;
        Ok(Self::new()
            .with_default(environment.clone())
            .with_connection(environment, connection))
    }

    /// Connection for a named environment
    pub fn connection(&self, name: &str) -> OrmResult<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| OrmError::MissingConnection(format!("No connection configured for environment '{}'", name)))
    }

    /// Connection for the default environment
    pub fn default_connection(&self) -> OrmResult<&ConnectionConfig> {
        self.connection(&self.default)
    }
}
