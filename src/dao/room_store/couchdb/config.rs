use std::time::Duration;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "artist_buzz";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Basic-auth credentials sent with every CouchDB request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchCredentials {
    pub username: String,
    pub password: String,
}

/// Where the room documents live and how to reach them.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL without the database segment or a trailing slash.
    pub base_url: String,
    /// Database holding rooms, rounds and track lists.
    pub database: String,
    pub credentials: Option<CouchCredentials>,
    /// Upper bound for opening a TCP connection to the server.
    pub connect_timeout: Duration,
}

impl CouchConfig {
    /// Validate the database name and normalise the base URL.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> CouchResult<Self> {
        let database = database.into();
        if !is_valid_database_name(&database) {
            return Err(CouchDaoError::InvalidDatabaseName { database });
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database,
            credentials: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(CouchCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Read `COUCH_BASE_URL`, `COUCH_DB`, `COUCH_USERNAME`, `COUCH_PASSWORD`
    /// and `COUCH_CONNECT_TIMEOUT_MS`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = lookup("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let mut config = Self::new(base_url, database)?;

        if let (Some(username), Some(password)) = (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD"))
        {
            config = config.with_credentials(username, password);
        }
        if let Some(raw) = lookup("COUCH_CONNECT_TIMEOUT_MS") {
            let millis = raw
                .parse::<u64>()
                .map_err(|_| CouchDaoError::InvalidEnvVar {
                    var: "COUCH_CONNECT_TIMEOUT_MS",
                    value: raw,
                })?;
            config.connect_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// URL of the configured database.
    pub fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }
}

/// CouchDB database names start with a lowercase letter and only use `a-z0-9_$()+-/`.
fn is_valid_database_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c)
        })
}
