//! Per-slot PostgreSQL databases.
//!
//! Slot databases are cloned from the base database used as a template.
//! [`PsqlAdmin`] drives the `psql` client against the server's maintenance
//! database; failures surface unchanged as [`Error::Command`].
//!
//! The connection URL is split into libpq `PG*` environment variables, so
//! credentials never appear on the command line.

use crate::config::is_sql_identifier;
use crate::error::{Error, Result};
use crate::process::{redact_url_credentials, run_checked_with_env};
use async_trait::async_trait;

const MAINTENANCE_DATABASE: &str = "postgres";

/// URL query parameters forwarded to libpq, with their environment variable.
/// Anything else (`schema=public`, `connection_limit=5`, ...) belongs to the
/// application's driver and is dropped.
const LIBPQ_QUERY_PARAMS: &[(&str, &str)] = &[
    ("sslmode", "PGSSLMODE"),
    ("sslrootcert", "PGSSLROOTCERT"),
    ("sslcert", "PGSSLCERT"),
    ("sslkey", "PGSSLKEY"),
    ("connect_timeout", "PGCONNECT_TIMEOUT"),
    ("application_name", "PGAPPNAME"),
    ("options", "PGOPTIONS"),
];

#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Create `target` as a copy of `template`.
    async fn create(&self, connection_url: &str, template: &str, target: &str) -> Result<()>;

    /// Drop `name` if it exists. Never drops `template`.
    async fn drop(&self, connection_url: &str, name: &str, template: &str) -> Result<()>;

    async fn exists(&self, connection_url: &str, name: &str) -> Result<bool>;

    /// Names matching a SQL `LIKE` pattern, sorted.
    async fn list_by_pattern(&self, connection_url: &str, pattern: &str) -> Result<Vec<String>>;
}

/// `LIKE` pattern matching every slot database of `base_name`.
pub fn slot_database_pattern(base_name: &str) -> String {
    format!("{}\\_wt%", base_name.replace('_', "\\_"))
}

/// Slot number encoded in a slot database name, if `name` is one.
pub fn slot_of_database(name: &str, base_name: &str) -> Option<u32> {
    let digits = name.strip_prefix(base_name)?.strip_prefix("_wt")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub struct PsqlAdmin {
    program: String,
}

impl PsqlAdmin {
    pub fn new() -> Self {
        Self {
            program: "psql".to_string(),
        }
    }

    /// Use a specific `psql` binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn query(&self, connection_url: &str, sql: &str) -> Result<String> {
        let env = connection_env(connection_url)?;
        let env: Vec<(&str, &str)> = env.iter().map(|(k, v)| (*k, v.as_str())).collect();
        run_checked_with_env(
            &self.program,
            &["--no-psqlrc", "-v", "ON_ERROR_STOP=1", "-tA", "-c", sql],
            &env,
            None,
        )
        .await
    }
}

/// libpq environment for `connection_url`, pointed at the maintenance database.
///
/// Accepts `postgres://` and `postgresql://` URLs:
/// `scheme://[user[:password]@]host[:port][/db][?params]`.
pub(crate) fn connection_env(connection_url: &str) -> Result<Vec<(&'static str, String)>> {
    let invalid = || {
        Error::Validation(format!(
            "'{}' is not a postgres:// connection URL",
            redact_url_credentials(connection_url)
        ))
    };

    let rest = connection_url
        .strip_prefix("postgresql://")
        .or_else(|| connection_url.strip_prefix("postgres://"))
        .ok_or_else(invalid)?;
    let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));
    let authority = rest.split('/').next().unwrap_or_default();

    let (userinfo, hostport) = match authority.rsplit_once('@') {
        Some((userinfo, hostport)) => (Some(userinfo), hostport),
        None => (None, authority),
    };

    let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
        // IPv6 literal: [::1]:5432
        let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
        (host, after.strip_prefix(':'))
    } else {
        match hostport.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (hostport, None),
        }
    };
    if let Some(port) = port.filter(|p| !p.is_empty()) {
        if port.parse::<u16>().is_err() {
            return Err(invalid());
        }
    }

    let mut env = Vec::new();
    if !host.is_empty() {
        env.push(("PGHOST", percent_decode(host)));
    }
    if let Some(port) = port.filter(|p| !p.is_empty()) {
        env.push(("PGPORT", port.to_string()));
    }
    if let Some(userinfo) = userinfo {
        let (user, password) = match userinfo.split_once(':') {
            Some((user, password)) => (user, Some(password)),
            None => (userinfo, None),
        };
        if !user.is_empty() {
            env.push(("PGUSER", percent_decode(user)));
        }
        if let Some(password) = password {
            env.push(("PGPASSWORD", percent_decode(password)));
        }
    }
    env.push(("PGDATABASE", MAINTENANCE_DATABASE.to_string()));

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match LIBPQ_QUERY_PARAMS.iter().find(|(param, _)| *param == key) {
            Some((_, var)) => env.push((*var, percent_decode(value))),
            None => tracing::debug!("Ignoring connection URL parameter '{}' for psql", key),
        }
    }

    Ok(env)
}

/// Decode `%XX` escapes; malformed escapes are kept as written.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

impl Default for PsqlAdmin {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_identifier(name: &str) -> Result<&str> {
    if is_sql_identifier(name) {
        Ok(name)
    } else {
        Err(Error::Validation(format!(
            "'{}' is not a valid database name",
            name
        )))
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl DatabaseAdmin for PsqlAdmin {
    async fn create(&self, connection_url: &str, template: &str, target: &str) -> Result<()> {
        let sql = format!(
            "CREATE DATABASE {} TEMPLATE {}",
            quote_ident(checked_identifier(target)?),
            quote_ident(checked_identifier(template)?)
        );
        self.query(connection_url, &sql).await?;
        tracing::info!("Created database {} from template {}", target, template);
        Ok(())
    }

    async fn drop(&self, connection_url: &str, name: &str, template: &str) -> Result<()> {
        if name == template {
            return Err(Error::Validation(format!(
                "refusing to drop template database '{}'",
                template
            )));
        }
        let sql = format!(
            "DROP DATABASE IF EXISTS {}",
            quote_ident(checked_identifier(name)?)
        );
        self.query(connection_url, &sql).await?;
        tracing::info!("Dropped database {}", name);
        Ok(())
    }

    async fn exists(&self, connection_url: &str, name: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM pg_database WHERE datname = {}",
            quote_literal(name)
        );
        Ok(self.query(connection_url, &sql).await? == "1")
    }

    async fn list_by_pattern(&self, connection_url: &str, pattern: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT datname FROM pg_database WHERE datname LIKE {} ORDER BY datname",
            quote_literal(pattern)
        );
        let output = self.query(connection_url, &sql).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
