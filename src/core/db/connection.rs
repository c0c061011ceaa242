/// Connection Management Module
///
/// Opens PostgreSQL sessions from a `Credentials` record and classifies
/// connection failures. A failed attempt is logged and reported as an
/// absent session; it never panics and is never retried.

use postgres::error::SqlState;
use postgres::{Client, NoTls};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::Result;

/// Everything needed to reach one database.
///
/// All five connection fields are required; optional fields tune the
/// session without changing which database is reached.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub database: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Schema search path applied to every session (`-c search_path=...`)
    pub search_path: Option<String>,
    /// Upper bound on the TCP/handshake phase; `None` uses the client default
    pub connect_timeout: Option<Duration>,
}

impl Credentials {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Credentials {
            database: database.into(),
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port,
            search_path: None,
            connect_timeout: None,
        }
    }

    /// Returns a copy of these credentials pointing at another database.
    pub fn with_database(&self, database: &str) -> Self {
        Credentials {
            database: database.to_string(),
            ..self.clone()
        }
    }

    pub fn with_search_path(mut self, search_path: impl Into<String>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// `user@host:port/database`, safe to log.
    pub fn target(&self) -> String {
        format!("{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }

    fn client_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .dbname(&self.database)
            .user(&self.username)
            .password(&self.password)
            .host(&self.host)
            .port(self.port);
        if let Some(path) = &self.search_path {
            config.options(&search_path_option(path));
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout(timeout);
        }
        config
    }
}

/// Startup option setting `search_path`.
///
/// The server splits startup options on whitespace, so spaces and
/// backslashes in the value are backslash-escaped.
fn search_path_option(path: &str) -> String {
    let mut option = String::from("-c search_path=");
    for c in path.chars() {
        if c == '\\' || c.is_whitespace() {
            option.push('\\');
        }
        option.push(c);
    }
    option
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("search_path", &self.search_path)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Why a connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailureKind {
    /// The server rejected the user name or password
    InvalidCredentials,
    /// The server could not be reached or dropped the connection
    Network,
    /// Anything else; carries the SQLSTATE when the server sent one
    Other { code: Option<String> },
}

impl ConnectFailureKind {
    /// Classifies a failure from its SQLSTATE and whether an I/O error caused it.
    pub fn classify(code: Option<&SqlState>, io_failure: bool) -> Self {
        match code {
            Some(code)
                if *code == SqlState::INVALID_PASSWORD
                    || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
            {
                ConnectFailureKind::InvalidCredentials
            }
            // Class 08: connection exception
            Some(code) if code.code().starts_with("08") => ConnectFailureKind::Network,
            Some(code) => ConnectFailureKind::Other {
                code: Some(code.code().to_string()),
            },
            None if io_failure => ConnectFailureKind::Network,
            None => ConnectFailureKind::Other { code: None },
        }
    }
}

/// A classified connection failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    pub kind: ConnectFailureKind,
    pub message: String,
}

impl ConnectFailure {
    pub fn new(kind: ConnectFailureKind, message: impl Into<String>) -> Self {
        ConnectFailure {
            kind,
            message: message.into(),
        }
    }

    fn from_client_error(error: &postgres::Error) -> Self {
        let kind = ConnectFailureKind::classify(error.code(), caused_by_io(error));
        ConnectFailure::new(kind, error.to_string())
    }

    fn report(&self, target: &str) {
        match &self.kind {
            ConnectFailureKind::InvalidCredentials => {
                warn!(endpoint = %target, "Invalid password.")
            }
            ConnectFailureKind::Network => {
                warn!(endpoint = %target, error = %self.message, "Connection error.")
            }
            ConnectFailureKind::Other { code } => warn!(
                endpoint = %target,
                code = code.as_deref().unwrap_or("none"),
                "Error occurred: {}",
                self.message
            ),
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConnectFailureKind::InvalidCredentials => write!(f, "invalid credentials: {}", self.message),
            ConnectFailureKind::Network => write!(f, "network failure: {}", self.message),
            ConnectFailureKind::Other { code: Some(code) } => {
                write!(f, "connection failed ({}): {}", code, self.message)
            }
            ConnectFailureKind::Other { code: None } => {
                write!(f, "connection failed: {}", self.message)
            }
        }
    }
}

fn caused_by_io(error: &postgres::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Logs when a session's connection is released.
struct ReleaseLog {
    target: String,
}

impl Drop for ReleaseLog {
    fn drop(&mut self) {
        debug!(endpoint = %self.target, "connection released");
    }
}

/// An open connection owned by exactly one caller.
///
/// Dropping the session closes the connection, so every exit path
/// (success, early return, propagated error) releases it.
pub struct Session {
    // Declared before `release` so the client is closed before the log line.
    client: Client,
    release: ReleaseLog,
}

impl Session {
    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn target(&self) -> &str {
        &self.release.target
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Closes the connection, reporting any error from the termination handshake.
    pub fn close(self) -> Result<()> {
        let Session { client, release } = self;
        let closed = client.close();
        drop(release);
        closed.map_err(Into::into)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.release.target)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

/// Closes a session opened by one of the one-shot helpers.
///
/// A failed termination handshake is logged; the work already done stands.
pub(crate) fn release(session: Session) {
    let target = session.target().to_string();
    if let Err(e) = session.close() {
        warn!(endpoint = %target, error = %e, "error while closing connection");
    }
}

/// Opens a session, returning the classified failure on error.
///
/// Single attempt; the failure is also logged.
pub fn try_connect(credentials: &Credentials) -> std::result::Result<Session, ConnectFailure> {
    let target = credentials.target();
    match credentials.client_config().connect(NoTls) {
        Ok(client) => {
            debug!(endpoint = %target, "connection opened");
            Ok(Session {
                client,
                release: ReleaseLog { target },
            })
        }
        Err(e) => {
            let failure = ConnectFailure::from_client_error(&e);
            failure.report(&target);
            Err(failure)
        }
    }
}

/// Opens a session, or returns `None` after logging why it could not.
///
/// Callers must check for `None` before use.
pub fn connect(credentials: &Credentials) -> Option<Session> {
    try_connect(credentials).ok()
}
