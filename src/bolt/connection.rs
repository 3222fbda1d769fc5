// Bolt Connection
// One authenticated boltr connection to the graph server, run in explicit transactions

use std::io;
use std::time::Duration;

use boltr::client::BoltConnection;
use boltr::error::BoltError;
use boltr::types::{BoltDict, BoltValue};

use super::error::BoltErrorExt;

pub const DEFAULT_PORT: u16 = 7687;
const USER_AGENT: &str = concat!("dashquery/", env!("CARGO_PKG_VERSION"));

/// Host and port parsed from a `bolt://` or `neo4j://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoltTarget {
    pub host: String,
    pub port: u16,
}

impl BoltTarget {
    pub fn parse(uri: &str) -> Result<Self, String> {
        let url = url::Url::parse(uri).map_err(|e| format!("Invalid Bolt URI {}: {}", uri, e))?;
        match url.scheme() {
            "bolt" | "neo4j" => {}
            "bolt+s" | "bolt+ssc" | "neo4j+s" | "neo4j+ssc" => {
                return Err(format!("Invalid Bolt URI {}: encrypted connections are not supported", uri))
            }
            other => return Err(format!("Invalid Bolt URI {}: unknown scheme '{}'", uri, other)),
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("Invalid Bolt URI {}: missing host", uri))?;
        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
        })
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum BoltAuth {
    None,
    Basic { username: String, password: String },
}

impl std::fmt::Debug for BoltAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoltAuth::None => write!(f, "None"),
            BoltAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Per-transaction settings sent with BEGIN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxConfig {
    pub read_only: bool,
    pub database: Option<String>,
    pub timeout: Option<Duration>,
}

impl TxConfig {
    fn begin_extra(&self) -> BoltDict {
        let mut extra = BoltDict::new();
        if self.read_only {
            extra.insert("mode".to_string(), BoltValue::from("r"));
        }
        if let Some(db) = &self.database {
            extra.insert("db".to_string(), BoltValue::from(db.as_str()));
        }
        if let Some(timeout) = self.timeout {
            let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            extra.insert("tx_timeout".to_string(), BoltValue::Integer(millis));
        }
        extra
    }
}

/// Everything one query produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoltResult {
    pub fields: Vec<String>,
    pub records: Vec<Vec<BoltValue>>,
    pub summary: BoltDict,
}

/// A boltr connection that remembers whether it can still be pooled.
pub struct BoltClient {
    inner: BoltConnection,
    broken: bool,
}

fn io_error(kind: io::ErrorKind, message: String) -> BoltError {
    BoltError::Io(io::Error::new(kind, message))
}

impl BoltClient {
    /// Resolve, connect, negotiate a protocol version and authenticate.
    pub async fn connect(target: &BoltTarget, auth: &BoltAuth, timeout: Duration) -> Result<Self, BoltError> {
        tokio::time::timeout(timeout, Self::open(target, auth))
            .await
            .map_err(|_| io_error(io::ErrorKind::TimedOut, format!("Timed out connecting to {}", target.address())))?
    }

    async fn open(target: &BoltTarget, auth: &BoltAuth) -> Result<Self, BoltError> {
        let addr = tokio::net::lookup_host((target.host.as_str(), target.port))
            .await?
            .next()
            .ok_or_else(|| io_error(io::ErrorKind::NotFound, format!("No address for {}", target.address())))?;
        let mut inner = BoltConnection::connect(addr).await?;

        let mut extra = BoltDict::new();
        extra.insert("user_agent".to_string(), BoltValue::from(USER_AGENT));
        if inner.version() >= (5, 3) {
            let agent = BoltDict::from([("product".to_string(), BoltValue::from(USER_AGENT))]);
            extra.insert("bolt_agent".to_string(), BoltValue::Dict(agent));
        }
        let metadata = inner.hello(extra).await?;
        match auth {
            BoltAuth::None => inner.logon("none", None, None).await?,
            BoltAuth::Basic { username, password } => {
                inner.logon("basic", Some(username.as_str()), Some(password.as_str())).await?
            }
        }

        let (major, minor) = inner.version();
        tracing::debug!(
            address = %target.address(),
            version = %format!("{}.{}", major, minor),
            server = metadata.get("server").and_then(BoltValue::as_str).unwrap_or("unknown"),
            "Bolt connection established"
        );
        Ok(Self { inner, broken: false })
    }

    pub fn version(&self) -> (u8, u8) {
        self.inner.version()
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Return the connection to a clean state.
    pub async fn reset(&mut self) -> Result<(), BoltError> {
        let result = self.inner.reset().await;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    /// Run `query` inside an explicit transaction and pull every record.
    ///
    /// The transaction is committed on success. On a server failure the
    /// connection is RESET so it can go back to the pool; anything else
    /// marks it broken.
    pub async fn run_in_transaction(
        &mut self,
        query: &str,
        parameters: BoltDict,
        tx: &TxConfig,
    ) -> Result<BoltResult, BoltError> {
        let result = self.transaction(query, parameters, tx).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                self.broken = true;
            } else if let Err(reset_err) = self.reset().await {
                tracing::warn!(error = %reset_err, "Failed to reset Bolt connection");
            }
        }
        result
    }

    async fn transaction(&mut self, query: &str, parameters: BoltDict, tx: &TxConfig) -> Result<BoltResult, BoltError> {
        self.inner.begin(tx.begin_extra()).await?;
        let metadata = self.inner.run(query, parameters, BoltDict::new()).await?;
        let fields = match metadata.get("fields") {
            Some(BoltValue::List(items)) => items.iter().filter_map(BoltValue::as_str).map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let (records, summary) = self.inner.pull_all().await?;
        self.inner.commit().await?;
        Ok(BoltResult {
            fields,
            records,
            summary,
        })
    }

    /// Say GOODBYE and drop the socket.
    pub async fn close(mut self) {
        if !self.broken {
            let _ = self.inner.goodbye().await;
        }
    }
}
