// Test Bolt Server
// In-process boltr server whose backend answers queries from a script and records what it saw

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use boltr::error::BoltError;
use boltr::server::{
    AuthCredentials, AuthInfo, AuthValidator, BoltBackend, BoltRecord, BoltServer, ResultMetadata, ResultStream,
    SessionConfig, SessionHandle, SessionProperty, TransactionHandle,
};
use boltr::types::{BoltDict, BoltValue};
use tokio::task::JoinHandle;

/// Password the server always rejects.
pub const REJECTED_PASSWORD: &str = "wrong";

/// One query as the server saw it.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub params: HashMap<String, BoltValue>,
    pub read_only: bool,
    pub database: Option<String>,
    pub tx_timeout: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Rows { fields: Vec<String>, records: Vec<Vec<BoltValue>> },
    Failure { code: String, message: String },
}

impl Reply {
    pub fn rows(fields: &[&str], records: Vec<Vec<BoltValue>>) -> Self {
        Reply::Rows {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            records,
        }
    }

    pub fn failure(code: &str, message: &str) -> Self {
        Reply::Failure {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Backend calls in arrival order, across all connections.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Session,
    Begin(BoltDict),
    Run(String),
    Commit,
    Rollback,
    Reset,
}

type Script = Arc<dyn Fn(&Query) -> Reply + Send + Sync>;

struct ScriptedBackend {
    script: Script,
    events: Arc<Mutex<Vec<Event>>>,
    transactions: Mutex<HashMap<String, BoltDict>>,
    next_id: AtomicU64,
}

impl ScriptedBackend {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn next_handle(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait::async_trait]
impl BoltBackend for ScriptedBackend {
    async fn create_session(&self, _config: &SessionConfig) -> Result<SessionHandle, BoltError> {
        self.record(Event::Session);
        Ok(SessionHandle(self.next_handle("session")))
    }

    async fn close_session(&self, _session: &SessionHandle) -> Result<(), BoltError> {
        Ok(())
    }

    async fn configure_session(&self, _session: &SessionHandle, _property: SessionProperty) -> Result<(), BoltError> {
        Ok(())
    }

    async fn reset_session(&self, _session: &SessionHandle) -> Result<(), BoltError> {
        self.record(Event::Reset);
        Ok(())
    }

    async fn execute(
        &self,
        _session: &SessionHandle,
        query: &str,
        parameters: &HashMap<String, BoltValue>,
        _extra: &BoltDict,
        transaction: Option<&TransactionHandle>,
    ) -> Result<ResultStream, BoltError> {
        self.record(Event::Run(query.to_string()));
        let begin = transaction
            .and_then(|tx| self.transactions.lock().unwrap().get(&tx.0).cloned())
            .unwrap_or_default();
        let query = Query {
            text: query.to_string(),
            params: parameters.clone(),
            read_only: begin.get("mode").and_then(BoltValue::as_str) == Some("r"),
            database: begin.get("db").and_then(BoltValue::as_str).map(str::to_string),
            tx_timeout: begin.get("tx_timeout").and_then(BoltValue::as_int),
        };

        match (self.script)(&query) {
            Reply::Rows { fields, records } => Ok(ResultStream {
                metadata: ResultMetadata {
                    columns: fields,
                    extra: BoltDict::new(),
                },
                records: records.into_iter().map(|values| BoltRecord { values }).collect(),
                summary: BoltDict::new(),
            }),
            Reply::Failure { code, message } => Err(BoltError::Query { code, message }),
        }
    }

    async fn begin_transaction(&self, _session: &SessionHandle, extra: &BoltDict) -> Result<TransactionHandle, BoltError> {
        self.record(Event::Begin(extra.clone()));
        let handle = self.next_handle("tx");
        self.transactions.lock().unwrap().insert(handle.clone(), extra.clone());
        Ok(TransactionHandle(handle))
    }

    async fn commit(&self, _session: &SessionHandle, transaction: &TransactionHandle) -> Result<BoltDict, BoltError> {
        self.record(Event::Commit);
        self.transactions.lock().unwrap().remove(&transaction.0);
        Ok(BoltDict::new())
    }

    async fn rollback(&self, _session: &SessionHandle, transaction: &TransactionHandle) -> Result<(), BoltError> {
        self.record(Event::Rollback);
        self.transactions.lock().unwrap().remove(&transaction.0);
        Ok(())
    }

    async fn get_server_info(&self) -> Result<BoltDict, BoltError> {
        Ok(BoltDict::from([(
            "server".to_string(),
            BoltValue::from("Neo4j/5.20.0"),
        )]))
    }
}

struct PasswordCheck;

#[async_trait::async_trait]
impl AuthValidator for PasswordCheck {
    async fn validate(&self, credentials: &AuthCredentials) -> Result<AuthInfo, BoltError> {
        if credentials.credentials.as_deref() == Some(REJECTED_PASSWORD) {
            return Err(BoltError::Authentication(
                "The client is unauthorized due to authentication failure.".to_string(),
            ));
        }
        Ok(AuthInfo {
            principal: credentials.principal.clone().unwrap_or_default(),
            credentials_expired: false,
        })
    }
}

pub struct FakeBoltServer {
    addr: SocketAddr,
    events: Arc<Mutex<Vec<Event>>>,
    serve: JoinHandle<()>,
}

impl FakeBoltServer {
    pub async fn start(script: impl Fn(&Query) -> Reply + Send + Sync + 'static) -> Self {
        // The builder binds the address itself, so reserve a free port first
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let backend = ScriptedBackend {
            script: Arc::new(script),
            events: Arc::clone(&events),
            transactions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        };

        let serve = tokio::spawn(async move {
            let _ = BoltServer::builder(backend).auth(PasswordCheck).serve(addr).await;
        });

        for _ in 0..200 {
            if tokio::net::TcpStream::connect(addr).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // The readiness connection above opened no session
        Self { addr, events, serve }
    }

    pub fn uri(&self) -> String {
        format!("bolt://{}", self.addr)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Queries that reached RUN, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Run(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Extras sent with each BEGIN.
    pub fn begins(&self) -> Vec<BoltDict> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Begin(extra) => Some(extra),
                _ => None,
            })
            .collect()
    }
}

impl Drop for FakeBoltServer {
    fn drop(&mut self) {
        self.serve.abort();
    }
}
