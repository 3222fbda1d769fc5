// Bolt Error Classification
// Reads auth failures, transaction timeouts and broken connections out of boltr errors

use boltr::error::BoltError;

const SECURITY_PREFIX: &str = "Neo.ClientError.Security.";
const TIMED_OUT_PREFIX: &str = "Neo.ClientError.Transaction.TransactionTimedOut";
const TERMINATED_PREFIX: &str = "The transaction has been terminated";

pub trait BoltErrorExt {
    /// Server status code, when the failure carried one.
    fn failure_code(&self) -> Option<&str>;

    /// True when the server rejected the supplied credentials.
    fn is_auth_failure(&self) -> bool;

    /// True when the server terminated the transaction because it ran out of time.
    fn is_timeout(&self) -> bool;

    /// Errors after which the connection can no longer be trusted.
    fn is_fatal(&self) -> bool;
}

impl BoltErrorExt for BoltError {
    fn failure_code(&self) -> Option<&str> {
        match self {
            BoltError::Query { code, .. } => Some(code),
            _ => None,
        }
    }

    fn is_auth_failure(&self) -> bool {
        match self {
            BoltError::Authentication(_) | BoltError::Forbidden(_) => true,
            BoltError::Query { code, .. } => code.starts_with(SECURITY_PREFIX),
            _ => false,
        }
    }

    fn is_timeout(&self) -> bool {
        match self {
            BoltError::Query { code, message } => {
                message.starts_with(TERMINATED_PREFIX) || code.starts_with(TIMED_OUT_PREFIX)
            }
            BoltError::Transaction(message) => message.starts_with(TERMINATED_PREFIX),
            _ => false,
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(
            self,
            BoltError::Io(_) | BoltError::Protocol(_) | BoltError::Session(_) | BoltError::ResourceExhausted(_)
        )
    }
}
