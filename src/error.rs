use crate::db::BackendKind;
use crate::service::classifier::ErrorClass;
use crate::service::reconciler::Step;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ProvisionError {
    #[error("invalid connection string: {0}")]
    ConfigParse(String),

    #[error("unsupported database type: {0}")]
    UnsupportedBackend(String),

    #[error("invalid username '{username}': {reason}")]
    InvalidPrincipal { username: String, reason: &'static str },

    #[error("{backend} administrative endpoint {endpoint} is unreachable")]
    Connectivity {
        backend: BackendKind,
        endpoint: String,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{operation} for user '{username}' aborted: {source}")]
    Aborted {
        operation: Step,
        username: String,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionError {
    /// Wrap a step failure with the context the CLI needs for one actionable line.
    pub fn aborted(operation: Step, username: impl Into<String>, source: ProvisionError) -> Self {
        ProvisionError::Aborted {
            operation,
            username: username.into(),
            source: Box::new(source),
        }
    }

    /// Classification of the innermost backend failure, if any.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            ProvisionError::Backend(e) => Some(e.class),
            ProvisionError::Aborted { source, .. } => source.class(),
            _ => None,
        }
    }
}

impl From<figment::Error> for ProvisionError {
    fn from(e: figment::Error) -> Self {
        ProvisionError::Config(Box::new(e))
    }
}

/// Native driver error, kept as the source of a classified [`BackendError`].
#[derive(Debug, ThisError)]
pub enum DriverError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),

    /// Failure raised by adapters that do not sit on a network driver.
    #[error("{0}")]
    Other(String),
}

/// A backend failure that has already been through the classifier.
#[derive(Debug, ThisError)]
#[error("{backend} reported {class} error: {source}")]
pub struct BackendError {
    pub backend: BackendKind,
    pub class: ErrorClass,
    #[source]
    pub source: DriverError,
}

impl BackendError {
    pub fn new(backend: BackendKind, class: ErrorClass, source: impl Into<DriverError>) -> Self {
        Self {
            backend,
            class,
            source: source.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.class == ErrorClass::AlreadyExists
    }
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for BackendError {
    fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

impl IsRetryable for ProvisionError {
    fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Backend(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_message_names_operation_and_user() {
        let inner = BackendError::new(
            BackendKind::Postgres,
            ErrorClass::Fatal,
            DriverError::Other("permission denied".to_string()),
        );
        let err = ProvisionError::aborted(Step::GrantPrivileges, "bob", inner.into());
        let msg = err.to_string();
        assert!(msg.contains("grant_privileges"));
        assert!(msg.contains("'bob'"));
        assert!(msg.contains("permission denied"));
        assert_eq!(err.class(), Some(ErrorClass::Fatal));
    }

    #[test]
    fn only_transient_backend_errors_are_retryable() {
        let transient = BackendError::new(
            BackendKind::MySql,
            ErrorClass::Transient,
            DriverError::Other("deadlock".to_string()),
        );
        let exists = BackendError::new(
            BackendKind::MySql,
            ErrorClass::AlreadyExists,
            DriverError::Other("exists".to_string()),
        );
        assert!(transient.is_retryable());
        assert!(!exists.is_retryable());
        assert!(exists.is_already_exists());
        assert!(!ProvisionError::UnsupportedBackend("oracle".into()).is_retryable());
    }
}
