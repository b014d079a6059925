//! Backend error classification.
//!
//! Every backend-specific error identifier the crate knows about lives here.
//! Adapters hand raw driver errors to [`classify_sqlx`] / [`classify_mongo`]
//! and never inspect codes or message text themselves.

use crate::db::BackendKind;
use crate::error::{BackendError, DriverError};
use std::fmt;

/// Uniform outcome space for a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Target object already exists; the caller converts the step into an update.
    AlreadyExists,
    /// Worth retrying: lock conflicts, failovers, dropped connections.
    Transient,
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::AlreadyExists => "already-exists",
            ErrorClass::Transient => "transient",
            ErrorClass::Fatal => "fatal",
        })
    }
}

/// Raw signal extracted from a driver error, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<'a> {
    /// MySQL server error number.
    MySqlErrno(u16),
    /// PostgreSQL SQLSTATE.
    SqlState(&'a str),
    /// MongoDB server error code.
    MongoCode(i32),
    /// The request never got a server answer (I/O, pool or selection timeout).
    Transport,
    Unrecognized,
}

pub mod mysql {
    /// ER_CANNOT_USER: `CREATE USER` for an account that already exists.
    pub const USER_ALREADY_EXISTS: u16 = 1396;
    /// ER_DB_CREATE_EXISTS.
    pub const DB_ALREADY_EXISTS: u16 = 1007;

    pub const ALREADY_EXISTS: &[u16] = &[USER_ALREADY_EXISTS, DB_ALREADY_EXISTS];
    pub const TRANSIENT: &[u16] = &[
        1040, // ER_CON_COUNT_ERROR
        1053, // ER_SERVER_SHUTDOWN
        1205, // ER_LOCK_WAIT_TIMEOUT
        1213, // ER_LOCK_DEADLOCK
        2006, // CR_SERVER_GONE_ERROR
        2013, // CR_SERVER_LOST
    ];
}

pub mod postgres {
    /// duplicate_object, raised by `CREATE ROLE` for an existing role.
    pub const DUPLICATE_OBJECT: &str = "42710";
    pub const DUPLICATE_DATABASE: &str = "42P04";

    pub const ALREADY_EXISTS: &[&str] = &[DUPLICATE_OBJECT, DUPLICATE_DATABASE];
    pub const TRANSIENT: &[&str] = &[
        "40001", // serialization_failure
        "40P01", // deadlock_detected
        "55P03", // lock_not_available
        "53300", // too_many_connections
        "57P03", // cannot_connect_now
        "08000", "08001", "08003", "08004", "08006",
    ];
}

pub mod mongo {
    pub const USER_ALREADY_EXISTS: i32 = 51003;
    pub const NAMESPACE_EXISTS: i32 = 48;

    pub const ALREADY_EXISTS: &[i32] = &[USER_ALREADY_EXISTS, NAMESPACE_EXISTS];
    pub const TRANSIENT: &[i32] = &[
        6,     // HostUnreachable
        7,     // HostNotFound
        89,    // NetworkTimeout
        91,    // ShutdownInProgress
        189,   // PrimarySteppedDown
        262,   // ExceededTimeLimit
        9001,  // SocketException
        10107, // NotWritablePrimary
        11600, // InterruptedAtShutdown
        11602, // InterruptedDueToReplStateChange
        13435, // NotPrimaryNoSecondaryOk
        13436, // NotPrimaryOrSecondary
    ];
}

/// Map a raw signal to its class. Codes only; anything unknown is fatal.
pub fn classify(signal: &Signal<'_>) -> ErrorClass {
    match signal {
        Signal::MySqlErrno(n) if mysql::ALREADY_EXISTS.contains(n) => ErrorClass::AlreadyExists,
        Signal::MySqlErrno(n) if mysql::TRANSIENT.contains(n) => ErrorClass::Transient,
        Signal::SqlState(s) if postgres::ALREADY_EXISTS.contains(s) => ErrorClass::AlreadyExists,
        Signal::SqlState(s) if postgres::TRANSIENT.contains(s) => ErrorClass::Transient,
        Signal::MongoCode(c) if mongo::ALREADY_EXISTS.contains(c) => ErrorClass::AlreadyExists,
        Signal::MongoCode(c) if mongo::TRANSIENT.contains(c) => ErrorClass::Transient,
        Signal::Transport => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

/// Pull the stable identifier out of a sqlx error.
pub fn sqlx_signal<'a>(backend: BackendKind, err: &'a sqlx::Error) -> Signal<'a> {
    match err {
        sqlx::Error::Database(db_err) => match backend {
            BackendKind::MySql => db_err
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| Signal::MySqlErrno(e.number()))
                .unwrap_or(Signal::Unrecognized),
            BackendKind::Postgres => db_err
                .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                .map(|e| Signal::SqlState(e.code()))
                .unwrap_or(Signal::Unrecognized),
            BackendKind::Mongo => Signal::Unrecognized,
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
            Signal::Transport
        }
        _ => Signal::Unrecognized,
    }
}

/// Pull the stable identifier out of a MongoDB driver error.
pub fn mongo_signal(err: &mongodb::error::Error) -> Signal<'static> {
    use mongodb::error::{
        ErrorKind, RETRYABLE_WRITE_ERROR, TRANSIENT_TRANSACTION_ERROR, WriteFailure,
    };

    if err.contains_label(RETRYABLE_WRITE_ERROR) || err.contains_label(TRANSIENT_TRANSACTION_ERROR)
    {
        return Signal::Transport;
    }
    match err.kind.as_ref() {
        ErrorKind::Command(cmd) => Signal::MongoCode(cmd.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(wc)) => Signal::MongoCode(wc.code),
        ErrorKind::Write(WriteFailure::WriteError(we)) => Signal::MongoCode(we.code),
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            Signal::Transport
        }
        _ => Signal::Unrecognized,
    }
}

/// Classify a sqlx failure at the adapter boundary.
pub fn classify_sqlx(backend: BackendKind, err: sqlx::Error) -> BackendError {
    let class = classify(&sqlx_signal(backend, &err));
    BackendError::new(backend, class, DriverError::Sql(err))
}

/// Classify a MongoDB failure at the adapter boundary.
pub fn classify_mongo(err: mongodb::error::Error) -> BackendError {
    let class = classify(&mongo_signal(&err));
    BackendError::new(BackendKind::Mongo, class, DriverError::Mongo(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_already_exists_codes_are_recognised() {
        for n in [mysql::USER_ALREADY_EXISTS, mysql::DB_ALREADY_EXISTS] {
            assert_eq!(classify(&Signal::MySqlErrno(n)), ErrorClass::AlreadyExists);
        }
        for s in [postgres::DUPLICATE_OBJECT, postgres::DUPLICATE_DATABASE] {
            assert_eq!(classify(&Signal::SqlState(s)), ErrorClass::AlreadyExists);
        }
        for c in [mongo::USER_ALREADY_EXISTS, mongo::NAMESPACE_EXISTS] {
            assert_eq!(classify(&Signal::MongoCode(c)), ErrorClass::AlreadyExists);
        }
    }

    #[test]
    fn transient_codes_and_transport_failures() {
        assert_eq!(classify(&Signal::MySqlErrno(1213)), ErrorClass::Transient);
        assert_eq!(classify(&Signal::SqlState("40P01")), ErrorClass::Transient);
        assert_eq!(classify(&Signal::MongoCode(189)), ErrorClass::Transient);
        assert_eq!(classify(&Signal::Transport), ErrorClass::Transient);
    }

    #[test]
    fn unknown_signals_are_fatal() {
        assert_eq!(classify(&Signal::MySqlErrno(1044)), ErrorClass::Fatal);
        assert_eq!(classify(&Signal::SqlState("42501")), ErrorClass::Fatal);
        assert_eq!(classify(&Signal::MongoCode(13)), ErrorClass::Fatal);
        assert_eq!(classify(&Signal::Unrecognized), ErrorClass::Fatal);
    }

    #[test]
    fn codes_do_not_leak_across_backends() {
        // 48 is NamespaceExists in MongoDB but means nothing to MySQL.
        assert_eq!(classify(&Signal::MySqlErrno(48)), ErrorClass::Fatal);
        assert_eq!(classify(&Signal::SqlState("1007")), ErrorClass::Fatal);
    }

    fn command_error(code: i32, code_name: &str) -> mongodb::error::Error {
        let cmd: mongodb::error::CommandError = mongodb::bson::from_document(mongodb::bson::doc! {
            "code": code,
            "codeName": code_name,
            "errmsg": "server said no",
        })
        .unwrap();
        mongodb::error::Error::from(mongodb::error::ErrorKind::Command(cmd))
    }

    #[test]
    fn mongo_command_codes_are_extracted() {
        let err = command_error(mongo::USER_ALREADY_EXISTS, "Location51003");
        assert_eq!(mongo_signal(&err), Signal::MongoCode(51003));
        assert_eq!(classify_mongo(err).class, ErrorClass::AlreadyExists);

        let err = command_error(189, "PrimarySteppedDown");
        assert_eq!(classify_mongo(err).class, ErrorClass::Transient);

        let err = command_error(13, "Unauthorized");
        assert_eq!(mongo_signal(&err), Signal::MongoCode(13));
        assert_eq!(classify_mongo(err).class, ErrorClass::Fatal);
    }

    #[test]
    fn mongo_io_failure_is_transport() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        let err = mongodb::error::Error::from(mongodb::error::ErrorKind::Io(std::sync::Arc::new(io)));
        assert_eq!(mongo_signal(&err), Signal::Transport);
        assert_eq!(classify_mongo(err).class, ErrorClass::Transient);
    }

    /// A database error from a driver the classifier has no table for.
    #[derive(Debug)]
    struct ForeignDatabaseError;

    impl fmt::Display for ForeignDatabaseError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("role \"bob\" already exists")
        }
    }

    impl std::error::Error for ForeignDatabaseError {}

    impl sqlx::error::DatabaseError for ForeignDatabaseError {
        fn message(&self) -> &str {
            "role \"bob\" already exists"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some("42710".into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn database_errors_are_read_through_the_backend_driver_type() {
        // Matching text or a foreign SQLSTATE must not count as a known code.
        for backend in [BackendKind::MySql, BackendKind::Postgres] {
            let err = sqlx::Error::Database(Box::new(ForeignDatabaseError));
            assert_eq!(sqlx_signal(backend, &err), Signal::Unrecognized);
            assert_eq!(classify_sqlx(backend, err).class, ErrorClass::Fatal);
        }
    }

    #[test]
    fn sqlx_transport_errors_are_transient() {
        let err = classify_sqlx(BackendKind::Postgres, sqlx::Error::PoolTimedOut);
        assert_eq!(err.class, ErrorClass::Transient);
        let err = classify_sqlx(
            BackendKind::MySql,
            sqlx::Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)),
        );
        assert_eq!(err.class, ErrorClass::Transient);
        let err = classify_sqlx(BackendKind::MySql, sqlx::Error::RowNotFound);
        assert_eq!(err.class, ErrorClass::Fatal);
    }
}
