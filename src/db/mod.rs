//! Backend adapters: one administrative connection per invocation.
//!
//! Layout:
//! - `mod.rs`: backend kinds, the [`BackendAdapter`] capability set and the
//!   closed [`Backend`] sum type the registry hands out
//! - `mongo.rs`: document store (role maps)
//! - `mysql.rs`: relational A (GRANT statements)
//! - `postgres.rs`: relational B (owner-based ACLs)
//! - `sql.rs`: identifier quoting and literal escaping shared by the SQL engines

pub mod mongo;
pub mod mysql;
pub mod postgres;
pub mod sql;

pub use mongo::MongoAdapter;
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;

use crate::config::{Config, DocumentRole};
use crate::error::{BackendError, ProvisionError};
use crate::types::target::MONGODB_SRV_SCHEME;
use crate::types::{ConnectionDescriptor, DatabaseHandle, Outcome, Principal, TargetConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Document store.
    Mongo,
    /// Relational A.
    MySql,
    /// Relational B.
    Postgres,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Mongo, BackendKind::MySql, BackendKind::Postgres];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Mongo => "mongo",
            BackendKind::MySql => "mysql",
            BackendKind::Postgres => "postgresql",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Mongo => 27017,
            BackendKind::MySql => 3306,
            BackendKind::Postgres => 5432,
        }
    }

    pub fn default_admin_user(&self) -> &'static str {
        match self {
            BackendKind::Mongo => "",
            BackendKind::MySql => "root",
            BackendKind::Postgres => "postgres",
        }
    }

    /// Scheme used when rendering descriptors.
    pub fn scheme(&self) -> &'static str {
        self.schemes()[0]
    }

    /// Schemes accepted in admin connection strings.
    pub fn schemes(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Mongo => &["mongodb", MONGODB_SRV_SCHEME],
            BackendKind::MySql => &["mysql"],
            BackendKind::Postgres => &["postgresql", "postgres"],
        }
    }

    /// Connection-string options copied from the admin target into the
    /// descriptor: TLS and topology settings only, never credentials.
    pub fn transport_params(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Mongo => &[
                "tls",
                "ssl",
                "tlsCAFile",
                "tlsAllowInvalidCertificates",
                "tlsAllowInvalidHostnames",
                "tlsInsecure",
                "replicaSet",
                "directConnection",
                "loadBalanced",
                "readPreference",
                "retryWrites",
                "w",
            ],
            BackendKind::MySql => &["ssl-mode", "ssl-ca"],
            BackendKind::Postgres => &["sslmode", "sslrootcert"],
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.schemes().contains(&scheme))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" | "document-store" => Ok(BackendKind::Mongo),
            "mysql" | "relational-a" => Ok(BackendKind::MySql),
            "postgresql" | "postgres" | "relational-b" => Ok(BackendKind::Postgres),
            _ => Err(ProvisionError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Settings shared by every adapter, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub connect_timeout: Duration,
    pub document_role: DocumentRole,
    pub mysql_user_host: String,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for AdapterOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            document_role: cfg.document_role,
            mysql_user_host: cfg.mysql_user_host.clone(),
        }
    }
}

/// Capability set every backend implements.
///
/// Backends supply the primitive create/update/converge calls; the
/// create-then-update rule lives once in [`ensure_principal`] and
/// [`ensure_database`]. Every error returned is already classified.
///
/// [`ensure_principal`]: BackendAdapter::ensure_principal
/// [`ensure_database`]: BackendAdapter::ensure_database
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn target(&self) -> &TargetConfig;

    /// Cheap no-op round trip. Never errors; `false` means unreachable.
    async fn verify_connectivity(&self) -> bool;

    /// Acquire whatever dedicated connection the provisioning steps need.
    async fn prepare(&self) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn create_principal(&self, principal: &Principal) -> Result<(), BackendError>;

    async fn update_principal(&self, principal: &Principal) -> Result<(), BackendError>;

    async fn create_database(&self, database: &DatabaseHandle) -> Result<(), BackendError>;

    /// Bring an existing database under `database.owner`.
    async fn converge_database(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError>;

    async fn grant_privileges(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError>;

    fn render_connection_descriptor(&self, principal: &Principal) -> ConnectionDescriptor;

    /// Release administrative connections.
    async fn close(&self) {}

    async fn ensure_principal(&self, principal: &Principal) -> Result<Outcome, BackendError> {
        match self.create_principal(principal).await {
            Ok(()) => Ok(Outcome::Created),
            Err(e) if e.is_already_exists() => {
                debug!(username = %principal.username(), "principal exists; updating");
                self.update_principal(principal).await?;
                Ok(Outcome::AlreadyPresentAndUpdated)
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_database(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        match self.create_database(database).await {
            Ok(()) => Ok(Outcome::Created),
            Err(e) if e.is_already_exists() => {
                debug!(database = %database.name, "database exists; converging owner");
                self.converge_database(database).await
            }
            Err(e) => Err(e),
        }
    }
}

/// The closed set of adapters the registry can produce.
pub enum Backend {
    Mongo(MongoAdapter),
    MySql(MySqlAdapter),
    Postgres(PostgresAdapter),
}

impl Backend {
    /// Registry entry point: resolve the kind first so an unknown identifier
    /// fails before any connection string is parsed or socket opened.
    pub async fn connect(
        db_type: &str,
        connection_string: &str,
        options: &AdapterOptions,
    ) -> Result<Self, ProvisionError> {
        let kind: BackendKind = db_type.parse()?;
        let target = TargetConfig::parse(kind, connection_string)?;
        Self::open(target, connection_string, options).await
    }

    pub async fn open(
        target: TargetConfig,
        connection_string: &str,
        options: &AdapterOptions,
    ) -> Result<Self, ProvisionError> {
        Ok(match target.kind {
            BackendKind::Mongo => {
                Backend::Mongo(MongoAdapter::open(target, connection_string, options).await?)
            }
            BackendKind::MySql => Backend::MySql(MySqlAdapter::open(target, options)?),
            BackendKind::Postgres => Backend::Postgres(PostgresAdapter::open(target, options)?),
        })
    }
}

macro_rules! delegate {
    ($self:ident, $adapter:ident => $call:expr) => {
        match $self {
            Backend::Mongo($adapter) => $call,
            Backend::MySql($adapter) => $call,
            Backend::Postgres($adapter) => $call,
        }
    };
}

#[async_trait]
impl BackendAdapter for Backend {
    fn kind(&self) -> BackendKind {
        delegate!(self, a => a.kind())
    }

    fn target(&self) -> &TargetConfig {
        delegate!(self, a => a.target())
    }

    async fn verify_connectivity(&self) -> bool {
        delegate!(self, a => a.verify_connectivity().await)
    }

    async fn prepare(&self) -> Result<(), ProvisionError> {
        delegate!(self, a => a.prepare().await)
    }

    async fn create_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        delegate!(self, a => a.create_principal(principal).await)
    }

    async fn update_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        delegate!(self, a => a.update_principal(principal).await)
    }

    async fn create_database(&self, database: &DatabaseHandle) -> Result<(), BackendError> {
        delegate!(self, a => a.create_database(database).await)
    }

    async fn converge_database(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        delegate!(self, a => a.converge_database(database).await)
    }

    async fn grant_privileges(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        delegate!(self, a => a.grant_privileges(database).await)
    }

    fn render_connection_descriptor(&self, principal: &Principal) -> ConnectionDescriptor {
        delegate!(self, a => a.render_connection_descriptor(principal))
    }

    async fn close(&self) {
        delegate!(self, a => a.close().await)
    }

    async fn ensure_principal(&self, principal: &Principal) -> Result<Outcome, BackendError> {
        delegate!(self, a => a.ensure_principal(principal).await)
    }

    async fn ensure_database(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        delegate!(self, a => a.ensure_database(database).await)
    }
}

/// Grants are re-issued on every run; only a grant the principal did not
/// hold beforehand is reported as `Created`.
pub(crate) fn grant_outcome(already_held: bool) -> Outcome {
    if already_held {
        Outcome::Unchanged
    } else {
        Outcome::Created
    }
}
