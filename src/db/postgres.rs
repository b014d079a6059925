use super::sql::{pg_ident, pg_literal};
use super::{AdapterOptions, BackendAdapter, BackendKind, grant_outcome};
use crate::error::{BackendError, ProvisionError};
use crate::service::classifier::classify_sqlx;
use crate::types::{ConnectionDescriptor, DatabaseHandle, Outcome, Principal, TargetConfig};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const GRANT_HELD_SQL: &str = "SELECT EXISTS (\
     SELECT 1 FROM pg_database d \
     CROSS JOIN LATERAL aclexplode(d.datacl) a \
     JOIN pg_roles r ON r.oid = a.grantee \
     WHERE d.datname = $1 AND r.rolname = $2)";

/// Relational B. Databases are owned by a role; `CREATE DATABASE` refuses to
/// run inside a transaction block, so all provisioning DDL goes through a
/// dedicated autocommit connection kept apart from the probe connection.
pub struct PostgresAdapter {
    target: TargetConfig,
    connect: PgConnectOptions,
    acquire_timeout: Duration,
    probe: PgPool,
    ddl: OnceCell<PgPool>,
}

impl PostgresAdapter {
    /// Build the administrative handle. No I/O happens until the first query.
    pub fn open(target: TargetConfig, options: &AdapterOptions) -> Result<Self, ProvisionError> {
        let mut connect = PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(target.admin_username())
            .password(target.admin_password())
            .application_name("tenant-provisioner");
        if let Some(db) = target.admin_database() {
            connect = connect.database(db);
        }
        if let Some(mode) = target.param("sslmode") {
            let mode: PgSslMode = mode
                .parse()
                .map_err(|e| ProvisionError::ConfigParse(format!("sslmode: {e}")))?;
            connect = connect.ssl_mode(mode);
        }
        if let Some(cert) = target.param("sslrootcert") {
            connect = connect.ssl_root_cert(cert);
        }

        let probe = Self::single_connection(options.connect_timeout).connect_lazy_with(connect.clone());

        Ok(Self {
            target,
            connect,
            acquire_timeout: options.connect_timeout,
            probe,
            ddl: OnceCell::new(),
        })
    }

    fn single_connection(acquire_timeout: Duration) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
    }

    async fn ddl_pool(&self) -> Result<&PgPool, BackendError> {
        self.ddl
            .get_or_try_init(|| async {
                debug!(endpoint = %self.target.endpoint(), "opening DDL connection");
                Self::single_connection(self.acquire_timeout)
                    .connect_with(self.connect.clone())
                    .await
                    .map_err(|e| classify_sqlx(BackendKind::Postgres, e))
            })
            .await
    }

    /// Whether the role already has an explicit ACL entry on the database.
    /// A freshly created database has none until the first grant.
    async fn grant_held(&self, database: &DatabaseHandle) -> Result<bool, BackendError> {
        let pool = self.ddl_pool().await?;
        sqlx::query_scalar::<_, bool>(GRANT_HELD_SQL)
            .bind(&database.name)
            .bind(&database.owner)
            .fetch_one(pool)
            .await
            .map_err(|e| classify_sqlx(BackendKind::Postgres, e))
    }

    async fn execute(&self, sql: &str) -> Result<(), BackendError> {
        let pool = self.ddl_pool().await?;
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(|e| classify_sqlx(BackendKind::Postgres, e))
    }
}

fn create_role_sql(principal: &Principal) -> String {
    format!(
        "CREATE ROLE {} WITH LOGIN PASSWORD {}",
        pg_ident(principal.username()),
        pg_literal(principal.password())
    )
}

fn alter_role_sql(principal: &Principal) -> String {
    format!(
        "ALTER ROLE {} WITH LOGIN PASSWORD {}",
        pg_ident(principal.username()),
        pg_literal(principal.password())
    )
}

fn create_database_sql(database: &DatabaseHandle) -> String {
    format!(
        "CREATE DATABASE {} OWNER {}",
        pg_ident(&database.name),
        pg_ident(&database.owner)
    )
}

fn reassign_owner_sql(database: &DatabaseHandle) -> String {
    format!(
        "ALTER DATABASE {} OWNER TO {}",
        pg_ident(&database.name),
        pg_ident(&database.owner)
    )
}

fn grant_sql(database: &DatabaseHandle) -> String {
    format!(
        "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
        pg_ident(&database.name),
        pg_ident(&database.owner)
    )
}

#[async_trait]
impl BackendAdapter for PostgresAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn target(&self) -> &TargetConfig {
        &self.target
    }

    async fn verify_connectivity(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.probe).await {
            Ok(_) => true,
            Err(e) => {
                warn!(endpoint = %self.target.endpoint(), error = %e, "PostgreSQL probe failed");
                false
            }
        }
    }

    async fn prepare(&self) -> Result<(), ProvisionError> {
        self.ddl_pool().await?;
        Ok(())
    }

    async fn create_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        info!(username = %principal.username(), "creating role");
        self.execute(&create_role_sql(principal)).await
    }

    async fn update_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        info!(username = %principal.username(), "role exists, updating password");
        self.execute(&alter_role_sql(principal)).await
    }

    async fn create_database(&self, database: &DatabaseHandle) -> Result<(), BackendError> {
        info!(database = %database.name, owner = %database.owner, "creating database");
        self.execute(&create_database_sql(database)).await
    }

    async fn converge_database(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        info!(database = %database.name, owner = %database.owner, "database exists, reassigning owner");
        self.execute(&reassign_owner_sql(database)).await?;
        Ok(Outcome::AlreadyPresentAndUpdated)
    }

    async fn grant_privileges(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        let held = self.grant_held(database).await?;
        self.execute(&grant_sql(database)).await?;
        let outcome = grant_outcome(held);
        info!(database = %database.name, username = %database.owner, %outcome, "granted privileges");
        Ok(outcome)
    }

    fn render_connection_descriptor(&self, principal: &Principal) -> ConnectionDescriptor {
        ConnectionDescriptor::for_principal(&self.target, principal)
    }

    async fn close(&self) {
        if let Some(ddl) = self.ddl.get() {
            ddl.close().await;
        }
        self.probe.close().await;
    }
}
