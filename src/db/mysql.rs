use super::sql::{mysql_account, mysql_ident, mysql_literal};
use super::{AdapterOptions, BackendAdapter, BackendKind, grant_outcome};
use crate::error::{BackendError, ProvisionError};
use crate::service::classifier::classify_sqlx;
use crate::types::{ConnectionDescriptor, DatabaseHandle, Outcome, Principal, TargetConfig};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::Connection;
use tracing::{debug, info, warn};

const FLUSH_PRIVILEGES_SQL: &str = "FLUSH PRIVILEGES";

const GRANT_HELD_SQL: &str = "SELECT COUNT(*) FROM information_schema.SCHEMA_PRIVILEGES \
     WHERE GRANTEE = ? AND TABLE_SCHEMA = ?";

/// Relational A. Access is expressed purely through GRANT statements;
/// databases have no owner.
pub struct MySqlAdapter {
    target: TargetConfig,
    pool: MySqlPool,
    user_host: String,
}

impl MySqlAdapter {
    /// Build the administrative handle. No I/O happens until the first query.
    pub fn open(target: TargetConfig, options: &AdapterOptions) -> Result<Self, ProvisionError> {
        let mut connect = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(target.admin_username())
            .password(target.admin_password());
        if let Some(db) = target.admin_database() {
            connect = connect.database(db);
        }
        if let Some(mode) = target.param("ssl-mode") {
            let mode: MySqlSslMode = mode
                .parse()
                .map_err(|e| ProvisionError::ConfigParse(format!("ssl-mode: {e}")))?;
            connect = connect.ssl_mode(mode);
        }
        if let Some(ca) = target.param("ssl-ca") {
            connect = connect.ssl_ca(ca);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(options.connect_timeout)
            .connect_lazy_with(connect);

        Ok(Self {
            target,
            pool,
            user_host: options.mysql_user_host.clone(),
        })
    }

    fn account(&self, username: &str) -> String {
        mysql_account(username, &self.user_host)
    }

    fn create_user_sql(&self, principal: &Principal) -> String {
        format!(
            "CREATE USER {} IDENTIFIED BY {}",
            self.account(principal.username()),
            mysql_literal(principal.password())
        )
    }

    fn alter_user_sql(&self, principal: &Principal) -> String {
        format!(
            "ALTER USER {} IDENTIFIED BY {}",
            self.account(principal.username()),
            mysql_literal(principal.password())
        )
    }

    fn create_database_sql(database: &DatabaseHandle) -> String {
        format!("CREATE DATABASE {}", mysql_ident(&database.name))
    }

    fn grant_sql(&self, database: &DatabaseHandle) -> String {
        format!(
            "GRANT ALL PRIVILEGES ON {}.* TO {}",
            mysql_ident(&database.name),
            self.account(&database.owner)
        )
    }

    /// Whether the account already holds a schema-level grant on the database.
    async fn grant_held(&self, database: &DatabaseHandle) -> Result<bool, BackendError> {
        sqlx::query_scalar::<_, i64>(GRANT_HELD_SQL)
            .bind(self.account(&database.owner))
            .bind(&database.name)
            .fetch_one(&self.pool)
            .await
            .map(|n| n > 0)
            .map_err(|e| classify_sqlx(BackendKind::MySql, e))
    }

    async fn execute(&self, sql: &str) -> Result<(), BackendError> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| classify_sqlx(BackendKind::MySql, e))
    }
}

#[async_trait]
impl BackendAdapter for MySqlAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    fn target(&self) -> &TargetConfig {
        &self.target
    }

    async fn verify_connectivity(&self) -> bool {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(endpoint = %self.target.endpoint(), error = %e, "MySQL connection failed");
                return false;
            }
        };
        match conn.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(endpoint = %self.target.endpoint(), error = %e, "MySQL ping failed");
                false
            }
        }
    }

    async fn create_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        info!(account = %self.account(principal.username()), "creating user");
        self.execute(&self.create_user_sql(principal)).await
    }

    async fn update_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        info!(account = %self.account(principal.username()), "user exists, updating password");
        self.execute(&self.alter_user_sql(principal)).await
    }

    async fn create_database(&self, database: &DatabaseHandle) -> Result<(), BackendError> {
        info!(database = %database.name, "creating database");
        self.execute(&Self::create_database_sql(database)).await
    }

    async fn converge_database(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        // Schemas carry no owner here; the grant step binds the user.
        debug!(database = %database.name, "database exists");
        Ok(Outcome::Unchanged)
    }

    async fn grant_privileges(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        let held = self.grant_held(database).await?;
        self.execute(&self.grant_sql(database)).await?;
        self.execute(FLUSH_PRIVILEGES_SQL).await?;
        let outcome = grant_outcome(held);
        info!(database = %database.name, account = %self.account(&database.owner), %outcome, "granted privileges");
        Ok(outcome)
    }

    fn render_connection_descriptor(&self, principal: &Principal) -> ConnectionDescriptor {
        ConnectionDescriptor::for_principal(&self.target, principal)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
