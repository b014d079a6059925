use super::{AdapterOptions, BackendAdapter, BackendKind};
use crate::config::DocumentRole;
use crate::error::{BackendError, ProvisionError};
use crate::service::classifier::classify_mongo;
use crate::types::{ConnectionDescriptor, DatabaseHandle, Outcome, Principal, TargetConfig};
use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::{debug, info, warn};

/// Collection created to materialise a tenant database, which MongoDB
/// otherwise only creates on first write.
pub const MARKER_COLLECTION: &str = "_provisioned";

/// Document store. Users live in the auth database and reach their own
/// database through a single role binding; there are no separate grants.
pub struct MongoAdapter {
    target: TargetConfig,
    client: Client,
    role: DocumentRole,
}

impl MongoAdapter {
    /// Build the client from the raw admin connection string. The driver
    /// connects lazily, so this only fails on a malformed string or, for
    /// `mongodb+srv`, an unresolvable seed list.
    pub async fn open(
        target: TargetConfig,
        connection_string: &str,
        options: &AdapterOptions,
    ) -> Result<Self, ProvisionError> {
        let mut client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| ProvisionError::ConfigParse(e.to_string()))?;
        client_options.app_name = Some("tenant-provisioner".to_string());
        client_options.connect_timeout = Some(options.connect_timeout);
        client_options.server_selection_timeout = Some(options.connect_timeout);

        let client = Client::with_options(client_options)
            .map_err(|e| ProvisionError::ConfigParse(e.to_string()))?;

        Ok(Self {
            target,
            client,
            role: options.document_role,
        })
    }

    fn role_binding(&self, database: &str) -> Document {
        doc! { "role": self.role.as_str(), "db": database }
    }

    /// Database users are defined in and authenticate against.
    fn user_database(&self) -> &str {
        self.target.auth_database()
    }

    fn create_user_cmd(&self, principal: &Principal) -> Document {
        doc! {
            "createUser": principal.username(),
            "pwd": principal.password(),
            "roles": [self.role_binding(&principal.database_name())],
        }
    }

    /// `roles` replaces the user's whole role list, so a previously broader
    /// grant is narrowed back to the single binding.
    fn update_user_cmd(&self, principal: &Principal) -> Document {
        doc! {
            "updateUser": principal.username(),
            "pwd": principal.password(),
            "roles": [self.role_binding(&principal.database_name())],
        }
    }

    fn create_database_cmd() -> Document {
        doc! { "create": MARKER_COLLECTION }
    }

    fn rebind_cmd(&self, database: &DatabaseHandle) -> Document {
        doc! {
            "grantRolesToUser": database.owner.as_str(),
            "roles": [self.role_binding(&database.name)],
        }
    }

    /// Run a command against the auth database, where users are defined.
    async fn admin_command(&self, command: Document) -> Result<(), BackendError> {
        self.client
            .database(self.user_database())
            .run_command(command)
            .await
            .map(|_| ())
            .map_err(classify_mongo)
    }
}

#[async_trait]
impl BackendAdapter for MongoAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Mongo
    }

    fn target(&self) -> &TargetConfig {
        &self.target
    }

    async fn verify_connectivity(&self) -> bool {
        match self
            .client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(endpoint = %self.target.endpoint(), error = %e, "MongoDB ping failed");
                false
            }
        }
    }

    async fn create_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        info!(username = %principal.username(), role = %self.role, db = %principal.database_name(), "creating user");
        self.admin_command(self.create_user_cmd(principal)).await
    }

    async fn update_principal(&self, principal: &Principal) -> Result<(), BackendError> {
        info!(username = %principal.username(), role = %self.role, db = %principal.database_name(), "user exists, resetting password and roles");
        self.admin_command(self.update_user_cmd(principal)).await
    }

    async fn create_database(&self, database: &DatabaseHandle) -> Result<(), BackendError> {
        info!(database = %database.name, "creating database");
        self.client
            .database(&database.name)
            .run_command(Self::create_database_cmd())
            .await
            .map(|_| ())
            .map_err(classify_mongo)
    }

    async fn converge_database(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        info!(database = %database.name, owner = %database.owner, "database exists, re-asserting role binding");
        self.admin_command(self.rebind_cmd(database)).await?;
        Ok(Outcome::AlreadyPresentAndUpdated)
    }

    async fn grant_privileges(&self, database: &DatabaseHandle) -> Result<Outcome, BackendError> {
        debug!(database = %database.name, "role assigned with the user; nothing to grant");
        Ok(Outcome::Unchanged)
    }

    fn render_connection_descriptor(&self, principal: &Principal) -> ConnectionDescriptor {
        let mut descriptor = ConnectionDescriptor::for_principal(&self.target, principal);
        descriptor
            .params
            .insert("authSource".to_string(), self.user_database().to_string());
        descriptor
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
