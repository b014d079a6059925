use crate::db::BackendKind;
use crate::error::ProvisionError;
use crate::types::principal::Principal;
use crate::types::target::{MONGODB_SRV_SCHEME, TargetConfig};
use std::collections::BTreeMap;
use std::fmt;
use urlencoding::encode;

/// Client-facing address and credentials for a provisioned principal.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    /// Rendered as `mongodb+srv` with no port.
    pub srv: bool,
    pub username: String,
    pub password: String,
    pub database: String,
    pub params: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    /// Descriptor for `principal` on the admin target's endpoint: same host
    /// and port, the principal's own database, and the target's transport
    /// settings.
    pub fn for_principal(target: &TargetConfig, principal: &Principal) -> Self {
        Self {
            kind: target.kind,
            host: target.host.clone(),
            port: target.port,
            srv: target.srv,
            username: principal.username().to_string(),
            password: principal.password().to_string(),
            database: principal.database_name(),
            params: target.transport_params(),
        }
    }

    /// Render in the backend's native URI form. Credentials are percent-encoded.
    pub fn render(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let (scheme, authority) = if self.srv {
            (MONGODB_SRV_SCHEME, host)
        } else {
            (self.kind.scheme(), format!("{host}:{}", self.port))
        };
        let mut out = format!(
            "{}://{}:{}@{}/{}",
            scheme,
            encode(&self.username),
            encode(&self.password),
            authority,
            encode(&self.database),
        );
        if !self.params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish();
            out.push('?');
            out.push_str(&query);
        }
        out
    }

    /// Parse a rendered descriptor back into its components.
    pub fn parse(rendered: &str) -> Result<Self, ProvisionError> {
        let target = TargetConfig::parse_any(rendered)?;
        let username = target
            .username
            .ok_or_else(|| ProvisionError::ConfigParse("descriptor has no username".into()))?;
        let database = target
            .database
            .ok_or_else(|| ProvisionError::ConfigParse("descriptor has no database".into()))?;
        Ok(Self {
            kind: target.kind,
            host: target.host,
            port: target.port,
            srv: target.srv,
            username,
            password: target.password.unwrap_or_default(),
            database,
            params: target.params,
        })
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("srv", &self.srv)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("params", &self.params)
            .finish()
    }
}
