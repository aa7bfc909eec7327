use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_ID_ATTRIBUTE;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub validators: ValidatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub max_connections: Option<u32>,
}

/// Node identity workflow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Project-level switch for the whole identity workflow.
    pub enabled: bool,
    /// Attribute holding the identity on each node.
    pub attribute: String,
    /// Node types that must carry an identity.
    pub id_required_types: Vec<String>,
    /// Host these settings apply to; plugins filter on it.
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Let the has-id check look at referenced nodes too. Repairs never
    /// write to them, so such failures must be fixed at the source file.
    pub has_id_include_referenced: bool,
    pub unique_optional: bool,
    pub related_optional: bool,
    pub log_changed_hierarchies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3011,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            max_connections: Some(10),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            id_required_types: vec![
                "mesh".to_string(),
                "nurbsCurve".to_string(),
                "nurbsSurface".to_string(),
            ],
            host: "maya".to_string(),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            has_id_include_referenced: false,
            unique_optional: false,
            related_optional: true,
            log_changed_hierarchies: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // Nested keys use a double underscore: CBID_IDENTITY__ATTRIBUTE
        config = config.add_source(
            config::Environment::with_prefix("CBID")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the database URL from config or environment, if any is configured
    pub fn database_url(&self) -> Option<String> {
        if let Some(connection_string) = &self.database.connection_string {
            return Some(connection_string.clone());
        }
        std::env::var("DATABASE_URL").ok()
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
