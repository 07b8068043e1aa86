use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::directory::InMemoryDirectory;
use crate::notifications::{DispatchSettings, RecipientBook, RecipientEntry};
use crate::store::{JsonFileStore, MemoryStore, RequestStore};
use crate::workflow::types::{Principal, PrincipalId, Role, RoleKey};

pub const DEFAULT_CONFIG_FILE: &str = "maintenance-workflow.toml";
pub const ENV_PREFIX: &str = "MAINT_WORKFLOW";

/// Main configuration structure for the maintenance workflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceWorkflowConfig {
    /// Where requests and history are kept
    pub storage: StorageConfig,
    /// Notification sender, dispatcher tuning and role recipients
    pub notifications: NotificationConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Seed for the principal directory
    pub principals: Vec<Principal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// JSON document path for the `json` backend
    pub path: String,
    /// Connection string for the `sqlite` backend
    pub database_url: String,
    /// Run embedded migrations on connect
    pub auto_migrate: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            path: ".maintenance-workflow/requests.json".to_string(),
            database_url: "sqlite://.maintenance-workflow/requests.db".to_string(),
            auto_migrate: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// From address on every message
    pub sender: String,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Role key to address mapping (EmailConfiguration)
    pub recipients: Vec<RecipientEntry>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        let dispatch = DispatchSettings::default();
        Self {
            sender: "system@maintenance.local".to_string(),
            queue_capacity: dispatch.queue_capacity,
            max_attempts: dispatch.max_attempts,
            retry_backoff_ms: dispatch.retry_backoff_ms,
            max_retry_delay_ms: dispatch.max_retry_delay_ms,
            recipients: Vec::new(),
        }
    }
}

impl NotificationConfig {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            queue_capacity: self.queue_capacity,
            max_attempts: self.max_attempts,
            retry_backoff_ms: self.retry_backoff_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
        }
    }

    /// Build the shared recipient book, refusing malformed addresses.
    pub fn recipient_book(&self) -> Result<RecipientBook> {
        RecipientBook::from_entries(self.recipients.iter().cloned())
            .map_err(|e| anyhow!("Invalid notification recipient: {}", e))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive
    pub log_level: String,
    /// Emit JSON log lines instead of human readable ones
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl MaintenanceWorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`maintenance-workflow.toml`, or `path` when given)
    /// 3. Environment variables (`MAINT_WORKFLOW__SECTION__KEY`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: MaintenanceWorkflowConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        let mut seen_badges = HashSet::new();
        for principal in &self.principals {
            if !seen_ids.insert(principal.id) {
                return Err(anyhow!("Duplicate principal id {} in configuration", principal.id));
            }
            if !seen_badges.insert(principal.hmc.as_str()) {
                return Err(anyhow!(
                    "Duplicate hmc badge '{}' in configuration",
                    principal.hmc
                ));
            }
        }
        if self.notifications.max_attempts == 0 {
            return Err(anyhow!("notifications.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn directory(&self) -> InMemoryDirectory {
        InMemoryDirectory::new(self.principals.iter().cloned())
    }

    /// Open the configured request store.
    pub async fn open_store(&self) -> Result<Arc<dyn RequestStore>> {
        match self.storage.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StorageBackend::Json => Ok(Arc::new(JsonFileStore::open(&self.storage.path)?)),
            #[cfg(feature = "database")]
            StorageBackend::Sqlite => Ok(Arc::new(
                crate::store::SqliteStore::connect(
                    &self.storage.database_url,
                    self.storage.auto_migrate,
                )
                .await?,
            )),
            #[cfg(not(feature = "database"))]
            StorageBackend::Sqlite => Err(anyhow!(
                "the sqlite backend requires building with the `database` feature"
            )),
        }
    }

    /// Configuration written by `init-config`: one principal per role and a
    /// recipient for each role key.
    pub fn starter() -> Self {
        let people = [
            (1, "requester", "Rita", Role::Requester),
            (2, "prod.supervisor", "Paulo", Role::ApproverProd),
            (3, "maint.supervisor", "Marta", Role::ApproverMaint),
            (4, "maint.manager", "Gabriel", Role::ManagerMaint),
            (5, "technician", "Tiago", Role::Executor),
            (6, "mech.engineer", "Helena", Role::EngineerMech),
            (7, "elec.engineer", "Eduardo", Role::EngineerElec),
        ];
        let principals = people
            .into_iter()
            .map(|(id, username, first_name, role)| Principal {
                id: PrincipalId(id),
                username: username.to_string(),
                first_name: first_name.to_string(),
                email: Some(format!("{username}@plant.example")),
                hmc: format!("H{id:04}"),
                role,
            })
            .collect();

        let recipients = RoleKey::ALL
            .into_iter()
            .map(|key| RecipientEntry {
                key,
                email: format!("{}@plant.example", key.as_str().to_lowercase()),
                description: key.as_str().replace('_', " ").to_lowercase(),
            })
            .collect();

        Self {
            notifications: NotificationConfig {
                recipients,
                ..Default::default()
            },
            principals,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file() -> NamedTempFile {
        tempfile::Builder::new().suffix(".toml").tempfile().unwrap()
    }

    #[test]
    fn test_defaults_use_json_store_and_local_sender() {
        let config = MaintenanceWorkflowConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.notifications.sender, "system@maintenance.local");
        assert_eq!(config.notifications.dispatch_settings(), DispatchSettings::default());
        assert!(config.principals.is_empty());
    }

    #[test]
    fn test_load_reads_partial_file_over_defaults() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[storage]
backend = "memory"

[notifications]
max_attempts = 5

[[notifications.recipients]]
key = "APPROVER_PROD"
email = "prod@plant.example"

[[principals]]
id = 10
username = "ana"
hmc = "H010"
role = "EXECUTOR"
"#
        )
        .unwrap();

        let config = MaintenanceWorkflowConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.notifications.max_attempts, 5);
        assert_eq!(config.notifications.queue_capacity, 256);
        assert_eq!(config.principals[0].role, Role::Executor);

        let book = config.notifications.recipient_book().unwrap();
        assert_eq!(
            book.address_for(RoleKey::ApproverProd).as_deref(),
            Some("prod@plant.example")
        );
    }

    #[test]
    fn test_duplicate_principal_ids_are_refused() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[[principals]]
id = 1
username = "a"
hmc = "H1"
role = "REQUESTER"

[[principals]]
id = 1
username = "b"
hmc = "H2"
role = "EXECUTOR"
"#
        )
        .unwrap();

        assert!(MaintenanceWorkflowConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_duplicate_hmc_badges_are_refused() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[[principals]]
id = 1
username = "a"
hmc = "H7"
role = "REQUESTER"

[[principals]]
id = 2
username = "b"
hmc = "H7"
role = "EXECUTOR"
"#
        )
        .unwrap();

        let err = MaintenanceWorkflowConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("hmc"), "{err}");
    }

    #[test]
    fn test_starter_config_round_trips_through_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("maintenance-workflow.toml");
        let starter = MaintenanceWorkflowConfig::starter();
        starter.save_to_file(&path).unwrap();

        let loaded = MaintenanceWorkflowConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.principals, starter.principals);
        assert_eq!(loaded.notifications.recipients.len(), 3);
        assert_eq!(loaded.directory().len(), 7);
    }
}
