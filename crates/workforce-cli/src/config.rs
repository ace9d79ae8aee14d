use crate::workers::ModelConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use workforce_core::{WorkerKind, WorkforceError, WorkforceResult};
use workforce_orchestrator::{AgentProfile, OrchestratorConfig};

/// Contents of `workforce.toml`.
#[derive(Debug, Deserialize)]
pub struct WorkforceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Pin the workspace so restarts reload the same records.
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// The team. Falls back to the built-in roster when empty.
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl WorkforceConfig {
    /// Read, parse and validate a config file.
    pub async fn load(path: &Path) -> WorkforceResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            WorkforceError::Config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            WorkforceError::Config(format!("Failed to parse config '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WorkforceResult<()> {
        self.orchestrator.validate()?;
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(WorkforceError::Config("agent name must not be empty".into()));
            }
            if agent.capacity == 0 {
                return Err(WorkforceError::Config(format!(
                    "agent '{}' must have a capacity of at least 1",
                    agent.name
                )));
            }
            // Human results arrive through a surface the binary does not offer.
            if agent.kind == WorkerKind::Human {
                return Err(WorkforceError::Config(format!(
                    "agent '{}' is a human worker, which the command line cannot drive",
                    agent.name
                )));
            }
        }
        Ok(())
    }

    /// Where the record store lives.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}
