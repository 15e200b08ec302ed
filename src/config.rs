//! Configuration file handling.
//!
//! Settings live in `feedback-stats.toml`. Every field has a default, so a
//! missing file or a partial one is fine.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Role;
use crate::session::Session;

pub const DEFAULT_CONFIG_FILE: &str = "feedback-stats.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL. `DATABASE_URL` takes precedence when set.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_role")]
    pub role: Role,

    /// Branch for `hod`, email for `student`.
    #[serde(default)]
    pub scope: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            scope: None,
        }
    }
}

fn default_role() -> Role {
    Role::Admin
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Star order used when printing distributions.
    #[serde(default = "default_distribution_order")]
    pub distribution_order: DistributionOrder,

    #[serde(default = "default_top_subjects")]
    pub top_subjects: usize,

    #[serde(default = "default_recent_comments")]
    pub recent_comments: usize,

    /// Window applied when reading from the database.
    #[serde(default = "default_since_days")]
    pub since_days: i64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            distribution_order: default_distribution_order(),
            top_subjects: default_top_subjects(),
            recent_comments: default_recent_comments(),
            since_days: default_since_days(),
        }
    }
}

fn default_distribution_order() -> DistributionOrder {
    DistributionOrder::Descending
}

fn default_top_subjects() -> usize {
    10
}

fn default_recent_comments() -> usize {
    5
}

fn default_since_days() -> i64 {
    180
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads `path` if given, otherwise `feedback-stats.toml` when present,
    /// otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.database.url.clone())
    }

    /// CLI flags win over the file.
    pub fn resolve_session(&self, role: Option<Role>, scope: Option<String>) -> Session {
        match role {
            Some(role) => Session::new(role, scope),
            None => Session::new(self.session.role, scope.or_else(|| self.session.scope.clone())),
        }
    }
}
